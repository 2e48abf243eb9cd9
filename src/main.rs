//! # Repo Scout CLI (`scout`)
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout plan` | Print the planned queries without touching the network |
//! | `scout search` | Run the search, score, cross-reference and print a report |
//! | `scout rescore` | Re-score cached raw items with no API calls |
//!
//! ## Examples
//!
//! ```bash
//! # Dry run: what would be searched?
//! scout plan --config ./config/scout.toml
//!
//! # Full search with seed synonyms and JSON progress on stderr
//! scout search --seeds ./data/seed_synonyms.toml --progress json
//!
//! # Continue from cached results with two hand-written queries
//! scout search --resume --append-queries "hipMalloc oom" "xnack off"
//!
//! # Apply review overrides to the last search, listing everything
//! scout rescore --overrides ./ai_overrides.json --limit 50 --min-score 0
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repo_scout::cache::RawCache;
use repo_scout::config::{self, Config};
use repo_scout::github::GitHubTransport;
use repo_scout::overrides::load_overrides;
use repo_scout::plan;
use repo_scout::progress::ProgressMode;
use repo_scout::report::{render_outcome, render_plan};
use repo_scout::score::OverrideTable;
use repo_scout::PlanningError;
use repo_scout::search::{rescore, resolve_keywords, SearchOrchestrator, SearchOutcome};

/// Repo Scout: keyword-tiered relevance search over a GitHub repository.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/scout.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "scout",
    about = "Repo Scout: keyword-tiered relevance search over a GitHub repository",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Progress output on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the query plan and early-stop threshold.
    Plan {
        /// Seed-synonym table merged into the keywords before planning.
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Extra queries run after the planned ones.
        #[arg(long, num_args = 1..)]
        append_queries: Vec<String>,
    },

    /// Search the repository and print ranked, cross-referenced results.
    Search {
        /// JSON file of review score overrides.
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Seed-synonym table merged into the keywords before planning.
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Do not write raw items to the cache.
        #[arg(long)]
        no_cache: bool,

        /// Start from the items cached by earlier runs.
        #[arg(long, conflicts_with = "no_cache")]
        resume: bool,

        /// Extra queries run after the planned ones.
        #[arg(long, num_args = 1..)]
        append_queries: Vec<String>,

        /// Maximum items shown per content type.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only list items scoring at least this. Overrides `scoring.min_score`.
        #[arg(long)]
        min_score: Option<f64>,

        /// Print the full outcome as JSON on stdout instead of a report.
        #[arg(long)]
        json: bool,
    },

    /// Re-score cached raw items for the configured repository.
    Rescore {
        /// JSON file of review score overrides.
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Seed-synonym table merged into the keywords before scoring.
        #[arg(long)]
        seeds: Option<PathBuf>,

        /// Maximum items shown per content type.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Only list items scoring at least this. Overrides `scoring.min_score`.
        #[arg(long)]
        min_score: Option<f64>,

        /// Print the full outcome as JSON on stdout instead of a report.
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("repo_scout={},repo_scout_core={}", level, level))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_override_table(path: Option<&PathBuf>) -> Result<OverrideTable> {
    match path {
        Some(p) => load_overrides(p),
        None => Ok(OverrideTable::new()),
    }
}

fn print_outcome(outcome: &SearchOutcome, limit: usize, min_score: f64, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        print!("{}", render_outcome(outcome, limit, min_score));
    }
    Ok(())
}

fn min_score_or_config(cfg: &Config, min_score: Option<f64>) -> Result<f64> {
    match min_score {
        Some(v) if !v.is_finite() || v < 0.0 => bail!("--min-score must be a non-negative number"),
        Some(v) => Ok(v),
        None => Ok(cfg.scoring.min_score),
    }
}

fn run_plan(cfg: &Config, seeds: Option<PathBuf>) -> Result<()> {
    let keywords = resolve_keywords(cfg, seeds.as_deref())?;
    let settings = cfg.planner.settings();
    let mut queries = plan::build(&keywords, &cfg.component, &settings);
    plan::append(&mut queries, &cfg.append_queries);
    if queries.is_empty() {
        return Err(PlanningError::NoQueries.into());
    }
    print!(
        "{}",
        render_plan(&queries, settings.early_stop.threshold(queries.len()))
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut cfg = config::load_config(&cli.config)?;
    let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);

    match cli.command {
        Commands::Plan {
            seeds,
            append_queries,
        } => {
            cfg.append_queries.extend(append_queries);
            run_plan(&cfg, seeds)?
        }
        Commands::Search {
            overrides,
            seeds,
            no_cache,
            resume,
            append_queries,
            limit,
            min_score,
            json,
        } => {
            cfg.append_queries.extend(append_queries);
            let min_score = min_score_or_config(&cfg, min_score)?;
            let keywords = resolve_keywords(&cfg, seeds.as_deref())?;
            let overrides = load_override_table(overrides.as_ref())?;
            let transport = Arc::new(GitHubTransport::new(&cfg.repo, &cfg.transport)?);

            let mut orchestrator = SearchOrchestrator::new(cfg.clone(), keywords, transport)
                .with_overrides(overrides)
                .with_progress(progress.reporter());
            if cfg.cache.enabled && !no_cache {
                orchestrator = orchestrator
                    .with_cache(RawCache::open(&cfg.cache.dir, &cfg.repo))
                    .with_resume(resume);
            } else if resume {
                bail!("--resume needs the cache; it is disabled in {}", cli.config.display());
            }

            let outcome = orchestrator.run().await?;
            print_outcome(&outcome, limit, min_score, json)?;
        }
        Commands::Rescore {
            overrides,
            seeds,
            limit,
            min_score,
            json,
        } => {
            let min_score = min_score_or_config(&cfg, min_score)?;
            let cache = RawCache::open(&cfg.cache.dir, &cfg.repo);
            if cache.types().is_empty() {
                bail!(
                    "No cached items for {} in {}. Run `scout search` first.",
                    cfg.repo,
                    cfg.cache.dir.display()
                );
            }
            let keywords = resolve_keywords(&cfg, seeds.as_deref())?;
            let overrides = load_override_table(overrides.as_ref())?;
            let outcome = rescore(&cfg, &keywords, &cache, &overrides);
            print_outcome(&outcome, limit, min_score, json)?;
        }
    }

    Ok(())
}
