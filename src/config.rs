//! TOML configuration.
//!
//! A config file names the repository, the component token, the keyword
//! tiers and the content types to search. Every other section is optional
//! and falls back to the documented defaults. See
//! `config/scout.example.toml` for a complete example.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use repo_scout_core::plan::{EarlyStop, PlannerSettings, MAX_QUERIES};
use repo_scout_core::score::{CommentFetchPolicy, ScoringWeights};
use repo_scout_core::xref::XrefOptions;
use repo_scout_core::{ContentType, KeywordSet};

use crate::transport::SearchFilters;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// `owner/name` of the repository to search.
    pub repo: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_search_types")]
    pub search_types: Vec<ContentType>,
    /// Issue and PR numbers dropped from results.
    #[serde(default)]
    pub exclude: Vec<u64>,
    /// Free-form queries run after the planned ones.
    #[serde(default)]
    pub append_queries: Vec<String>,
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub filters: FiltersConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    /// Optional seed-synonym table (TOML).
    #[serde(default)]
    pub seeds: Option<PathBuf>,
}

fn default_search_types() -> Vec<ContentType> {
    vec![ContentType::Issue]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersConfig {
    /// `open`, `closed`, or empty for both.
    #[serde(default)]
    pub state: String,
    /// Inclusive lower bound on creation date (`YYYY-MM-DD`).
    #[serde(default)]
    pub date_from: Option<String>,
    /// Inclusive upper bound on creation date (`YYYY-MM-DD`).
    #[serde(default)]
    pub date_to: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,
    #[serde(default = "default_r1_cap")]
    pub r1_cap: usize,
    #[serde(default = "default_r2_cap")]
    pub r2_cap: usize,
    #[serde(default = "default_r3_cap")]
    pub r3_cap: usize,
    #[serde(default = "default_r4_cap")]
    pub r4_cap: usize,
    #[serde(default = "default_max_query_len")]
    pub max_query_len: usize,
    #[serde(default = "default_early_stop_min_streak")]
    pub early_stop_min_streak: usize,
    #[serde(default = "default_early_stop_divisor")]
    pub early_stop_divisor: usize,
    #[serde(default = "default_true")]
    pub skip_r2_without_component: bool,
    #[serde(default = "default_true")]
    pub skip_r4_without_component: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_queries: default_max_queries(),
            r1_cap: default_r1_cap(),
            r2_cap: default_r2_cap(),
            r3_cap: default_r3_cap(),
            r4_cap: default_r4_cap(),
            max_query_len: default_max_query_len(),
            early_stop_min_streak: default_early_stop_min_streak(),
            early_stop_divisor: default_early_stop_divisor(),
            skip_r2_without_component: true,
            skip_r4_without_component: true,
        }
    }
}

fn default_max_queries() -> usize {
    MAX_QUERIES
}
fn default_r1_cap() -> usize {
    5
}
fn default_r2_cap() -> usize {
    3
}
fn default_r3_cap() -> usize {
    4
}
fn default_r4_cap() -> usize {
    2
}
fn default_max_query_len() -> usize {
    160
}
fn default_early_stop_min_streak() -> usize {
    5
}
fn default_early_stop_divisor() -> usize {
    3
}
fn default_true() -> bool {
    true
}

impl PlannerConfig {
    pub fn settings(&self) -> PlannerSettings {
        PlannerSettings {
            max_queries: self.max_queries,
            r1_cap: self.r1_cap,
            r2_cap: self.r2_cap,
            r3_cap: self.r3_cap,
            r4_cap: self.r4_cap,
            max_query_len: self.max_query_len,
            skip_r2_without_component: self.skip_r2_without_component,
            skip_r4_without_component: self.skip_r4_without_component,
            early_stop: EarlyStop {
                min_streak: self.early_stop_min_streak,
                divisor: self.early_stop_divisor,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    /// Lower bound (inclusive) of the borderline band that triggers a
    /// comment fetch.
    #[serde(default = "default_comment_fetch_low")]
    pub comment_fetch_low: f64,
    /// Upper bound (exclusive) of the borderline band.
    #[serde(default = "default_comment_fetch_high")]
    pub comment_fetch_high: f64,
    /// Items scoring below this are counted but not listed in the report.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default)]
    pub weights: ScoringWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            comment_fetch_low: default_comment_fetch_low(),
            comment_fetch_high: default_comment_fetch_high(),
            min_score: default_min_score(),
            weights: ScoringWeights::default(),
        }
    }
}

fn default_comment_fetch_low() -> f64 {
    3.0
}
fn default_comment_fetch_high() -> f64 {
    8.0
}
fn default_min_score() -> f64 {
    3.0
}

impl ScoringConfig {
    pub fn fetch_policy(&self) -> CommentFetchPolicy {
        CommentFetchPolicy {
            low: self.comment_fetch_low,
            high: self.comment_fetch_high,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    /// Result pages fetched per query.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Detail-fetch workers. 0 picks 4 with a token and 1 without.
    #[serde(default)]
    pub detail_concurrency: usize,
    /// Unique items collected per type before the type stops querying.
    #[serde(default = "default_max_collect")]
    pub max_collect: usize,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            per_page: default_per_page(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            token_env: default_token_env(),
            detail_concurrency: 0,
            max_collect: default_max_collect(),
            retry_base_ms: default_retry_base_ms(),
            api_url: default_api_url(),
        }
    }
}

fn default_max_pages() -> u32 {
    3
}
fn default_per_page() -> u32 {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_max_collect() -> usize {
    500
}
fn default_retry_base_ms() -> u64 {
    2000
}
fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

impl TransportConfig {
    /// The API token, if the configured environment variable is set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn detail_workers(&self, authenticated: bool) -> usize {
        match self.detail_concurrency {
            0 if authenticated => 4,
            0 => 1,
            n => n,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            enabled: true,
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./.scout-cache")
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Bare `#N` references must satisfy `min_ref < N < max_ref`.
    #[serde(default = "default_min_ref")]
    pub min_ref: u64,
    #[serde(default = "default_max_ref")]
    pub max_ref: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            min_ref: default_min_ref(),
            max_ref: default_max_ref(),
        }
    }
}

fn default_max_nodes() -> usize {
    35
}
fn default_min_ref() -> u64 {
    10
}
fn default_max_ref() -> u64 {
    99_999
}

impl GraphConfig {
    pub fn xref_options(&self) -> XrefOptions {
        XrefOptions {
            min_ref: self.min_ref,
            max_ref: self.max_ref,
        }
    }
}

impl Config {
    /// A config with defaults for everything but the repository.
    pub fn for_repo(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            component: String::new(),
            topic: String::new(),
            search_types: default_search_types(),
            exclude: Vec::new(),
            append_queries: Vec::new(),
            keywords: KeywordSet::default(),
            filters: FiltersConfig::default(),
            planner: PlannerConfig::default(),
            scoring: ScoringConfig::default(),
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
            graph: GraphConfig::default(),
            seeds: None,
        }
    }

    /// Search filters with dates parsed. Call after [`load_config`] validation.
    pub fn search_filters(&self) -> Result<SearchFilters> {
        Ok(SearchFilters {
            state: match self.filters.state.as_str() {
                "" => None,
                s => Some(s.to_string()),
            },
            date_from: parse_date("filters.date_from", self.filters.date_from.as_deref())?,
            date_to: parse_date("filters.date_to", self.filters.date_to.as_deref())?,
        })
    }

    /// Requested content types, de-duplicated, in configured order.
    pub fn content_types(&self) -> Vec<ContentType> {
        let mut out = Vec::new();
        for ct in &self.search_types {
            if !out.contains(ct) {
                out.push(*ct);
            }
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => bail!("repo must be 'owner/name', got '{}'", self.repo),
        }

        if self.search_types.is_empty() {
            bail!("search_types must name at least one of issues, prs, code, commits, discussions");
        }

        match self.filters.state.as_str() {
            "" | "open" | "closed" => {}
            other => bail!(
                "Unknown filters.state: '{}'. Must be open, closed, or empty.",
                other
            ),
        }

        let filters = self.search_filters()?;
        if let (Some(from), Some(to)) = (filters.date_from, filters.date_to) {
            if from > to {
                bail!("filters.date_from ({}) is after filters.date_to ({})", from, to);
            }
        }

        self.keywords
            .validate()
            .context("Invalid [keywords] section")?;

        if !(1..=MAX_QUERIES).contains(&self.planner.max_queries) {
            bail!("planner.max_queries must be in [1, {}]", MAX_QUERIES);
        }
        if self.planner.early_stop_divisor == 0 {
            bail!("planner.early_stop_divisor must be > 0");
        }

        if self.scoring.comment_fetch_low >= self.scoring.comment_fetch_high {
            bail!("scoring.comment_fetch_low must be < scoring.comment_fetch_high");
        }
        if !self.scoring.min_score.is_finite() || self.scoring.min_score < 0.0 {
            bail!("scoring.min_score must be a non-negative number");
        }

        if !(1..=100).contains(&self.transport.per_page) {
            bail!("transport.per_page must be in [1, 100]");
        }
        if self.transport.max_pages == 0 {
            bail!("transport.max_pages must be >= 1");
        }
        if self.transport.max_collect == 0 {
            bail!("transport.max_collect must be > 0");
        }

        if self.graph.min_ref >= self.graph.max_ref {
            bail!("graph.min_ref must be < graph.max_ref");
        }
        if self.graph.max_nodes == 0 {
            bail!("graph.max_nodes must be > 0");
        }

        Ok(())
    }
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .with_context(|| format!("{} must be YYYY-MM-DD, got '{}'", field, s)),
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
