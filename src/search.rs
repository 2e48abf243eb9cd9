//! Search orchestration.
//!
//! Runs the planned queries for every requested content type and turns the
//! raw hits into ranked, cross-referenced results.
//!
//! # Pipeline
//!
//! ```text
//!              ┌── issues worker ──┐
//! plan ──▶ ────┼── prs worker ─────┼──▶ overrides ──▶ rank ──▶ xref ──▶ outcome
//!              └── commits worker ─┘
//!                   │      ▲
//!                   ▼      │
//!            detail pool (borderline items)
//! ```
//!
//! Each worker runs its queries sequentially in plan order, since the
//! early-stop streak is only meaningful as a sequential count. Workers for
//! different types run concurrently. Detail fetches for borderline items
//! share a separate pool bounded by a semaphore. Workers own their result
//! accumulators; the only shared mutable state is the cache, written behind
//! a single lock.
//!
//! Overrides are applied after every worker has finished, so computed scores
//! and overrides never race.
//!
//! With [`SearchOrchestrator::with_resume`] each worker starts from the items
//! its type already has in the cache; those count as seen, so only genuinely
//! new hits reset the early-stop streak.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use repo_scout_core::keywords::{expand, SeedTable};
use repo_scout_core::models::ItemKey;
use repo_scout_core::plan::{self, EarlyStop, Query};
use repo_scout_core::score::{apply_overrides, rank, CommentFetchPolicy, OverrideTable, Scorer};
use repo_scout_core::xref::{self, GraphView, ReferenceEdge, XrefStats};
use repo_scout_core::{ContentItem, ContentType, KeywordSet, PlanningError, ScoredItem};

use crate::cache::RawCache;
use crate::config::Config;
use crate::progress::{NoProgress, SearchProgressEvent, SearchProgressReporter};
use crate::transport::{SearchFilters, SearchTransport, TransportError};

/// Per-type execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub planned: usize,
    pub executed: usize,
    pub unique: usize,
    /// Consecutive queries without new items when the loop ended.
    pub zero_streak: usize,
    pub stopped_early: bool,
    pub collect_limit_hit: bool,
    pub failed_queries: usize,
    pub details_fetched: usize,
    /// Items carried in from the cache before the first query.
    pub resumed: usize,
    /// Set when the type was abandoned (e.g. unauthorized).
    pub error: Option<String>,
}

/// Everything the report needs, without re-deriving any score.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchOutcome {
    pub queries: Vec<Query>,
    pub early_stop_threshold: usize,
    pub results: BTreeMap<ContentType, Vec<ScoredItem>>,
    pub stats: BTreeMap<ContentType, TypeStats>,
    pub edges: BTreeSet<ReferenceEdge>,
    /// `None` when fewer than two linkable types were requested.
    pub xref_stats: Option<XrefStats>,
    pub graph: GraphView,
    pub overrides_applied: usize,
}

impl SearchOutcome {
    pub fn total_items(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}

/// Merge seed synonyms for the configured topic into the keyword tiers.
///
/// `seeds` overrides the config's `seeds` path. Without a table the
/// configured keywords are returned unchanged.
pub fn resolve_keywords(config: &Config, seeds: Option<&Path>) -> Result<KeywordSet> {
    let path = seeds.or(config.seeds.as_deref());
    let Some(path) = path else {
        return Ok(config.keywords.clone());
    };
    if config.topic.trim().is_empty() {
        warn!("seed table given but no topic configured; seeds not applied");
        return Ok(config.keywords.clone());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed table: {}", path.display()))?;
    let table: SeedTable = toml::from_str(&content)
        .with_context(|| format!("Failed to parse seed table: {}", path.display()))?;

    let (keywords, added) = expand(&config.topic, &config.keywords, &table);
    info!(added, total = keywords.len(), "keyword set resolved");
    keywords
        .validate()
        .context("Seed synonyms produced an invalid keyword set")?;
    Ok(keywords)
}

struct TypeContext {
    transport: Arc<dyn SearchTransport>,
    queries: Vec<Query>,
    filters: SearchFilters,
    scorer: Scorer,
    early_stop: EarlyStop,
    fetch_policy: CommentFetchPolicy,
    max_collect: usize,
    exclude: HashSet<u64>,
    detail_pool: Arc<Semaphore>,
    cache: Option<Arc<Mutex<RawCache>>>,
    resume: bool,
    progress: Arc<dyn SearchProgressReporter>,
}

/// Drives a full search run against a [`SearchTransport`].
pub struct SearchOrchestrator {
    config: Config,
    keywords: KeywordSet,
    transport: Arc<dyn SearchTransport>,
    overrides: OverrideTable,
    cache: Option<Arc<Mutex<RawCache>>>,
    resume: bool,
    progress: Arc<dyn SearchProgressReporter>,
}

impl SearchOrchestrator {
    pub fn new(config: Config, keywords: KeywordSet, transport: Arc<dyn SearchTransport>) -> Self {
        Self {
            config,
            keywords,
            transport,
            overrides: OverrideTable::new(),
            cache: None,
            resume: false,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    /// Persist raw items per type as each worker finishes.
    pub fn with_cache(mut self, cache: RawCache) -> Self {
        self.cache = Some(Arc::new(Mutex::new(cache)));
        self
    }

    /// Start each type from its cached items instead of an empty set.
    /// Has no effect without [`with_cache`](Self::with_cache).
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn SearchProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Plan, execute, score, override, rank and cross-reference.
    ///
    /// Fails only on planning or configuration errors. Transport failures
    /// are recorded in the per-type statistics.
    pub async fn run(&self) -> Result<SearchOutcome> {
        let settings = self.config.planner.settings();
        let mut queries = plan::build(&self.keywords, &self.config.component, &settings);
        plan::append(&mut queries, &self.config.append_queries);
        if queries.is_empty() {
            return Err(PlanningError::NoQueries.into());
        }
        if self.resume && self.cache.is_none() {
            warn!("resume requested without a cache, starting empty");
        }
        let filters = self.config.search_filters()?;
        let types = self.config.content_types();

        let workers = self
            .config
            .transport
            .detail_workers(self.transport.is_authenticated());
        info!(
            repo = %self.config.repo,
            types = ?types.iter().map(ContentType::as_str).collect::<Vec<_>>(),
            queries = queries.len(),
            detail_workers = workers,
            "starting search"
        );

        let ctx = Arc::new(TypeContext {
            transport: self.transport.clone(),
            queries: queries.clone(),
            filters,
            scorer: Scorer::with_weights(
                &self.keywords,
                &self.config.component,
                self.config.scoring.weights.clone(),
            ),
            early_stop: settings.early_stop,
            fetch_policy: self.config.scoring.fetch_policy(),
            max_collect: self.config.transport.max_collect,
            exclude: self.config.exclude.iter().copied().collect(),
            detail_pool: Arc::new(Semaphore::new(workers.max(1))),
            cache: self.cache.clone(),
            resume: self.resume,
            progress: self.progress.clone(),
        });

        let mut set = JoinSet::new();
        for ct in &types {
            set.spawn(search_type(ctx.clone(), *ct));
        }

        let mut scored = BTreeMap::new();
        let mut stats = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let (ct, items, type_stats) = joined.context("search worker panicked")?;
            scored.insert(ct, items);
            stats.insert(ct, type_stats);
        }

        let mut outcome = assemble(&self.config, &types, scored, &self.overrides);
        outcome.early_stop_threshold = settings.early_stop.threshold(queries.len());
        outcome.queries = queries;
        outcome.stats = stats;
        for (ct, items) in &outcome.results {
            if let Some(s) = outcome.stats.get_mut(ct) {
                s.unique = items.len();
            }
        }

        info!(
            items = outcome.total_items(),
            edges = outcome.edges.len(),
            overrides = outcome.overrides_applied,
            "search finished"
        );
        Ok(outcome)
    }
}

/// Re-score cached raw items with no transport calls.
pub fn rescore(
    config: &Config,
    keywords: &KeywordSet,
    cache: &RawCache,
    overrides: &OverrideTable,
) -> SearchOutcome {
    let types = config.content_types();
    let scorer = Scorer::with_weights(keywords, &config.component, config.scoring.weights.clone());
    let exclude: HashSet<u64> = config.exclude.iter().copied().collect();

    let mut scored = BTreeMap::new();
    let mut stats = BTreeMap::new();
    for ct in &types {
        let Some(items) = cache.section(*ct) else {
            warn!(content_type = %ct, "no cached items for type");
            stats.insert(
                *ct,
                TypeStats {
                    error: Some("not in cache".to_string()),
                    ..TypeStats::default()
                },
            );
            continue;
        };
        let items: Vec<ScoredItem> = items
            .iter()
            .filter(|i| !is_excluded(&exclude, i))
            .cloned()
            .map(|i| scorer.score_item(i))
            .collect();
        stats.insert(
            *ct,
            TypeStats {
                unique: items.len(),
                details_fetched: items.iter().filter(|s| s.item.comments_fetched()).count(),
                ..TypeStats::default()
            },
        );
        scored.insert(*ct, items);
    }

    let mut outcome = assemble(config, &types, scored, overrides);
    outcome.stats = stats;
    outcome
}

/// Override, rank and cross-reference scored items.
fn assemble(
    config: &Config,
    types: &[ContentType],
    mut results: BTreeMap<ContentType, Vec<ScoredItem>>,
    overrides: &OverrideTable,
) -> SearchOutcome {
    let mut overrides_applied = 0;
    for items in results.values_mut() {
        overrides_applied += apply_overrides(items, overrides);
        rank(items);
    }

    let (edges, xref_stats, graph) = if xref::should_link(types) {
        let edges = xref::link(&results, &config.graph.xref_options());
        let stats = XrefStats::from_edges(&edges);
        let graph = GraphView::build(&edges, config.graph.max_nodes);
        debug!(edges = stats.total, graph_nodes = graph.nodes.len(), "cross-referenced");
        (edges, Some(stats), graph)
    } else {
        (BTreeSet::new(), None, GraphView::default())
    };

    SearchOutcome {
        results,
        edges,
        xref_stats,
        graph,
        overrides_applied,
        ..SearchOutcome::default()
    }
}

fn is_excluded(exclude: &HashSet<u64>, item: &ContentItem) -> bool {
    matches!(
        item.content_type(),
        ContentType::Issue | ContentType::PullRequest
    ) && item.number().is_some_and(|n| exclude.contains(&n))
}

fn backoff(transport: &dyn SearchTransport, err: &TransportError, attempt: u32) -> Duration {
    match err {
        TransportError::RateLimited {
            retry_after_secs: Some(secs),
        } => Duration::from_secs((*secs).min(60)),
        _ => transport.retry_delay(attempt),
    }
}

async fn execute_with_retry(
    transport: &dyn SearchTransport,
    query: &str,
    ct: ContentType,
    filters: &SearchFilters,
) -> Result<Vec<ContentItem>, TransportError> {
    let max_retries = transport.max_retries();
    let mut attempt = 0;
    loop {
        match transport.execute(query, ct, filters).await {
            Ok(items) => return Ok(items),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = backoff(transport, &e, attempt);
                warn!(content_type = %ct, attempt, error = %e, delay_ms = delay.as_millis() as u64, "retrying query");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_with_retry(
    transport: &dyn SearchTransport,
    item: ContentItem,
) -> Result<ContentItem, TransportError> {
    let max_retries = transport.max_retries();
    let mut attempt = 0;
    loop {
        match transport.fetch_details(item.clone()).await {
            Ok(item) => return Ok(item),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                tokio::time::sleep(backoff(transport, &e, attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// One content type's worker: queries, scoring, detail fetch, cache write.
async fn search_type(
    ctx: Arc<TypeContext>,
    ct: ContentType,
) -> (ContentType, Vec<ScoredItem>, TypeStats) {
    let total = ctx.queries.len();
    let mut stats = TypeStats {
        planned: total,
        ..TypeStats::default()
    };
    let mut seen: HashSet<ItemKey> = HashSet::new();
    let mut collected: Vec<ContentItem> = Vec::new();

    if ctx.resume {
        if let Some(cache) = &ctx.cache {
            let guard = cache.lock().await;
            for item in guard.section(ct).unwrap_or_default() {
                if collected.len() >= ctx.max_collect {
                    break;
                }
                if !is_excluded(&ctx.exclude, item) && seen.insert(item.key()) {
                    collected.push(item.clone());
                }
            }
            stats.resumed = collected.len();
            if stats.resumed > 0 {
                info!(content_type = %ct, items = stats.resumed, "resumed from cache");
            }
        }
    }

    for (i, query) in ctx.queries.iter().enumerate() {
        if collected.len() >= ctx.max_collect {
            stats.collect_limit_hit = true;
            info!(content_type = %ct, limit = ctx.max_collect, "collection limit reached");
            break;
        }

        let new_items = match execute_with_retry(&*ctx.transport, &query.text, ct, &ctx.filters)
            .await
        {
            Ok(items) => {
                let before = collected.len();
                for item in items {
                    if collected.len() >= ctx.max_collect {
                        break;
                    }
                    if is_excluded(&ctx.exclude, &item) || !seen.insert(item.key()) {
                        continue;
                    }
                    collected.push(item);
                }
                collected.len() - before
            }
            Err(TransportError::Unauthorized(msg)) => {
                error!(content_type = %ct, error = %msg, "unauthorized, abandoning type");
                stats.error = Some(format!("unauthorized: {}", msg));
                break;
            }
            Err(e) => {
                warn!(content_type = %ct, query = %query.text, error = %e, "query failed");
                stats.failed_queries += 1;
                0
            }
        };

        stats.executed = i + 1;
        if new_items == 0 {
            stats.zero_streak += 1;
        } else {
            stats.zero_streak = 0;
        }
        ctx.progress.report(SearchProgressEvent::Query {
            content_type: ct,
            index: i + 1,
            total,
            query: query.text.clone(),
            new_items,
            collected: collected.len(),
        });

        if stats.executed < total && ctx.early_stop.should_stop(total, stats.zero_streak) {
            stats.stopped_early = true;
            info!(
                content_type = %ct,
                executed = stats.executed,
                zero_streak = stats.zero_streak,
                "early stop"
            );
            ctx.progress.report(SearchProgressEvent::EarlyStop {
                content_type: ct,
                executed: stats.executed,
                total,
                zero_streak: stats.zero_streak,
            });
            break;
        }
    }

    let mut scored = ctx.scorer.score_all(collected);
    stats.details_fetched = fetch_borderline(&ctx, ct, &mut scored).await;
    stats.unique = scored.len();

    if let Some(cache) = &ctx.cache {
        let raw: Vec<ContentItem> = scored.iter().map(|s| s.item.clone()).collect();
        let mut guard = cache.lock().await;
        let kept = guard.merge_section(ct, raw);
        debug!(content_type = %ct, kept, "merged into cache");
        if let Err(e) = guard.save() {
            warn!(content_type = %ct, error = %e, "failed to write cache");
        }
    }

    ctx.progress.report(SearchProgressEvent::Done {
        content_type: ct,
        unique: stats.unique as u64,
    });
    (ct, scored, stats)
}

/// Fetch comments and details for borderline items and re-score them.
/// Returns the number of items updated.
async fn fetch_borderline(ctx: &Arc<TypeContext>, ct: ContentType, scored: &mut [ScoredItem]) -> usize {
    let candidates: Vec<usize> = scored
        .iter()
        .enumerate()
        .filter(|(_, s)| ctx.fetch_policy.should_fetch(s))
        .map(|(i, _)| i)
        .collect();
    if candidates.is_empty() {
        return 0;
    }
    let total = candidates.len() as u64;
    debug!(content_type = %ct, candidates = total, "fetching details for borderline items");

    let mut set = JoinSet::new();
    for idx in candidates {
        let item = scored[idx].item.clone();
        let transport = ctx.transport.clone();
        let pool = ctx.detail_pool.clone();
        set.spawn(async move {
            let Ok(_permit) = pool.acquire_owned().await else {
                return (idx, Err(TransportError::Network("detail pool closed".into())));
            };
            (idx, fetch_with_retry(&*transport, item).await)
        });
    }

    let mut fetched = 0;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, Ok(item))) => {
                scored[idx] = ctx.scorer.score_item(item);
                fetched += 1;
                ctx.progress.report(SearchProgressEvent::Details {
                    content_type: ct,
                    n: fetched as u64,
                    total,
                });
            }
            Ok((idx, Err(e))) => {
                warn!(content_type = %ct, item = %scored[idx].key(), error = %e, "detail fetch failed");
            }
            Err(e) => warn!(content_type = %ct, error = %e, "detail task failed"),
        }
    }
    fetched
}
