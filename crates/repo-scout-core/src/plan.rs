//! Query planner: turns keyword tiers into an ordered, bounded list of
//! search queries.
//!
//! # Rounds
//!
//! | Round | Source | Shape | Cap |
//! |-------|--------|-------|-----|
//! | R1 | each `high` keyword | `[component] "kw"` | 5 |
//! | R2 | `high` pairs | `a OR b` (never scoped) | 3 |
//! | R3 | `medium` pairs | `[component] a OR b` | 4 |
//! | R4 | `high[i]` with `medium[i]` | `h OR m` (never scoped) | 2 |
//! | R5 | `low` in threes | `[component] a OR b OR c` | budget |
//!
//! # Merge Order
//!
//! R1 and R3 are interleaved (`R1[0], R3[0], R1[1], R3[1], …`), the longer
//! list's remainder follows, then R2, R4 and R5. Exact-string duplicates are
//! removed across all rounds, then the list is truncated to `max_queries`.
//! Interleaving guarantees a medium-tier query runs second, so a streak of
//! zero-result phrase queries in R1 cannot trigger the early stop before the
//! medium tier is ever tried.
//!
//! R2 and R4 are unscoped sweeps. Without a component their results are a
//! subset of what R1 and R3 already fetch, so they are skipped by default.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PlanningError;
use crate::models::KeywordSet;

/// Query-generation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Round {
    R1,
    R2,
    R3,
    R4,
    R5,
    /// Free-form query supplied by the user, run after the plan.
    Extra,
}

/// A single planned search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Query {
    /// Query text, without repository or filter qualifiers.
    pub text: String,
    pub round: Round,
    /// Whether the text is prefixed with the component token.
    pub has_component: bool,
}

/// Early-stop rule for a sequential query loop.
///
/// Stopping is permitted once the count of consecutive zero-result queries
/// exceeds `max(min_streak, planned / divisor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyStop {
    pub min_streak: usize,
    pub divisor: usize,
}

impl Default for EarlyStop {
    fn default() -> Self {
        Self {
            min_streak: 5,
            divisor: 3,
        }
    }
}

impl EarlyStop {
    /// Longest zero-result streak that never permits a stop.
    pub fn threshold(&self, planned: usize) -> usize {
        self.min_streak.max(planned / self.divisor.max(1))
    }

    /// Whether the loop may stop after `zero_streak` consecutive empty queries.
    pub fn should_stop(&self, planned: usize, zero_streak: usize) -> bool {
        zero_streak > self.threshold(planned)
    }
}

/// Hard ceiling on plan length. `max_queries` may lower it, never raise it.
pub const MAX_QUERIES: usize = 15;

/// Planner tuning. Defaults reproduce the documented round caps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerSettings {
    pub max_queries: usize,
    pub r1_cap: usize,
    pub r2_cap: usize,
    pub r3_cap: usize,
    pub r4_cap: usize,
    /// Queries longer than this (in characters) are dropped.
    pub max_query_len: usize,
    pub skip_r2_without_component: bool,
    pub skip_r4_without_component: bool,
    pub early_stop: EarlyStop,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_queries: MAX_QUERIES,
            r1_cap: 5,
            r2_cap: 3,
            r3_cap: 4,
            r4_cap: 2,
            max_query_len: 160,
            skip_r2_without_component: true,
            skip_r4_without_component: true,
            early_stop: EarlyStop::default(),
        }
    }
}

/// Quote a keyword for search syntax: multi-word phrases get double quotes.
pub fn quote(kw: &str) -> String {
    if kw.contains(' ') {
        format!("\"{}\"", kw)
    } else {
        kw.to_string()
    }
}

/// Join keywords with ` OR `, quoting multi-word ones.
pub fn or_join<S: AsRef<str>>(keywords: &[S]) -> String {
    keywords
        .iter()
        .map(|k| quote(k.as_ref()))
        .collect::<Vec<_>>()
        .join(" OR ")
}

struct RoundBuilder<'a> {
    component: &'a str,
    max_len: usize,
    round: Round,
    out: Vec<Query>,
}

impl<'a> RoundBuilder<'a> {
    fn new(round: Round, component: &'a str, max_len: usize) -> Self {
        Self {
            component,
            max_len,
            round,
            out: Vec::new(),
        }
    }

    fn push(&mut self, body: String, scoped: bool) {
        let has_component = scoped && !self.component.is_empty();
        let text = if has_component {
            format!("{} {}", self.component, body)
        } else {
            body
        };
        if text.chars().count() > self.max_len {
            debug!(round = ?self.round, query = %text, "query too long, skipped");
            return;
        }
        self.out.push(Query {
            text,
            round: self.round,
            has_component,
        });
    }
}

/// Build the ordered query plan.
///
/// Returns an empty list when every tier is empty; use [`plan`] to turn that
/// into a [`PlanningError`].
pub fn build(keywords: &KeywordSet, component: &str, settings: &PlannerSettings) -> Vec<Query> {
    let component = component.trim();
    let has_comp = !component.is_empty();
    let max_len = settings.max_query_len;
    let (high, medium, low) = (&keywords.high, &keywords.medium, &keywords.low);

    if keywords.is_empty() {
        return Vec::new();
    }

    let mut r1 = RoundBuilder::new(Round::R1, component, max_len);
    for kw in high.iter().take(settings.r1_cap) {
        r1.push(quote(kw), true);
    }

    let mut r2 = RoundBuilder::new(Round::R2, component, max_len);
    if has_comp || !settings.skip_r2_without_component {
        for pair in high.chunks_exact(2).take(settings.r2_cap) {
            r2.push(or_join(pair), false);
        }
    }

    let mut r3 = RoundBuilder::new(Round::R3, component, max_len);
    for group in medium.chunks(2).take(settings.r3_cap) {
        r3.push(or_join(group), true);
    }

    let mut r4 = RoundBuilder::new(Round::R4, component, max_len);
    if has_comp || !settings.skip_r4_without_component {
        for (h, m) in high.iter().zip(medium.iter()).take(settings.r4_cap) {
            r4.push(or_join(&[h, m]), false);
        }
    }

    let mut r5 = RoundBuilder::new(Round::R5, component, max_len);
    for group in low.chunks(3) {
        r5.push(or_join(group), true);
    }

    let (r1, r2, r3, r4, r5) = (r1.out, r2.out, r3.out, r4.out, r5.out);
    let counts = [r1.len(), r2.len(), r3.len(), r4.len(), r5.len()];

    let mut merged = Vec::with_capacity(counts.iter().sum());
    let mut r1_iter = r1.into_iter();
    let mut r3_iter = r3.into_iter();
    loop {
        let a = r1_iter.next();
        let b = r3_iter.next();
        if a.is_none() && b.is_none() {
            break;
        }
        merged.extend(a);
        merged.extend(b);
    }
    merged.extend(r2);
    merged.extend(r4);
    merged.extend(r5);

    let mut seen = HashSet::new();
    let mut plan: Vec<Query> = merged
        .into_iter()
        .filter(|q| seen.insert(q.text.clone()))
        .collect();
    plan.truncate(settings.max_queries.min(MAX_QUERIES));

    info!(
        high = high.len(),
        medium = medium.len(),
        low = low.len(),
        queries = plan.len(),
        r1 = counts[0],
        r2 = counts[1],
        r3 = counts[2],
        r4 = counts[3],
        r5 = counts[4],
        "built query plan"
    );
    for (i, q) in plan.iter().enumerate() {
        debug!("[Q{:02}] {:?} {}", i + 1, q.round, q.text);
    }

    plan
}

/// Append user-supplied queries after the planned ones.
///
/// Blank texts and texts already in the plan are skipped. Appended queries
/// are not counted against [`MAX_QUERIES`]. Returns how many were added.
pub fn append<S: AsRef<str>>(plan: &mut Vec<Query>, extra: &[S]) -> usize {
    let mut seen: HashSet<String> = plan.iter().map(|q| q.text.clone()).collect();
    let before = plan.len();
    for text in extra {
        let text = text.as_ref().trim();
        if text.is_empty() || !seen.insert(text.to_string()) {
            continue;
        }
        plan.push(Query {
            text: text.to_string(),
            round: Round::Extra,
            has_component: false,
        });
    }
    let added = plan.len() - before;
    if added > 0 {
        info!(added, queries = plan.len(), "appended extra queries");
    }
    added
}

/// Build the plan, failing when no query can be produced.
pub fn plan(
    keywords: &KeywordSet,
    component: &str,
    settings: &PlannerSettings,
) -> Result<Vec<Query>, PlanningError> {
    let queries = build(keywords, component, settings);
    if queries.is_empty() {
        return Err(PlanningError::NoQueries);
    }
    Ok(queries)
}
