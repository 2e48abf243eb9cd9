//! Plain-text console report.
//!
//! Everything printed here is read from a [`SearchOutcome`]; no score is
//! recomputed during rendering.

use std::fmt::Write;

use repo_scout_core::models::{ReviewLabel, Score};
use repo_scout_core::plan::Query;
use repo_scout_core::xref::{Column, GraphView, Relation};
use repo_scout_core::ScoredItem;

use crate::search::{SearchOutcome, TypeStats};

const TITLE_WIDTH: usize = 70;

/// Score at which an item counts as highly relevant in the summary.
pub const HIGHLY_RELEVANT: f64 = 8.0;

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        line.to_string()
    } else {
        let cut: String = line.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn label_str(label: ReviewLabel) -> &'static str {
    match label {
        ReviewLabel::Relevant => "relevant",
        ReviewLabel::Noise => "noise",
        ReviewLabel::Borderline => "borderline",
    }
}

/// Render a query plan for `scout plan`.
pub fn render_plan(queries: &[Query], early_stop_threshold: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} queries planned", queries.len());
    for (i, q) in queries.iter().enumerate() {
        let _ = writeln!(
            out,
            "  [Q{:02}] {:?}{}  {}",
            i + 1,
            q.round,
            if q.has_component { "+c" } else { "  " },
            q.text
        );
    }
    let _ = writeln!(
        out,
        "early stop after more than {} consecutive queries without new items",
        early_stop_threshold
    );
    out
}

fn render_stats(out: &mut String, stats: &TypeStats) {
    if let Some(err) = &stats.error {
        let _ = writeln!(out, "  ! {}", err);
    }
    if stats.planned == 0 {
        return;
    }
    let mut parts = vec![format!("{}/{} queries", stats.executed, stats.planned)];
    if stats.stopped_early {
        parts.push(format!("stopped early after {} empty", stats.zero_streak));
    }
    if stats.collect_limit_hit {
        parts.push("collection limit reached".to_string());
    }
    if stats.failed_queries > 0 {
        parts.push(format!("{} failed", stats.failed_queries));
    }
    if stats.details_fetched > 0 {
        parts.push(format!("{} detail fetches", stats.details_fetched));
    }
    if stats.resumed > 0 {
        parts.push(format!("{} resumed from cache", stats.resumed));
    }
    let _ = writeln!(out, "  ({})", parts.join(", "));
}

fn render_item(out: &mut String, rank: usize, s: &ScoredItem) {
    let matched: Vec<&str> = s.matched_keywords.iter().map(String::as_str).collect();
    let tag = match s.score {
        Score::Overridden {
            label, computed, ..
        } => format!(
            "  [override{}; computed {:.1}]",
            label.map(|l| format!(": {}", label_str(l))).unwrap_or_default(),
            computed
        ),
        Score::Computed { .. } => String::new(),
    };
    let _ = writeln!(
        out,
        "  {:>3}. {:>6.1}  {:<12} {}{}",
        rank,
        s.value(),
        truncate(&s.key().to_string(), 12),
        truncate(&s.item.title, TITLE_WIDTH),
        tag
    );
    if !matched.is_empty() {
        let _ = writeln!(out, "{:>14}{}", "", matched.join(", "));
    }
}

fn render_graph(out: &mut String, graph: &GraphView) {
    if graph.is_empty() {
        let _ = writeln!(out, "  (no hub nodes)");
        return;
    }
    for (column, name) in [
        (Column::Left, "sources"),
        (Column::Center, "linked"),
        (Column::Right, "commits"),
    ] {
        let nodes: Vec<String> = graph
            .nodes
            .iter()
            .filter(|n| n.column == column)
            .map(|n| format!("{} ({})", n.node, n.degree))
            .collect();
        if !nodes.is_empty() {
            let _ = writeln!(out, "  {:<8} {}", name, nodes.join(", "));
        }
    }
}

/// Render a full run for the console.
///
/// Every item is counted, but only those scoring at least `min_score` are
/// listed, at most `limit` per type.
pub fn render_outcome(outcome: &SearchOutcome, limit: usize, min_score: f64) -> String {
    let mut out = String::new();

    if outcome.is_empty() {
        let _ = writeln!(
            out,
            "No matching items found ({} queries planned).",
            outcome.queries.len()
        );
    }

    for (ct, items) in &outcome.results {
        let relevant: Vec<&ScoredItem> = items.iter().filter(|s| s.value() >= min_score).collect();
        let high = relevant.iter().filter(|s| s.value() >= HIGHLY_RELEVANT).count();
        let _ = writeln!(
            out,
            "\n== {} ({} searched, {} relevant, {} highly relevant) ==",
            ct,
            items.len(),
            relevant.len(),
            high
        );
        if let Some(stats) = outcome.stats.get(ct) {
            render_stats(&mut out, stats);
        }
        for (i, s) in relevant.iter().take(limit).enumerate() {
            render_item(&mut out, i + 1, s);
        }
        if relevant.len() > limit {
            let _ = writeln!(out, "  ... {} more", relevant.len() - limit);
        }
        if relevant.is_empty() && !items.is_empty() {
            let _ = writeln!(out, "  (nothing scored {:.1} or more)", min_score);
        }
    }
    for (ct, stats) in &outcome.stats {
        if !outcome.results.contains_key(ct) {
            let _ = writeln!(out, "\n== {} ==", ct);
            render_stats(&mut out, stats);
        }
    }

    if let Some(x) = &outcome.xref_stats {
        let _ = writeln!(
            out,
            "\n== cross-references ({} edges: {} issue/PR, {} PR/PR, {} commit, {} fixes) ==",
            x.total, x.issue_pr, x.pr_pr, x.commit, x.fixes
        );
        for e in outcome.edges.iter().take(limit) {
            let rel = match e.relation {
                Relation::Fixes => "fixes",
                Relation::Refs => "refs",
            };
            let _ = writeln!(out, "  {} --{}--> {}", e.source, rel, e.target);
        }
        if outcome.edges.len() > limit {
            let _ = writeln!(out, "  ... {} more", outcome.edges.len() - limit);
        }
        let _ = writeln!(out, "\n== graph ==");
        render_graph(&mut out, &outcome.graph);
    }

    if outcome.overrides_applied > 0 {
        let _ = writeln!(out, "\n{} score overrides applied", outcome.overrides_applied);
    }
    out
}
