//! Keyword relevance scoring.
//!
//! Scoring is a pure function of a [`ContentItem`], the [`KeywordSet`] and the
//! component token: the same inputs always produce the same score, so scores
//! are recomputed from cached raw items instead of being persisted.
//!
//! # Base Algorithm
//!
//! Keywords are evaluated longest first (token count, then length):
//!
//! 1. A case-insensitive match in the searchable text adds the tier weight.
//! 2. A shorter keyword contained in an already matched longer one is skipped.
//! 3. A keyword of 3+ words whose leading N−1 words match, but not the whole
//!    phrase, scores `weight × 0.6` and is recorded as a partial match.
//! 4. Title hits add +2.0 per keyword (+1.0 for partial matches).
//! 5. Extra occurrences add +0.3 each, capped at +2.0 across all keywords.
//! 6. Keywords found only in fetched comments are scaled by 0.8.
//! 7. Issues and PRs get a component bonus (+2.0 text, +3.0 label).
//!
//! Variant bonuses are applied on top; see [`ScoringWeights`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{
    ContentItem, ContentType, ItemDetail, ItemKey, KeywordSet, MatchKind, ReviewLabel, Score,
    ScoredItem, Tier,
};
use crate::xref::FIX_REF_RE;

static FIX_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(fix|resolve|close)\b").expect("valid regex"));

/// Every tunable constant of the scoring formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
    pub partial_multiplier: f64,
    pub title_bonus: f64,
    pub partial_title_bonus: f64,
    pub frequency_step: f64,
    pub frequency_cap: f64,
    pub comment_discount: f64,
    pub component_in_text: f64,
    pub component_in_label: f64,
    pub pr_merged: f64,
    pub pr_fix_reference: f64,
    pub pr_fix_title: f64,
    pub pr_component_in_files: f64,
    pub code_component_in_path: f64,
    pub code_keyword_in_path: f64,
    pub commit_keyword_in_summary: f64,
    pub discussion_keyword_in_answer: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            high: Tier::High.weight(),
            medium: Tier::Medium.weight(),
            low: Tier::Low.weight(),
            partial_multiplier: 0.6,
            title_bonus: 2.0,
            partial_title_bonus: 1.0,
            frequency_step: 0.3,
            frequency_cap: 2.0,
            comment_discount: 0.8,
            component_in_text: 2.0,
            component_in_label: 3.0,
            pr_merged: 2.0,
            pr_fix_reference: 1.5,
            pr_fix_title: 1.0,
            pr_component_in_files: 1.5,
            code_component_in_path: 3.0,
            code_keyword_in_path: 1.0,
            commit_keyword_in_summary: 1.5,
            discussion_keyword_in_answer: 1.0,
        }
    }
}

impl ScoringWeights {
    fn tier(&self, tier: Tier) -> f64 {
        match tier {
            Tier::High => self.high,
            Tier::Medium => self.medium,
            Tier::Low => self.low,
        }
    }
}

/// Result of scoring one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Scoring {
    pub value: f64,
    pub matched_keywords: BTreeSet<String>,
    pub matched_tier_per_keyword: BTreeMap<String, MatchKind>,
}

struct PreparedKeyword {
    original: String,
    lower: String,
    tier: Tier,
    /// Leading N−1 words, only for keywords of three or more words.
    prefix: Option<String>,
}

/// Scores items against one keyword set and component.
///
/// Keyword ordering is computed once on construction.
pub struct Scorer {
    keywords: Vec<PreparedKeyword>,
    component: String,
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(keywords: &KeywordSet, component: &str) -> Self {
        Self::with_weights(keywords, component, ScoringWeights::default())
    }

    pub fn with_weights(keywords: &KeywordSet, component: &str, weights: ScoringWeights) -> Self {
        let mut prepared: Vec<PreparedKeyword> = keywords
            .iter_tiered()
            .filter(|(k, _)| !k.trim().is_empty())
            .map(|(k, tier)| {
                let lower = k.trim().to_lowercase();
                let words: Vec<&str> = lower.split_whitespace().collect();
                let prefix = (words.len() >= 3).then(|| words[..words.len() - 1].join(" "));
                PreparedKeyword {
                    original: k.to_string(),
                    lower,
                    tier,
                    prefix,
                }
            })
            .collect();

        prepared.sort_by(|a, b| {
            let wa = a.lower.split_whitespace().count();
            let wb = b.lower.split_whitespace().count();
            wb.cmp(&wa)
                .then(b.lower.len().cmp(&a.lower.len()))
                .then(a.lower.cmp(&b.lower))
        });

        Self {
            keywords: prepared,
            component: component.trim().to_lowercase(),
            weights,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score one item.
    pub fn score(&self, item: &ContentItem) -> Scoring {
        let w = &self.weights;
        let ct = item.content_type();

        let title = item.title.to_lowercase();
        let answer = match &item.detail {
            ItemDetail::Discussion {
                accepted_answer, ..
            } => accepted_answer.to_lowercase(),
            _ => String::new(),
        };
        // A commit title is the first line of its message, which the body
        // already holds in full.
        let mut primary = match &item.detail {
            ItemDetail::Commit { .. } if !item.body.is_empty() => item.body.to_lowercase(),
            ItemDetail::Commit { .. } => title.clone(),
            _ => format!("{}\n{}", title, item.body.to_lowercase()),
        };
        if !answer.is_empty() {
            primary.push('\n');
            primary.push_str(&answer);
        }
        let comments = item
            .comments
            .as_ref()
            .map(|c| c.join("\n").to_lowercase())
            .unwrap_or_default();

        // Code titles are paths and commit titles are summaries; both have
        // their own bonuses instead of the title bonus.
        let title_bonus_applies = !matches!(ct, ContentType::Code | ContentType::Commit);

        let mut value = 0.0;
        let mut freq_budget = w.frequency_cap;
        let mut matched_lower: Vec<&str> = Vec::new();
        let mut matched_keywords = BTreeSet::new();
        let mut matched_tier_per_keyword = BTreeMap::new();

        for kw in &self.keywords {
            if matched_lower
                .iter()
                .any(|m| *m != kw.lower && m.contains(kw.lower.as_str()))
            {
                continue;
            }

            let in_primary = primary.matches(kw.lower.as_str()).count();
            let in_comments = if comments.is_empty() {
                0
            } else {
                comments.matches(kw.lower.as_str()).count()
            };
            let total = in_primary + in_comments;

            if total > 0 {
                let extra = (total - 1) as f64 * w.frequency_step;
                let freq = extra.min(freq_budget);
                freq_budget -= freq;

                let mut contribution = w.tier(kw.tier) + freq;
                if in_primary == 0 {
                    contribution *= w.comment_discount;
                }
                if title_bonus_applies && title.contains(kw.lower.as_str()) {
                    contribution += w.title_bonus;
                }
                value += contribution;

                matched_lower.push(kw.lower.as_str());
                matched_keywords.insert(kw.original.clone());
                matched_tier_per_keyword.insert(kw.original.clone(), MatchKind::from(kw.tier));
                continue;
            }

            let Some(prefix) = &kw.prefix else {
                continue;
            };
            let prefix_primary = primary.contains(prefix.as_str());
            if !prefix_primary && !comments.contains(prefix.as_str()) {
                continue;
            }
            let mut contribution = w.tier(kw.tier) * w.partial_multiplier;
            if !prefix_primary {
                contribution *= w.comment_discount;
            }
            if title_bonus_applies && title.contains(prefix.as_str()) {
                contribution += w.partial_title_bonus;
            }
            value += contribution;

            matched_lower.push(kw.lower.as_str());
            matched_keywords.insert(kw.original.clone());
            matched_tier_per_keyword.insert(kw.original.clone(), MatchKind::Partial);
        }

        let full_matches: Vec<&str> = self
            .keywords
            .iter()
            .filter(|k| {
                matched_tier_per_keyword
                    .get(&k.original)
                    .is_some_and(|m| *m != MatchKind::Partial)
            })
            .map(|k| k.lower.as_str())
            .collect();
        let count_in = |text: &str| full_matches.iter().filter(|k| text.contains(**k)).count() as f64;
        let has_component = !self.component.is_empty();
        let comp = self.component.as_str();

        match &item.detail {
            ItemDetail::Issue { .. } | ItemDetail::PullRequest { .. } if has_component => {
                if primary.contains(comp) {
                    value += w.component_in_text;
                }
                if item.labels.iter().any(|l| l.to_lowercase().contains(comp)) {
                    value += w.component_in_label;
                }
            }
            _ => {}
        }

        match &item.detail {
            ItemDetail::PullRequest {
                merged,
                linked_issue_refs,
                changed_file_paths,
                ..
            } => {
                if *merged {
                    value += w.pr_merged;
                }
                if !linked_issue_refs.is_empty() || FIX_REF_RE.is_match(&item.body) {
                    value += w.pr_fix_reference;
                }
                if FIX_TITLE_RE.is_match(&item.title) {
                    value += w.pr_fix_title;
                }
                if has_component
                    && changed_file_paths
                        .iter()
                        .any(|p| p.to_lowercase().contains(comp))
                {
                    value += w.pr_component_in_files;
                }
            }
            ItemDetail::Code { file_path, .. } => {
                let path = file_path.to_lowercase();
                if has_component && path.contains(comp) {
                    value += w.code_component_in_path;
                }
                value += count_in(&path) * w.code_keyword_in_path;
            }
            ItemDetail::Commit { .. } => {
                let summary = item.message_first_line().to_lowercase();
                value += count_in(&summary) * w.commit_keyword_in_summary;
            }
            ItemDetail::Discussion { .. } if !answer.is_empty() => {
                value += count_in(&answer) * w.discussion_keyword_in_answer;
            }
            _ => {}
        }

        Scoring {
            value,
            matched_keywords,
            matched_tier_per_keyword,
        }
    }

    /// Score an item and wrap it as a [`ScoredItem`] with a computed score.
    pub fn score_item(&self, item: ContentItem) -> ScoredItem {
        let s = self.score(&item);
        ScoredItem {
            item,
            score: Score::Computed { value: s.value },
            matched_keywords: s.matched_keywords,
            matched_tier_per_keyword: s.matched_tier_per_keyword,
        }
    }

    pub fn score_all(&self, items: impl IntoIterator<Item = ContentItem>) -> Vec<ScoredItem> {
        items.into_iter().map(|i| self.score_item(i)).collect()
    }
}

/// Score an item with default weights.
pub fn score(item: &ContentItem, keywords: &KeywordSet, component: &str) -> (f64, BTreeSet<String>) {
    let s = Scorer::new(keywords, component).score(item);
    (s.value, s.matched_keywords)
}

/// Whether to fetch comments and details for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    Fetch,
    Skip,
}

/// Threshold band selecting borderline items for comment fetching.
///
/// Items scoring in `[low, high)` are ambiguous enough that their comments
/// may move them; items outside the band are left as they are.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommentFetchPolicy {
    pub low: f64,
    pub high: f64,
}

impl Default for CommentFetchPolicy {
    fn default() -> Self {
        Self {
            low: 3.0,
            high: 8.0,
        }
    }
}

impl CommentFetchPolicy {
    pub fn decide(&self, score: f64) -> FetchDecision {
        if score >= self.low && score < self.high {
            FetchDecision::Fetch
        } else {
            FetchDecision::Skip
        }
    }

    /// Whether a scored item needs a detail fetch.
    ///
    /// Only issues and PRs have comments fetched separately; discussions
    /// carry theirs in the search response.
    pub fn should_fetch(&self, item: &ScoredItem) -> bool {
        matches!(
            item.item.content_type(),
            ContentType::Issue | ContentType::PullRequest
        ) && !item.item.comments_fetched()
            && !item.score.is_overridden()
            && self.decide(item.value()) == FetchDecision::Fetch
    }
}

/// A replacement score from an external review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOverride {
    pub score: f64,
    pub label: Option<ReviewLabel>,
}

/// Overrides keyed by content type and item key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideTable {
    entries: BTreeMap<ContentType, BTreeMap<ItemKey, ScoreOverride>>,
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ct: ContentType, key: ItemKey, ov: ScoreOverride) {
        self.entries.entry(ct).or_default().insert(key, ov);
    }

    pub fn get(&self, ct: ContentType, key: &ItemKey) -> Option<&ScoreOverride> {
        self.entries.get(&ct).and_then(|m| m.get(key))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Replace computed scores with overrides. Returns the number applied.
///
/// The computed value is kept on the [`Score::Overridden`] variant. Applying
/// the same table twice leaves the original computed value intact.
pub fn apply_overrides(items: &mut [ScoredItem], table: &OverrideTable) -> usize {
    let mut applied = 0;
    for scored in items.iter_mut() {
        let Some(ov) = table.get(scored.item.content_type(), &scored.item.key()) else {
            continue;
        };
        let computed = match scored.score {
            Score::Computed { value } => value,
            Score::Overridden { computed, .. } => computed,
        };
        scored.score = Score::Overridden {
            value: ov.score,
            label: ov.label,
            computed,
        };
        applied += 1;
    }
    applied
}

/// Sort by score descending, then matched keyword count, then item key.
pub fn rank(items: &mut [ScoredItem]) {
    items.sort_by(|a, b| {
        b.value()
            .partial_cmp(&a.value())
            .unwrap_or(Ordering::Equal)
            .then(b.matched_keywords.len().cmp(&a.matched_keywords.len()))
            .then(a.key().cmp(&b.key()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kws(high: &[&str], medium: &[&str], low: &[&str]) -> KeywordSet {
        let v = |s: &[&str]| s.iter().map(|x| x.to_string()).collect();
        KeywordSet::new(v(high), v(medium), v(low))
    }

    fn item(title: &str, body: &str, detail: ItemDetail) -> ContentItem {
        ContentItem {
            title: title.into(),
            body: body.into(),
            comments: None,
            labels: BTreeSet::new(),
            state: "open".into(),
            url: String::new(),
            created_at: String::new(),
            detail,
        }
    }

    fn issue(title: &str, body: &str) -> ContentItem {
        item(title, body, ItemDetail::Issue { number: 100 })
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "expected {}, got {}", b, a);
    }

    #[test]
    fn test_tier_weights() {
        let k = kws(&["oom"], &["sigsegv"], &["crash"]);
        let s = Scorer::new(&k, "");
        approx(s.score(&issue("report", "oom here")).value, 5.0);
        approx(s.score(&issue("report", "got sigsegv")).value, 3.0);
        approx(s.score(&issue("report", "a crash")).value, 1.0);
        approx(s.score(&issue("report", "nothing")).value, 0.0);
    }

    #[test]
    fn test_containment_suppresses_shorter_keyword() {
        let k = kws(&["memory access fault"], &[], &["access"]);
        let (value, matched) = score(&issue("report", "memory access fault on boot"), &k, "");
        approx(value, 5.0);
        assert_eq!(matched, BTreeSet::from(["memory access fault".to_string()]));
    }

    #[test]
    fn test_partial_match_three_words() {
        let k = kws(&["memory access fault"], &[], &[]);
        let s = Scorer::new(&k, "");
        let r = s.score(&issue("report", "we saw a memory access violation"));
        approx(r.value, 3.0);
        assert_eq!(
            r.matched_tier_per_keyword.get("memory access fault"),
            Some(&MatchKind::Partial)
        );
        let r = s.score(&issue("memory access violation", ""));
        approx(r.value, 4.0);
    }

    #[test]
    fn test_partial_rule_needs_three_words() {
        let k = kws(&["page fault"], &[], &[]);
        approx(score(&issue("t", "a page was mapped"), &k, "").0, 0.0);
    }

    #[test]
    fn test_title_bonus() {
        let k = kws(&["sigsegv"], &[], &[]);
        approx(score(&issue("SIGSEGV in kernel", ""), &k, "").0, 7.0);
    }

    #[test]
    fn test_frequency_bonus_is_capped() {
        let k = kws(&[], &[], &["oom"]);
        approx(score(&issue("t", "oom oom oom"), &k, "").0, 1.0 + 0.6);
        let many = "oom ".repeat(20);
        approx(score(&issue("t", &many), &k, "").0, 1.0 + 2.0);

        let k = kws(&["oom"], &["hang"], &[]);
        let body = format!("{} {}", "oom ".repeat(8), "hang ".repeat(8));
        // 7 * 0.3 = 2.1 is clipped to the shared 2.0 budget
        approx(score(&issue("t", &body), &k, "").0, 5.0 + 3.0 + 2.0);
    }

    #[test]
    fn test_comment_only_match_is_discounted() {
        let k = kws(&[], &["sigsegv"], &[]);
        let mut it = issue("t", "b");
        it.comments = Some(vec!["also seeing SIGSEGV".into()]);
        approx(score(&it, &k, "").0, 3.0 * 0.8);
    }

    #[test]
    fn test_component_bonus() {
        let k = kws(&[], &[], &["crash"]);
        let mut it = issue("crash", "in hipblaslt gemm");
        it.labels.insert("project: hipBLASLt".into());
        // 1 + title 2 + text 2 + label 3
        approx(score(&it, &k, "hipblaslt").0, 8.0);
    }

    #[test]
    fn test_pr_bonuses() {
        let k = kws(&["page fault"], &[], &[]);
        let pr = item(
            "Fix page fault in loader",
            "Fixes #1234",
            ItemDetail::PullRequest {
                number: 7,
                merged: true,
                linked_issue_refs: BTreeSet::new(),
                changed_file_paths: BTreeSet::from(["library/hipblaslt/src/a.cpp".to_string()]),
            },
        );
        // 5 + title 2 + merged 2 + fixes 1.5 + fix title 1 + path 1.5
        approx(score(&pr, &k, "hipblaslt").0, 13.0);
    }

    #[test]
    fn test_code_path_bonuses() {
        let k = kws(&[], &["allocator"], &[]);
        let code = item(
            "src/hipblaslt/allocator.cpp",
            "void* alloc()",
            ItemDetail::Code {
                file_path: "src/hipblaslt/allocator.cpp".into(),
                sha: "abc".into(),
            },
        );
        // 3 + keyword in path 1 + component in path 3, no title bonus
        approx(score(&code, &k, "hipblaslt").0, 7.0);
    }

    #[test]
    fn test_commit_summary_bonus() {
        let k = kws(&["page fault"], &[], &[]);
        let commit = item(
            "Avoid page fault on teardown",
            "Avoid page fault on teardown\n\nDetails here",
            ItemDetail::Commit {
                sha: "deadbeef".into(),
                author: "dev".into(),
            },
        );
        // 5 + summary 1.5; the summary line is not counted twice
        approx(score(&commit, &k, "").0, 6.5);
    }

    #[test]
    fn test_commit_frequency_counts_message_once() {
        let k = kws(&["page fault"], &[], &[]);
        let commit = item(
            "Avoid page fault on teardown",
            "Avoid page fault on teardown\n\nThe page fault recurs on exit.",
            ItemDetail::Commit {
                sha: "deadbeef".into(),
                author: "dev".into(),
            },
        );
        // 5 + one real extra occurrence 0.3 + summary 1.5
        approx(score(&commit, &k, "").0, 6.8);

        // Commits decoded without a body still match on the summary.
        let bare = item(
            "Avoid page fault on teardown",
            "",
            ItemDetail::Commit {
                sha: "cafef00d".into(),
                author: "dev".into(),
            },
        );
        approx(score(&bare, &k, "").0, 6.5);
    }

    #[test]
    fn test_discussion_answer_bonus() {
        let k = kws(&[], &["rocm-smi"], &[]);
        let d = item(
            "GPU not listed",
            "How do I check?",
            ItemDetail::Discussion {
                number: 9,
                category: "Q&A".into(),
                accepted_answer: "Run rocm-smi".into(),
            },
        );
        approx(score(&d, &k, "").0, 4.0);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let k = kws(&["memory access fault", "page fault"], &["sigsegv"], &["gpu"]);
        let mut it = issue("GPU page fault", "memory access fault, sigsegv, sigsegv");
        it.comments = Some(vec!["gpu reset".into()]);
        let s = Scorer::new(&k, "rocm");
        assert_eq!(s.score(&it), s.score(&it));
    }

    #[test]
    fn test_comment_fetch_policy_band() {
        let p = CommentFetchPolicy::default();
        assert_eq!(p.decide(2.99), FetchDecision::Skip);
        assert_eq!(p.decide(3.0), FetchDecision::Fetch);
        assert_eq!(p.decide(7.99), FetchDecision::Fetch);
        assert_eq!(p.decide(8.0), FetchDecision::Skip);

        let k = kws(&[], &["sigsegv"], &[]);
        let s = Scorer::new(&k, "");
        let mut scored = s.score_item(issue("t", "sigsegv"));
        assert!(p.should_fetch(&scored));
        scored.item.comments = Some(vec![]);
        assert!(!p.should_fetch(&scored));
    }

    #[test]
    fn test_apply_overrides_records_computed() {
        let k = kws(&["oom"], &[], &[]);
        let s = Scorer::new(&k, "");
        let mut items = vec![s.score_item(issue("t", "oom"))];
        let mut table = OverrideTable::new();
        table.insert(
            ContentType::Issue,
            ItemKey::Number(100),
            ScoreOverride {
                score: 15.0,
                label: Some(ReviewLabel::Relevant),
            },
        );
        assert_eq!(apply_overrides(&mut items, &table), 1);
        assert_eq!(apply_overrides(&mut items, &table), 1);
        assert_eq!(
            items[0].score,
            Score::Overridden {
                value: 15.0,
                label: Some(ReviewLabel::Relevant),
                computed: 5.0,
            }
        );
    }

    #[test]
    fn test_rank_order() {
        let k = kws(&["oom"], &["hang"], &[]);
        let s = Scorer::new(&k, "");
        let mk = |n, body: &str| {
            s.score_item(item("t", body, ItemDetail::Issue { number: n }))
        };
        let mut items = vec![mk(3, "hang"), mk(2, "oom"), mk(1, "oom"), mk(4, "oom hang")];
        rank(&mut items);
        let order: Vec<_> = items.iter().map(|i| i.item.number().unwrap()).collect();
        assert_eq!(order, vec![4, 1, 2, 3]);
    }
}
