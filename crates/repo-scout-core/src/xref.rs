//! Cross-references between issues, pull requests and commits.
//!
//! References are extracted from item text and recorded only when both
//! endpoints are present in the supplied result set. Nothing outside the
//! fetched items is ever linked.
//!
//! | Source | Target | Pattern | Relation |
//! |--------|--------|---------|----------|
//! | PR body | Issue | `fixes/closes/resolves #N` | `fixes` |
//! | PR | Issue | linked-issue field | `fixes` |
//! | PR title/body | Issue | `#N` | `refs` |
//! | PR title/body | PR | `#N` | `refs` |
//! | Commit message | Issue | `#N` | `refs` |
//! | Commit message | PR | `(#N)` | `refs` |
//! | Issue body | PR | `#N` | `refs` |
//!
//! Edges are directed from the referencing item to the referenced one.
//! [`GraphView`] derives a small, readable subgraph for rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{ContentType, ItemDetail, ItemKey, ScoredItem};

/// Closing keyword followed by an issue number.
pub static FIX_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:fix(?:es|ed)?|close[sd]?|resolve[sd]?)\s+#(\d+)").expect("valid regex")
});

static HASH_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)").expect("valid regex"));

static PAREN_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(#(\d+)\)").expect("valid regex"));

/// Issue numbers named by closing keywords (`fixes #12`, `Closed #7`, ...).
pub fn closing_refs(text: &str) -> BTreeSet<u64> {
    FIX_REF_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Bare `#N` references not embedded in a word, within the given range.
pub fn hash_refs(text: &str, opts: &XrefOptions) -> BTreeSet<u64> {
    HASH_REF_RE
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let before = text[..whole.start()].chars().next_back();
            let after = text[whole.end()..].chars().next();
            if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
                return None;
            }
            c.get(1)?.as_str().parse().ok()
        })
        .filter(|n| opts.in_range(*n))
        .collect()
}

fn paren_refs(text: &str, opts: &XrefOptions) -> BTreeSet<u64> {
    PAREN_REF_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|n| opts.in_range(*n))
        .collect()
}

/// Bounds for bare `#N` references. Numbers at or outside the bounds are
/// treated as noise (list markers, hex colours, years).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XrefOptions {
    pub min_ref: u64,
    pub max_ref: u64,
}

impl Default for XrefOptions {
    fn default() -> Self {
        Self {
            min_ref: 10,
            max_ref: 99_999,
        }
    }
}

impl XrefOptions {
    pub fn in_range(&self, n: u64) -> bool {
        n > self.min_ref && n < self.max_ref
    }
}

/// An endpoint of a reference edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub kind: ContentType,
    pub key: ItemKey,
}

impl NodeRef {
    pub fn issue(n: u64) -> Self {
        Self {
            kind: ContentType::Issue,
            key: ItemKey::Number(n),
        }
    }

    pub fn pr(n: u64) -> Self {
        Self {
            kind: ContentType::PullRequest,
            key: ItemKey::Number(n),
        }
    }

    pub fn commit(sha: &str) -> Self {
        Self {
            kind: ContentType::Commit,
            key: ItemKey::Text(sha.to_string()),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.key) {
            (ContentType::PullRequest, k) => write!(f, "PR #{}", k),
            (ContentType::Commit, ItemKey::Text(sha)) => {
                write!(f, "{}", sha.chars().take(10).collect::<String>())
            }
            (_, k) => write!(f, "#{}", k),
        }
    }
}

/// Strength of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Fixes,
    Refs,
}

/// A directed reference from `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub source: NodeRef,
    pub target: NodeRef,
    pub relation: Relation,
}

/// Whether a requested type set calls for cross-referencing: at least two of
/// issues, PRs and commits.
pub fn should_link(types: &[ContentType]) -> bool {
    types
        .iter()
        .filter(|t| t.is_linkable())
        .collect::<BTreeSet<_>>()
        .len()
        >= 2
}

#[derive(Default)]
struct EdgeSet {
    edges: BTreeMap<(NodeRef, NodeRef), Relation>,
}

impl EdgeSet {
    /// Record an edge, keeping the strongest relation per pair.
    fn add(&mut self, source: &NodeRef, target: NodeRef, relation: Relation) {
        if *source == target {
            return;
        }
        self.edges
            .entry((source.clone(), target))
            .and_modify(|r| *r = (*r).min(relation))
            .or_insert(relation);
    }

    fn into_edges(self) -> BTreeSet<ReferenceEdge> {
        self.edges
            .into_iter()
            .map(|((source, target), relation)| ReferenceEdge {
                source,
                target,
                relation,
            })
            .collect()
    }
}

/// Extract closed-world reference edges from the fetched items.
///
/// Types absent from `items_by_type` are treated as empty.
pub fn link(
    items_by_type: &BTreeMap<ContentType, Vec<ScoredItem>>,
    opts: &XrefOptions,
) -> BTreeSet<ReferenceEdge> {
    let empty = Vec::new();
    let of = |ct: ContentType| items_by_type.get(&ct).unwrap_or(&empty);

    let numbers = |ct| -> BTreeSet<u64> { of(ct).iter().filter_map(|s| s.item.number()).collect() };
    let issues = numbers(ContentType::Issue);
    let prs = numbers(ContentType::PullRequest);

    let mut set = EdgeSet::default();

    for scored in of(ContentType::PullRequest) {
        let item = &scored.item;
        let ItemDetail::PullRequest {
            number,
            linked_issue_refs,
            ..
        } = &item.detail
        else {
            continue;
        };
        let src = NodeRef::pr(*number);

        for n in closing_refs(&item.body)
            .into_iter()
            .chain(linked_issue_refs.iter().copied())
        {
            if issues.contains(&n) {
                set.add(&src, NodeRef::issue(n), Relation::Fixes);
            }
        }

        let text = format!("{}\n{}", item.title, item.body);
        for n in hash_refs(&text, opts) {
            if issues.contains(&n) {
                set.add(&src, NodeRef::issue(n), Relation::Refs);
            } else if prs.contains(&n) {
                set.add(&src, NodeRef::pr(n), Relation::Refs);
            }
        }
    }

    for scored in of(ContentType::Commit) {
        let item = &scored.item;
        let ItemDetail::Commit { sha, .. } = &item.detail else {
            continue;
        };
        let src = NodeRef::commit(sha);
        let message = if item.body.is_empty() {
            &item.title
        } else {
            &item.body
        };

        for n in paren_refs(message, opts) {
            if prs.contains(&n) {
                set.add(&src, NodeRef::pr(n), Relation::Refs);
            }
        }
        for n in hash_refs(message, opts) {
            if issues.contains(&n) {
                set.add(&src, NodeRef::issue(n), Relation::Refs);
            }
        }
    }

    for scored in of(ContentType::Issue) {
        let item = &scored.item;
        let Some(number) = item.number() else {
            continue;
        };
        let src = NodeRef::issue(number);
        for n in hash_refs(&item.body, opts) {
            if prs.contains(&n) {
                set.add(&src, NodeRef::pr(n), Relation::Refs);
            }
        }
    }

    set.into_edges()
}

/// Summary counts over a set of edges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct XrefStats {
    pub total: usize,
    pub issue_pr: usize,
    pub pr_pr: usize,
    pub commit: usize,
    pub fixes: usize,
}

impl XrefStats {
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a ReferenceEdge>) -> Self {
        let mut stats = Self::default();
        for e in edges {
            stats.total += 1;
            if e.relation == Relation::Fixes {
                stats.fixes += 1;
            }
            match (e.source.kind, e.target.kind) {
                (ContentType::Commit, _) => stats.commit += 1,
                (ContentType::PullRequest, ContentType::PullRequest) => stats.pr_pr += 1,
                (ContentType::PullRequest, ContentType::Issue)
                | (ContentType::Issue, ContentType::PullRequest) => stats.issue_pr += 1,
                _ => {}
            }
        }
        stats
    }
}

/// Layout column of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub node: NodeRef,
    pub degree: usize,
    pub column: Column,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub edge: ReferenceEdge,
    /// Both endpoints share a content type, so the edge is drawn across
    /// columns rather than between them.
    pub same_type: bool,
}

/// Read-only rendering view over a set of edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphView {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn degrees<'a>(edges: impl Iterator<Item = &'a ReferenceEdge>) -> BTreeMap<&'a NodeRef, usize> {
    let mut deg = BTreeMap::new();
    for e in edges {
        *deg.entry(&e.source).or_insert(0) += 1;
        *deg.entry(&e.target).or_insert(0) += 1;
    }
    deg
}

impl GraphView {
    /// Keep hub nodes (degree ≥ 2) and their neighbours, capped at
    /// `max_nodes` by dropping the lowest-degree nodes first.
    pub fn build(edges: &BTreeSet<ReferenceEdge>, max_nodes: usize) -> Self {
        let deg = degrees(edges.iter());

        let hubs: BTreeSet<&NodeRef> = deg
            .iter()
            .filter(|(_, d)| **d >= 2)
            .map(|(n, _)| *n)
            .collect();
        if hubs.is_empty() {
            return Self::default();
        }

        let mut keep = hubs.clone();
        for e in edges {
            if hubs.contains(&e.source) {
                keep.insert(&e.target);
            }
            if hubs.contains(&e.target) {
                keep.insert(&e.source);
            }
        }

        if keep.len() > max_nodes {
            let mut ranked: Vec<&NodeRef> = keep.into_iter().collect();
            ranked.sort_by(|a, b| deg[b].cmp(&deg[a]).then(a.cmp(b)));
            ranked.truncate(max_nodes);
            keep = ranked.into_iter().collect();
        }

        let kept_edges: Vec<&ReferenceEdge> = edges
            .iter()
            .filter(|e| keep.contains(&e.source) && keep.contains(&e.target))
            .collect();

        let mut in_deg: BTreeMap<&NodeRef, usize> = BTreeMap::new();
        for e in &kept_edges {
            *in_deg.entry(&e.target).or_insert(0) += 1;
        }
        let view_deg = degrees(kept_edges.iter().copied());

        let mut nodes: Vec<GraphNode> = keep
            .iter()
            .map(|n| {
                let column = if n.kind == ContentType::Commit {
                    Column::Right
                } else if in_deg.get(n).copied().unwrap_or(0) == 0 {
                    Column::Left
                } else {
                    Column::Center
                };
                GraphNode {
                    node: (*n).clone(),
                    degree: view_deg.get(n).copied().unwrap_or(0),
                    column,
                }
            })
            .collect();
        nodes.sort_by(|a, b| b.degree.cmp(&a.degree).then(a.node.cmp(&b.node)));

        let edges = kept_edges
            .into_iter()
            .map(|e| GraphEdge {
                same_type: e.source.kind == e.target.kind,
                edge: e.clone(),
            })
            .collect();

        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.nodes.iter().any(|n| &n.node == node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentItem, Score};

    fn scored(title: &str, body: &str, detail: ItemDetail) -> ScoredItem {
        ScoredItem {
            item: ContentItem {
                title: title.into(),
                body: body.into(),
                comments: None,
                labels: BTreeSet::new(),
                state: "open".into(),
                url: String::new(),
                created_at: String::new(),
                detail,
            },
            score: Score::Computed { value: 1.0 },
            matched_keywords: BTreeSet::new(),
            matched_tier_per_keyword: BTreeMap::new(),
        }
    }

    fn issue(n: u64, body: &str) -> ScoredItem {
        scored("issue", body, ItemDetail::Issue { number: n })
    }

    fn pr(n: u64, title: &str, body: &str, linked: &[u64]) -> ScoredItem {
        scored(
            title,
            body,
            ItemDetail::PullRequest {
                number: n,
                merged: false,
                linked_issue_refs: linked.iter().copied().collect(),
                changed_file_paths: BTreeSet::new(),
            },
        )
    }

    fn commit(sha: &str, message: &str) -> ScoredItem {
        scored(
            message.lines().next().unwrap_or(""),
            message,
            ItemDetail::Commit {
                sha: sha.into(),
                author: String::new(),
            },
        )
    }

    fn by_type(items: Vec<ScoredItem>) -> BTreeMap<ContentType, Vec<ScoredItem>> {
        let mut map: BTreeMap<ContentType, Vec<ScoredItem>> = BTreeMap::new();
        for i in items {
            map.entry(i.item.content_type()).or_default().push(i);
        }
        map
    }

    fn edge(source: NodeRef, target: NodeRef, relation: Relation) -> ReferenceEdge {
        ReferenceEdge {
            source,
            target,
            relation,
        }
    }

    #[test]
    fn test_should_link_needs_two_linkable_types() {
        use ContentType::*;
        assert!(!should_link(&[Issue]));
        assert!(!should_link(&[Issue, Code, Discussion]));
        assert!(should_link(&[Issue, PullRequest]));
        assert!(should_link(&[Commit, PullRequest, Code]));
        assert!(!should_link(&[Issue, Issue]));
    }

    #[test]
    fn test_closing_and_hash_refs() {
        assert_eq!(
            closing_refs("Fixes #123, closes #45 and resolved #6"),
            BTreeSet::from([123, 45, 6])
        );
        let opts = XrefOptions::default();
        assert_eq!(
            hash_refs("see #1234 and abc#999 and #5 and #12x and (#77)", &opts),
            BTreeSet::from([1234, 77])
        );
        assert!(hash_refs("#100000", &opts).is_empty());
    }

    #[test]
    fn test_pr_fixes_and_refs() {
        let items = by_type(vec![
            issue(100, ""),
            issue(200, ""),
            pr(300, "Handle fault", "Fixes #100, related to #200", &[]),
            pr(301, "Follow-up to #300", "", &[200]),
        ]);
        let edges = link(&items, &XrefOptions::default());
        assert!(edges.contains(&edge(NodeRef::pr(300), NodeRef::issue(100), Relation::Fixes)));
        assert!(edges.contains(&edge(NodeRef::pr(300), NodeRef::issue(200), Relation::Refs)));
        assert!(edges.contains(&edge(NodeRef::pr(301), NodeRef::pr(300), Relation::Refs)));
        assert!(edges.contains(&edge(NodeRef::pr(301), NodeRef::issue(200), Relation::Fixes)));
        // the fixes edge wins over the weaker bare reference
        assert!(!edges.contains(&edge(NodeRef::pr(300), NodeRef::issue(100), Relation::Refs)));
        assert_eq!(edges.len(), 4);

        let stats = XrefStats::from_edges(&edges);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.issue_pr, 3);
        assert_eq!(stats.pr_pr, 1);
        assert_eq!(stats.fixes, 2);
    }

    #[test]
    fn test_commit_and_issue_refs() {
        let items = by_type(vec![
            issue(100, "Regressed by #300"),
            pr(300, "Change", "", &[]),
            commit("0123456789abcdef", "Guard null page (#300)\n\nSee #100"),
        ]);
        let edges = link(&items, &XrefOptions::default());
        let sha = NodeRef::commit("0123456789abcdef");
        assert!(edges.contains(&edge(sha.clone(), NodeRef::pr(300), Relation::Refs)));
        assert!(edges.contains(&edge(sha, NodeRef::issue(100), Relation::Refs)));
        assert!(edges.contains(&edge(NodeRef::issue(100), NodeRef::pr(300), Relation::Refs)));
        assert_eq!(XrefStats::from_edges(&edges).commit, 2);
    }

    #[test]
    fn test_closed_world() {
        let present: BTreeSet<u64> = [100, 300].into();
        for missing in [11u64, 150, 999, 4242] {
            let body = format!("Fixes #{} and see #{} and #100", missing, missing);
            let items = by_type(vec![
                issue(100, &format!("dup of #{}", missing)),
                pr(300, &format!("#{}", missing), &body, &[missing]),
                commit("abc", &format!("merge (#{})", missing)),
            ]);
            for e in link(&items, &XrefOptions::default()) {
                for node in [&e.source, &e.target] {
                    match &node.key {
                        ItemKey::Number(n) => assert!(present.contains(n), "{:?}", e),
                        ItemKey::Text(s) => assert_eq!(s, "abc"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_missing_types_are_empty() {
        let items = by_type(vec![pr(300, "t", "Fixes #100", &[100])]);
        assert!(link(&items, &XrefOptions::default()).is_empty());
        assert!(link(&BTreeMap::new(), &XrefOptions::default()).is_empty());
    }

    #[test]
    fn test_graph_hub_filter() {
        // degrees: A=3, D=2, E=1, B=1, C=1
        let a = NodeRef::pr(20);
        let d = NodeRef::issue(30);
        let e = NodeRef::issue(40);
        let b = NodeRef::pr(50);
        let c = NodeRef::issue(60);
        let edges: BTreeSet<_> = [
            edge(a.clone(), d.clone(), Relation::Fixes),
            edge(d.clone(), a.clone(), Relation::Refs),
            edge(a.clone(), e.clone(), Relation::Refs),
            edge(b.clone(), c.clone(), Relation::Refs),
        ]
        .into();
        let view = GraphView::build(&edges, 35);
        assert_eq!(view.nodes.len(), 3);
        assert!(view.contains(&a) && view.contains(&d) && view.contains(&e));
        assert!(!view.contains(&b) && !view.contains(&c));
        assert_eq!(view.edges.len(), 3);
        assert_eq!(view.nodes[0].node, a);
        assert_eq!(view.nodes[0].degree, 3);
    }

    #[test]
    fn test_graph_pairs_only_is_empty() {
        let edges: BTreeSet<_> = [
            edge(NodeRef::pr(20), NodeRef::issue(30), Relation::Fixes),
            edge(NodeRef::pr(21), NodeRef::issue(31), Relation::Fixes),
        ]
        .into();
        assert!(GraphView::build(&edges, 35).is_empty());
    }

    #[test]
    fn test_graph_cap_and_columns() {
        let hub = NodeRef::issue(100);
        let mut edges: BTreeSet<ReferenceEdge> = (0..50)
            .map(|i| edge(NodeRef::pr(1000 + i), hub.clone(), Relation::Refs))
            .collect();
        edges.insert(edge(NodeRef::commit("abc"), hub.clone(), Relation::Refs));
        edges.insert(edge(NodeRef::pr(1000), NodeRef::pr(1001), Relation::Refs));

        let view = GraphView::build(&edges, 35);
        assert_eq!(view.nodes.len(), 35);
        assert_eq!(view.nodes[0].node, hub);
        assert_eq!(view.nodes[0].column, Column::Center);

        let col = |n: &NodeRef| view.nodes.iter().find(|g| &g.node == n).map(|g| g.column);
        assert_eq!(col(&NodeRef::pr(1000)), Some(Column::Left));
        assert_eq!(col(&NodeRef::pr(1001)), Some(Column::Center));
        assert!(view
            .edges
            .iter()
            .any(|e| e.same_type && e.edge.target == NodeRef::pr(1001)));
    }
}
