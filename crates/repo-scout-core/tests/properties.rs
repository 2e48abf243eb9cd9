use std::collections::{BTreeMap, BTreeSet, HashSet};

use proptest::prelude::*;

use repo_scout_core::models::{ContentItem, ContentType, ItemDetail, KeywordSet};
use repo_scout_core::plan::{self, EarlyStop, PlannerSettings, Round, MAX_QUERIES};
use repo_scout_core::score::{self, Scorer};
use repo_scout_core::xref::{self, GraphView, NodeRef, XrefOptions};
use repo_scout_core::{PlanningError, ScoredItem};

/// Distinct keywords split into three tiers, plus an optional component.
fn keyword_tiers() -> impl Strategy<Value = (KeywordSet, String)> {
    (
        prop::collection::btree_set("[a-z]{3,7}( [a-z]{3,7}){0,2}", 0..24),
        0usize..9,
        0usize..11,
        prop_oneof![Just(String::new()), "[a-z]{3,8}"],
    )
        .prop_map(|(words, h, m, component)| {
            let words: Vec<String> = words.into_iter().collect();
            let h = h.min(words.len());
            let m = m.min(words.len() - h);
            let high = words[..h].to_vec();
            let medium = words[h..h + m].to_vec();
            let low = words[h + m..].to_vec();
            (KeywordSet::new(high, medium, low), component)
        })
}

// ── Query planner ─────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn plan_is_bounded_and_unique((kw, component) in keyword_tiers()) {
        let plan = plan::build(&kw, &component, &PlannerSettings::default());
        prop_assert!(plan.len() <= MAX_QUERIES);
        let unique: HashSet<&str> = plan.iter().map(|q| q.text.as_str()).collect();
        prop_assert_eq!(unique.len(), plan.len(), "duplicate query in {:?}", plan);
    }

    #[test]
    fn plan_starts_with_first_high_keyword((kw, component) in keyword_tiers()) {
        let plan = plan::build(&kw, &component, &PlannerSettings::default());
        if let Some(first) = kw.high.first() {
            prop_assert_eq!(plan[0].round, Round::R1);
            prop_assert_eq!(&plan[0].text, &{
                let q = plan::quote(first);
                if component.is_empty() { q } else { format!("{} {}", component, q) }
            });
        }
    }

    #[test]
    fn r2_present_iff_component((kw, component) in keyword_tiers()) {
        let plan = plan::build(&kw, &component, &PlannerSettings::default());
        let has_r2 = plan.iter().any(|q| q.round == Round::R2);
        if component.is_empty() {
            prop_assert!(!has_r2);
        } else if kw.high.len() >= 2 {
            prop_assert!(has_r2);
        }
    }

    #[test]
    fn r1_and_r3_interleave((kw, component) in keyword_tiers()) {
        let plan = plan::build(&kw, &component, &PlannerSettings::default());
        let n1 = plan.iter().filter(|q| q.round == Round::R1).count();
        let n3 = plan.iter().filter(|q| q.round == Round::R3).count();
        prop_assert_eq!(n1, kw.high.len().min(5));
        prop_assert_eq!(n3, kw.medium.len().div_ceil(2).min(4));

        let prefix = 2 * n1.min(n3);
        for (i, q) in plan.iter().take(prefix).enumerate() {
            let expected = if i % 2 == 0 { Round::R1 } else { Round::R3 };
            prop_assert_eq!(q.round, expected, "position {} in {:?}", i, plan);
        }
    }

    #[test]
    fn empty_plan_only_for_empty_keywords((kw, component) in keyword_tiers()) {
        let result = plan::plan(&kw, &component, &PlannerSettings::default());
        if kw.is_empty() {
            prop_assert_eq!(result, Err(PlanningError::NoQueries));
        } else {
            prop_assert!(result.is_ok());
        }
    }

    #[test]
    fn early_stop_threshold(nq in 1usize..=MAX_QUERIES, streak in 0usize..20) {
        let es = EarlyStop::default();
        prop_assert_eq!(es.should_stop(nq, streak), streak > 5.max(nq / 3));
    }
}

// ── Scoring ───────────────────────────────────────────────────────────────

fn issue(n: u64, title: String, body: String) -> ContentItem {
    ContentItem {
        title,
        body,
        comments: None,
        labels: BTreeSet::new(),
        state: "open".into(),
        url: String::new(),
        created_at: String::new(),
        detail: ItemDetail::Issue { number: n },
    }
}

proptest! {
    #[test]
    fn scoring_is_pure_and_non_negative(
        high in prop::collection::btree_set("[a-d]{1,3}( [a-d]{1,3}){0,2}", 0..4),
        low in prop::collection::btree_set("[e-g]{1,3}", 0..4),
        title in "[a-g ]{0,40}",
        body in "[a-g #]{0,120}",
        component in prop_oneof![Just(String::new()), "[a-g]{2,3}"],
    ) {
        let kw = KeywordSet::new(high.into_iter().collect(), vec![], low.into_iter().collect());
        let item = issue(42, title, body);

        let first = score::score(&item, &kw, &component);
        let second = score::score(&item, &kw, &component);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.0 >= 0.0 && first.0.is_finite());

        let scorer = Scorer::new(&kw, &component);
        prop_assert_eq!(scorer.score(&item).value, first.0);
    }
}

// ── Cross-references ──────────────────────────────────────────────────────

fn scored(item: ContentItem) -> ScoredItem {
    Scorer::new(&KeywordSet::default(), "").score_item(item)
}

fn ref_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            (11u64..60).prop_map(|n| format!("see #{}", n)),
            (11u64..60).prop_map(|n| format!("fixes #{}", n)),
            (11u64..60).prop_map(|n| format!("(#{})", n)),
            Just("plain words".to_string()),
        ],
        0..6,
    )
    .prop_map(|parts| parts.join(" "))
}

fn linked_set() -> impl Strategy<Value = BTreeMap<ContentType, Vec<ScoredItem>>> {
    (
        // Issue and PR numbers share one sequence on the platform.
        prop::collection::btree_map(11u64..35, ref_text(), 0..8),
        prop::collection::btree_map(
            35u64..60,
            (ref_text(), prop::collection::btree_set(11u64..35, 0..3)),
            0..8,
        ),
        prop::collection::btree_map("[0-9a-f]{12}", ref_text(), 0..5),
    )
        .prop_map(|(issues, prs, commits)| {
            let mut out = BTreeMap::new();
            out.insert(
                ContentType::Issue,
                issues
                    .into_iter()
                    .map(|(n, body)| scored(issue(n, format!("issue {}", n), body)))
                    .collect(),
            );
            out.insert(
                ContentType::PullRequest,
                prs.into_iter()
                    .map(|(n, (body, linked))| {
                        scored(ContentItem {
                            detail: ItemDetail::PullRequest {
                                number: n,
                                merged: false,
                                linked_issue_refs: linked,
                                changed_file_paths: BTreeSet::new(),
                            },
                            ..issue(n, format!("pr {}", n), body)
                        })
                    })
                    .collect(),
            );
            out.insert(
                ContentType::Commit,
                commits
                    .into_iter()
                    .map(|(sha, message)| {
                        scored(ContentItem {
                            detail: ItemDetail::Commit {
                                sha,
                                author: String::new(),
                            },
                            ..issue(0, String::new(), message)
                        })
                    })
                    .collect(),
            );
            out
        })
}

fn present_nodes(items: &BTreeMap<ContentType, Vec<ScoredItem>>) -> BTreeSet<NodeRef> {
    items
        .iter()
        .flat_map(|(ct, v)| {
            v.iter().map(move |s| NodeRef {
                kind: *ct,
                key: s.key(),
            })
        })
        .collect()
}

proptest! {
    #[test]
    fn edges_only_between_fetched_items(items in linked_set()) {
        let present = present_nodes(&items);
        let edges = xref::link(&items, &XrefOptions::default());
        for e in &edges {
            prop_assert!(present.contains(&e.source), "unknown source {}", e.source);
            prop_assert!(present.contains(&e.target), "unknown target {}", e.target);
            prop_assert_ne!(&e.source, &e.target);
            prop_assert_ne!(e.target.kind, ContentType::Commit);
        }
    }

    #[test]
    fn dropping_a_type_never_adds_edges(items in linked_set()) {
        let full = xref::link(&items, &XrefOptions::default());
        let mut partial = items.clone();
        partial.remove(&ContentType::Issue);
        let reduced = xref::link(&partial, &XrefOptions::default());
        prop_assert!(reduced.is_subset(&full));
        prop_assert!(reduced.iter().all(|e| e.source.kind != ContentType::Issue
            && e.target.kind != ContentType::Issue));
    }

    #[test]
    fn graph_keeps_only_hubs_and_neighbours(items in linked_set(), max_nodes in 1usize..40) {
        let edges = xref::link(&items, &XrefOptions::default());
        let view = GraphView::build(&edges, max_nodes);
        prop_assert!(view.nodes.len() <= max_nodes);

        let mut degree: BTreeMap<&NodeRef, usize> = BTreeMap::new();
        for e in &edges {
            *degree.entry(&e.source).or_default() += 1;
            *degree.entry(&e.target).or_default() += 1;
        }
        let is_hub = |n: &NodeRef| degree.get(n).copied().unwrap_or(0) >= 2;
        for node in &view.nodes {
            let n = &node.node;
            let next_to_hub = edges.iter().any(|e| {
                (&e.source == n && is_hub(&e.target)) || (&e.target == n && is_hub(&e.source))
            });
            prop_assert!(is_hub(n) || next_to_hub, "{} is neither a hub nor adjacent to one", n);
        }
        for e in &view.edges {
            prop_assert!(view.contains(&e.edge.source) && view.contains(&e.edge.target));
        }
    }
}
