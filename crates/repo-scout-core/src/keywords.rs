//! Keyword-set validation and seed-synonym expansion.
//!
//! A seed table maps topic triggers to baseline keywords per tier. When the
//! user's topic contains a trigger (case-insensitive substring), the topic's
//! keywords are merged into the set before planning. Expansion is a pure
//! function: it returns a new [`KeywordSet`] and never mutates shared state.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;
use crate::models::{KeywordSet, Tier};

/// One topic entry of a seed-synonym table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedTopic {
    pub id: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

/// A table of seed topics, usually loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedTable {
    #[serde(default)]
    pub topics: Vec<SeedTopic>,
}

impl KeywordSet {
    /// Check that no keyword is empty or duplicated within or across tiers.
    ///
    /// Comparison is case-insensitive and ignores surrounding whitespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashMap<String, Tier> = HashMap::new();
        for (kw, tier) in self.iter_tiered() {
            let norm = kw.trim().to_lowercase();
            if norm.is_empty() {
                return Err(ConfigError::EmptyKeyword(tier));
            }
            if let Some(&first) = seen.get(&norm) {
                return Err(if first == tier {
                    ConfigError::DuplicateInTier {
                        tier,
                        keyword: kw.to_string(),
                    }
                } else {
                    ConfigError::DuplicateAcrossTiers {
                        keyword: kw.to_string(),
                        first,
                        second: tier,
                    }
                });
            }
            seen.insert(norm, tier);
        }
        Ok(())
    }
}

/// Merge seed keywords whose topic triggers appear in `topic`.
///
/// Only keywords absent from every tier are added; each keeps the tier it has
/// in the seed table. Returns the expanded set and the number of keywords
/// added.
pub fn expand(topic: &str, keywords: &KeywordSet, table: &SeedTable) -> (KeywordSet, usize) {
    let topic_lower = topic.to_lowercase();
    let mut out = keywords.clone();
    let mut existing: HashSet<String> = keywords
        .iter_tiered()
        .map(|(k, _)| k.to_lowercase())
        .collect();
    let mut total_added = 0;

    for seed in &table.topics {
        let Some(trigger) = seed
            .triggers
            .iter()
            .find(|t| !t.is_empty() && topic_lower.contains(&t.to_lowercase()))
        else {
            continue;
        };

        let mut added = 0;
        for (src, dst) in [
            (&seed.high, &mut out.high),
            (&seed.medium, &mut out.medium),
            (&seed.low, &mut out.low),
        ] {
            for kw in src {
                if existing.insert(kw.to_lowercase()) {
                    dst.push(kw.clone());
                    added += 1;
                }
            }
        }

        if added > 0 {
            info!(
                topic = %seed.id,
                trigger = %trigger,
                added,
                "merged seed synonyms"
            );
            total_added += added;
        }
    }

    (out, total_added)
}
