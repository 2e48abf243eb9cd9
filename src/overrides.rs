//! Score overrides from an external review pass.
//!
//! ```json
//! {
//!   "overrides": {
//!     "issues":  { "123": { "ai_score": 15.0, "ai_label": "relevant" } },
//!     "commits": { "0123abcd...": { "ai_score": 0.0, "ai_label": "noise" } }
//!   }
//! }
//! ```
//!
//! Keys are numbers for issues, PRs and discussions, paths for code, and
//! SHAs for commits.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use repo_scout_core::models::ReviewLabel;
use repo_scout_core::score::{OverrideTable, ScoreOverride};
use repo_scout_core::{ContentType, ItemKey};

#[derive(Deserialize)]
struct OverrideEntry {
    ai_score: f64,
    #[serde(default)]
    ai_label: Option<ReviewLabel>,
}

#[derive(Deserialize)]
struct OverrideFile {
    #[serde(default)]
    overrides: BTreeMap<ContentType, BTreeMap<String, OverrideEntry>>,
}

pub fn parse_overrides(content: &str) -> Result<OverrideTable> {
    let file: OverrideFile =
        serde_json::from_str(content).context("Failed to parse overrides file")?;

    let mut table = OverrideTable::new();
    for (ct, entries) in file.overrides {
        for (raw_key, entry) in entries {
            let Some(key) = ItemKey::parse(ct, &raw_key) else {
                bail!("Invalid {} key in overrides: '{}'", ct, raw_key);
            };
            if !entry.ai_score.is_finite() || entry.ai_score < 0.0 {
                bail!(
                    "Override for {} '{}' has invalid ai_score {}",
                    ct,
                    raw_key,
                    entry.ai_score
                );
            }
            table.insert(
                ct,
                key,
                ScoreOverride {
                    score: entry.ai_score,
                    label: entry.ai_label,
                },
            );
        }
    }
    Ok(table)
}

pub fn load_overrides(path: &Path) -> Result<OverrideTable> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read overrides file: {}", path.display()))?;
    parse_overrides(&content)
}
