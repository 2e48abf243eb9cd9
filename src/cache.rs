//! Raw-item cache keyed by repository.
//!
//! One JSON file per repository holds the unscored items of every content
//! type searched so far. Scores are never stored: they are recomputed from
//! these items on every run, so a config change takes effect without
//! re-querying.
//!
//! Each search merges its items into what is stored, so results from
//! earlier runs with other queries survive.
//!
//! ```json
//! {
//!   "repo": "owner/name",
//!   "updated_at": "2024-05-01T12:00:00+00:00",
//!   "sections": { "issues": [ ... ], "prs": [ ... ] }
//! }
//! ```
//!
//! Writes go to a temporary file that is renamed over the target, so a
//! crash mid-write leaves the previous cache intact.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use repo_scout_core::{ContentItem, ContentType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheFile {
    pub repo: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub sections: BTreeMap<ContentType, Vec<ContentItem>>,
}

/// Cache handle for a single repository.
#[derive(Debug)]
pub struct RawCache {
    path: PathBuf,
    data: CacheFile,
}

impl RawCache {
    /// File holding the cache for `repo` under `dir`.
    pub fn path_for(dir: &Path, repo: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(repo.as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        let slug: String = repo
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        dir.join(format!("{}-{}.json", slug, &hash[..12]))
    }

    /// Load the cache for `repo`, or start empty.
    ///
    /// A missing file, an unreadable file, or a file written for another
    /// repository all yield an empty cache.
    pub fn open(dir: &Path, repo: &str) -> Self {
        let path = Self::path_for(dir, repo);
        let empty = CacheFile {
            repo: repo.to_string(),
            ..CacheFile::default()
        };

        let data = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) if file.repo == repo => {
                    debug!(path = %path.display(), sections = file.sections.len(), "loaded cache");
                    file
                }
                Ok(file) => {
                    warn!(
                        path = %path.display(),
                        found = %file.repo,
                        expected = %repo,
                        "cache belongs to another repository, ignoring"
                    );
                    empty
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unreadable cache, ignoring");
                    empty
                }
            },
            Err(_) => empty,
        };

        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo(&self) -> &str {
        &self.data.repo
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.data.updated_at.as_deref()
    }

    pub fn section(&self, ct: ContentType) -> Option<&[ContentItem]> {
        self.data.sections.get(&ct).map(Vec::as_slice)
    }

    pub fn types(&self) -> Vec<ContentType> {
        self.data.sections.keys().copied().collect()
    }

    /// Replace the raw items stored for one content type.
    pub fn put_section(&mut self, ct: ContentType, items: Vec<ContentItem>) {
        self.data.sections.insert(ct, items);
    }

    /// Merge freshly fetched items into one content type's section.
    ///
    /// Fresh items replace stored ones with the same key; stored items the
    /// current run did not see are kept after them. Returns the number of
    /// stored items carried over.
    pub fn merge_section(&mut self, ct: ContentType, items: Vec<ContentItem>) -> usize {
        let keys: HashSet<_> = items.iter().map(ContentItem::key).collect();
        let previous = self.data.sections.remove(&ct).unwrap_or_default();
        let mut merged = items;
        let before = merged.len();
        merged.extend(previous.into_iter().filter(|i| !keys.contains(&i.key())));
        let kept = merged.len() - before;
        self.data.sections.insert(ct, merged);
        kept
    }

    /// Write the cache atomically.
    pub fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create cache directory: {}", parent.display())
            })?;
        }
        self.data.updated_at = Some(chrono::Utc::now().to_rfc3339());

        let json = serde_json::to_string_pretty(&self.data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write cache file: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;

        debug!(path = %self.path.display(), "cache saved");
        Ok(())
    }
}
