//! Core data models used throughout Repo Scout.
//!
//! These types represent the keyword configuration, the raw items returned by
//! the hosting platform's search, and the scored items that flow through
//! ranking and cross-referencing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the five searchable content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "issues")]
    Issue,
    #[serde(rename = "prs")]
    PullRequest,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "commits")]
    Commit,
    #[serde(rename = "discussions")]
    Discussion,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Issue,
        ContentType::PullRequest,
        ContentType::Code,
        ContentType::Commit,
        ContentType::Discussion,
    ];

    /// Config and cache key for this type (`"issues"`, `"prs"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Issue => "issues",
            ContentType::PullRequest => "prs",
            ContentType::Code => "code",
            ContentType::Commit => "commits",
            ContentType::Discussion => "discussions",
        }
    }

    /// Whether items of this type take part in cross-referencing.
    pub fn is_linkable(&self) -> bool {
        matches!(
            self,
            ContentType::Issue | ContentType::PullRequest | ContentType::Commit
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issues" => Ok(ContentType::Issue),
            "prs" => Ok(ContentType::PullRequest),
            "code" => Ok(ContentType::Code),
            "commits" => Ok(ContentType::Commit),
            "discussions" => Ok(ContentType::Discussion),
            other => Err(format!(
                "unknown search type '{}'. Must be one of issues, prs, code, commits, discussions",
                other
            )),
        }
    }
}

/// Keyword relevance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    /// Base score contributed by a full match of a keyword in this tier.
    pub fn weight(&self) -> f64 {
        match self {
            Tier::High => 5.0,
            Tier::Medium => 3.0,
            Tier::Low => 1.0,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        })
    }
}

/// Three ordered keyword tiers.
///
/// Constructed once per search configuration and treated as immutable.
/// Uniqueness within and across tiers is checked by
/// [`KeywordSet::validate`](crate::keywords), not enforced on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub high: Vec<String>,
    #[serde(default)]
    pub medium: Vec<String>,
    #[serde(default)]
    pub low: Vec<String>,
}

impl KeywordSet {
    pub fn new(high: Vec<String>, medium: Vec<String>, low: Vec<String>) -> Self {
        Self { high, medium, low }
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }

    pub fn len(&self) -> usize {
        self.high.len() + self.medium.len() + self.low.len()
    }

    pub fn tier(&self, tier: Tier) -> &[String] {
        match tier {
            Tier::High => &self.high,
            Tier::Medium => &self.medium,
            Tier::Low => &self.low,
        }
    }

    /// Every keyword paired with its tier, high tier first.
    pub fn iter_tiered(&self) -> impl Iterator<Item = (&str, Tier)> {
        self.high
            .iter()
            .map(|k| (k.as_str(), Tier::High))
            .chain(self.medium.iter().map(|k| (k.as_str(), Tier::Medium)))
            .chain(self.low.iter().map(|k| (k.as_str(), Tier::Low)))
    }
}

/// Stable identity of an item within its content type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemKey {
    Number(u64),
    Text(String),
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Number(n) => write!(f, "{}", n),
            ItemKey::Text(s) => f.write_str(s),
        }
    }
}

impl ItemKey {
    /// Parse a key as written in override files and cache sections.
    pub fn parse(ct: ContentType, raw: &str) -> Option<Self> {
        match ct {
            ContentType::Issue | ContentType::PullRequest | ContentType::Discussion => {
                raw.trim().parse().ok().map(ItemKey::Number)
            }
            ContentType::Code | ContentType::Commit => Some(ItemKey::Text(raw.to_string())),
        }
    }
}

/// Variant-specific fields of a [`ContentItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemDetail {
    Issue {
        number: u64,
    },
    PullRequest {
        number: u64,
        merged: bool,
        #[serde(default)]
        linked_issue_refs: BTreeSet<u64>,
        #[serde(default)]
        changed_file_paths: BTreeSet<String>,
    },
    Code {
        file_path: String,
        #[serde(default)]
        sha: String,
    },
    Commit {
        sha: String,
        #[serde(default)]
        author: String,
    },
    Discussion {
        number: u64,
        #[serde(default)]
        category: String,
        #[serde(default)]
        accepted_answer: String,
    },
}

/// A raw search result of any of the five content types.
///
/// `title` holds the title (issues, PRs, discussions), the message summary
/// line (commits) or the file path (code). `body` holds the body text, the full
/// commit message, or the matched code snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// `None` until comments are fetched.
    #[serde(default)]
    pub comments: Option<Vec<String>>,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_at: String,
    pub detail: ItemDetail,
}

impl ContentItem {
    pub fn content_type(&self) -> ContentType {
        match self.detail {
            ItemDetail::Issue { .. } => ContentType::Issue,
            ItemDetail::PullRequest { .. } => ContentType::PullRequest,
            ItemDetail::Code { .. } => ContentType::Code,
            ItemDetail::Commit { .. } => ContentType::Commit,
            ItemDetail::Discussion { .. } => ContentType::Discussion,
        }
    }

    pub fn key(&self) -> ItemKey {
        match &self.detail {
            ItemDetail::Issue { number }
            | ItemDetail::PullRequest { number, .. }
            | ItemDetail::Discussion { number, .. } => ItemKey::Number(*number),
            ItemDetail::Code { file_path, .. } => ItemKey::Text(file_path.clone()),
            ItemDetail::Commit { sha, .. } => ItemKey::Text(sha.clone()),
        }
    }

    /// Issue, PR, or discussion number.
    pub fn number(&self) -> Option<u64> {
        match &self.detail {
            ItemDetail::Issue { number }
            | ItemDetail::PullRequest { number, .. }
            | ItemDetail::Discussion { number, .. } => Some(*number),
            _ => None,
        }
    }

    /// First line of a commit message (the summary).
    pub fn message_first_line(&self) -> &str {
        self.body.lines().next().unwrap_or(self.title.as_str())
    }

    pub fn comments_fetched(&self) -> bool {
        self.comments.is_some()
    }
}

/// How a keyword matched an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    High,
    Medium,
    Low,
    Partial,
}

impl From<Tier> for MatchKind {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::High => MatchKind::High,
            Tier::Medium => MatchKind::Medium,
            Tier::Low => MatchKind::Low,
        }
    }
}

/// Label attached by an external re-ranking review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewLabel {
    Relevant,
    Noise,
    Borderline,
}

/// Relevance score of an item.
///
/// Scores are either computed by [`Scorer::score_item`](crate::score::Scorer::score_item) or
/// replaced wholesale by a review override. The computed value is kept on
/// overrides so the replacement stays auditable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Score {
    Computed {
        value: f64,
    },
    Overridden {
        value: f64,
        label: Option<ReviewLabel>,
        computed: f64,
    },
}

impl Score {
    /// The score used for ranking.
    pub fn value(&self) -> f64 {
        match self {
            Score::Computed { value } | Score::Overridden { value, .. } => *value,
        }
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self, Score::Overridden { .. })
    }

    pub fn label(&self) -> Option<ReviewLabel> {
        match self {
            Score::Overridden { label, .. } => *label,
            Score::Computed { .. } => None,
        }
    }
}

/// A content item together with its relevance score and keyword matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredItem {
    pub item: ContentItem,
    pub score: Score,
    pub matched_keywords: BTreeSet<String>,
    pub matched_tier_per_keyword: BTreeMap<String, MatchKind>,
}

impl ScoredItem {
    pub fn value(&self) -> f64 {
        self.score.value()
    }

    pub fn key(&self) -> ItemKey {
        self.item.key()
    }
}
