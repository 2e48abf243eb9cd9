//! Search transport abstraction.
//!
//! The orchestrator talks to the hosting platform only through
//! [`SearchTransport`]. The GitHub implementation lives in
//! [`crate::github`]; tests use in-memory implementations.
//!
//! # Error Policy
//!
//! | Error | Orchestrator response |
//! |-------|-----------------------|
//! | `RateLimited`, `Network` | retry with backoff, then count the query as empty |
//! | `Unauthorized` | stop searching this content type, keep the others |
//! | `InvalidQuery`, `Decode` | skip the query |

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use repo_scout_core::{ContentItem, ContentType};

/// Failures a transport can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("query rejected: {0}")]
    InvalidQuery(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

fn retry_suffix(secs: &Option<u64>) -> String {
    secs.map(|s| format!(" (retry after {}s)", s))
        .unwrap_or_default()
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. } | TransportError::Network(_)
        )
    }
}

/// Filters applied to every query of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// `open` or `closed`.
    pub state: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Executes search queries against a hosting platform.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    /// Run one query for one content type. Returns raw items in the order
    /// the platform ranked them.
    async fn execute(
        &self,
        query: &str,
        content_type: ContentType,
        filters: &SearchFilters,
    ) -> Result<Vec<ContentItem>, TransportError>;

    /// Populate comments (and, for PRs, changed files and review comments)
    /// on an issue or PR. Other items are returned unchanged.
    async fn fetch_details(&self, item: ContentItem) -> Result<ContentItem, TransportError>;

    /// Whether requests carry credentials.
    fn is_authenticated(&self) -> bool {
        false
    }

    /// Maximum retries for retryable errors.
    fn max_retries(&self) -> u32 {
        3
    }

    /// Backoff before retry number `attempt` (1-based).
    fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
    }
}
