//! # Repo Scout Core
//!
//! Pure, deterministic logic for Repo Scout: data models, the query
//! planner, the relevance scoring engine, and the cross-reference engine.
//!
//! This crate performs no network or filesystem I/O and contains no async
//! runtime. Everything here is a pure function of its inputs, which keeps
//! scores reproducible across runs and lets cached raw items be re-scored
//! without re-querying the hosting platform.
//!
//! ```text
//! KeywordSet ──▶ plan::build ──▶ [Query] ──▶ (transport) ──▶ [ContentItem]
//!                                                               │
//!                                 Scorer::score_item ◀───────────┘
//!                                        │
//!                                        ▼
//!                                  [ScoredItem] ──▶ xref::link ──▶ GraphView
//! ```

pub mod error;
pub mod keywords;
pub mod models;
pub mod plan;
pub mod score;
pub mod xref;

pub use error::{ConfigError, PlanningError};
pub use models::{ContentItem, ContentType, ItemDetail, ItemKey, KeywordSet, ScoredItem, Tier};
