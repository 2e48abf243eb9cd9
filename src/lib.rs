//! # Repo Scout
//!
//! Keyword-tiered relevance search over a GitHub repository.
//!
//! Repo Scout plans a bounded set of search queries from three keyword
//! tiers, runs them concurrently per content type (issues, pull requests,
//! code, commits, discussions), scores every hit with a deterministic
//! formula, and links issues, PRs and commits that reference each other.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Config +   │──▶│ Orchestrator │──▶│ GitHub REST/ │
//! │  Keywords   │   │ (per type)   │◀──│   GraphQL    │
//! └─────────────┘   └──────┬───────┘   └──────────────┘
//!                          │
//!            ┌─────────────┼─────────────┐
//!            ▼             ▼             ▼
//!       ┌─────────┐   ┌─────────┐   ┌─────────┐
//!       │  Score  │   │  Xref   │   │  Cache  │
//!       └─────────┘   └─────────┘   └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scout plan                       # show the planned queries
//! scout search                     # search, score and link
//! scout rescore --overrides ai.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`transport`] | Search transport trait and errors |
//! | [`github`] | GitHub REST and GraphQL transport |
//! | [`search`] | Concurrent search orchestration |
//! | [`cache`] | Raw-item cache per repository |
//! | [`overrides`] | Review score overrides |
//! | [`progress`] | Progress reporting on stderr |
//! | [`report`] | Console report |
//!
//! The pure planning, scoring and cross-reference logic lives in the
//! `repo-scout-core` crate and is re-exported here.

pub mod cache;
pub mod config;
pub mod github;
pub mod overrides;
pub mod progress;
pub mod report;
pub mod search;
pub mod transport;

pub use repo_scout_core::{
    keywords, models, plan, score, xref, ConfigError, ContentItem, ContentType, ItemDetail,
    ItemKey, KeywordSet, PlanningError, ScoredItem, Tier,
};
