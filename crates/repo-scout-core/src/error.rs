//! Error types for the pure core.
//!
//! The planner and scorer never perform I/O, so the only failures they can
//! report are configuration defects. These are fatal and never retried.

use thiserror::Error;

use crate::models::Tier;

/// The query planner could not produce any query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("No search queries could be built: all keyword tiers are empty. Add keywords under [keywords] in the config.")]
    NoQueries,
}

/// Malformed keyword tiers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Keyword '{keyword}' appears more than once in the {tier} tier.")]
    DuplicateInTier { tier: Tier, keyword: String },

    #[error("Keyword '{keyword}' appears in both the {first} and {second} tiers.")]
    DuplicateAcrossTiers {
        keyword: String,
        first: Tier,
        second: Tier,
    },

    #[error("Empty keyword in the {0} tier.")]
    EmptyKeyword(Tier),
}
