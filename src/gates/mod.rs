//! Numeric quality gates applied between and within stages.
//!
//! Both gates are pure functions returning a rounded score, an inclusive
//! pass flag, and the per-category breakdown that produced the score.

pub mod feasibility;
pub mod market;
pub mod validation;

pub use feasibility::{FeasibilityBreakdown, FeasibilityResult, feasibility};
pub use market::{
    CommunitySize, MarketProxyBreakdown, MarketProxyResult, SearchTrend, community_size_for,
    market_proxy, trend_from_competitors,
};
pub use validation::{
    ValidationBreakdown, ValidationRatios, ValidationResult, competitor_step_score, validation,
};
