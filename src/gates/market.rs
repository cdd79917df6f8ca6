//! Deterministic market-demand proxy (0..=25) feeding the validation gate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::round_to;

pub const PROXY_MAX: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunitySize {
    Large,
    Medium,
    Small,
}

impl CommunitySize {
    fn points(self) -> f64 {
        match self {
            CommunitySize::Large => 8.0,
            CommunitySize::Medium => 4.8,
            CommunitySize::Small => 2.4,
        }
    }
}

impl fmt::Display for CommunitySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommunitySize::Large => "large",
            CommunitySize::Medium => "medium",
            CommunitySize::Small => "small",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchTrend {
    Rising,
    Stable,
    Declining,
}

impl SearchTrend {
    fn points(self) -> f64 {
        match self {
            SearchTrend::Rising => 7.0,
            SearchTrend::Stable => 3.5,
            SearchTrend::Declining => 1.4,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketProxyBreakdown {
    pub similar_services: f64,
    pub community: f64,
    pub search_trend: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketProxyResult {
    pub score: f64,
    pub breakdown: MarketProxyBreakdown,
}

fn similar_points(similar_count: usize) -> f64 {
    match similar_count {
        n if n >= 5 => 10.0,
        n if n >= 3 => 8.0,
        n if n >= 1 => 5.0,
        _ => 0.0,
    }
}

pub fn market_proxy(
    similar_count: usize,
    community: CommunitySize,
    trend: SearchTrend,
) -> MarketProxyResult {
    let breakdown = MarketProxyBreakdown {
        similar_services: similar_points(similar_count),
        community: community.points(),
        search_trend: trend.points(),
    };
    let total = breakdown.similar_services + breakdown.community + breakdown.search_trend;
    MarketProxyResult {
        score: round_to(total.min(PROXY_MAX), 1),
        breakdown,
    }
}

/// Classify a target audience by keyword. "large" keywords win over "small".
pub fn community_size_for(target: &str, large: &[String], small: &[String]) -> CommunitySize {
    let target = target.to_lowercase();
    let hit = |keywords: &[String]| {
        keywords
            .iter()
            .any(|k| !k.is_empty() && target.contains(&k.to_lowercase()))
    };
    if hit(large) {
        CommunitySize::Large
    } else if hit(small) {
        CommunitySize::Small
    } else {
        CommunitySize::Medium
    }
}

pub fn trend_from_competitors(competitor_count: usize) -> SearchTrend {
    match competitor_count {
        n if n >= 5 => SearchTrend::Rising,
        n if n >= 2 => SearchTrend::Stable,
        _ => SearchTrend::Declining,
    }
}
