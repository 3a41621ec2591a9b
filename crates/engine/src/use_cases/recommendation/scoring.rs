//! Content-based route scoring.
//!
//! Three subscores in [0, 1] - difficulty, distance, tags - combined with
//! configurable weights. The breakdown exposes every term so clients can
//! explain a recommendation.

use serde::{Deserialize, Serialize};

use trailweaver_domain::{normalize_tag, PreferenceVector, Route};

use crate::config::RecommendationConfig;

/// One weighted term of the final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub score: f64,
    pub weight: f64,
    pub weighted: f64,
}

impl SubScore {
    fn new(score: f64, weight: f64) -> Self {
        Self {
            score,
            weight,
            weighted: score * weight,
        }
    }
}

/// Full scoring transcript for one route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub difficulty: SubScore,
    pub distance: SubScore,
    pub tags: SubScore,
    pub user_difficulty_range: [f64; 2],
    pub user_distance_range_km: [f64; 2],
    pub user_tags: Vec<String>,
    pub route_difficulty: u8,
    pub route_length_km: f64,
    pub route_tags: Vec<String>,
    /// Weighted sum before the feedback penalty.
    pub base_score: f64,
    pub final_score: f64,
    /// Present when the profile has feedback on this route.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub penalty_multiplier: Option<f64>,
}

/// 1.0 inside the range, otherwise linear falloff over the distance to the
/// nearest endpoint, reaching 0 three difficulty steps out.
pub fn difficulty_subscore(route_level: f64, lo: f64, hi: f64) -> f64 {
    if route_level >= lo && route_level <= hi {
        return 1.0;
    }
    let d = if route_level < lo {
        lo - route_level
    } else {
        route_level - hi
    };
    (1.0 - d / 3.0).max(0.0)
}

/// Triangular distance score: 1.0 inside [min, max]; above max it declines
/// linearly to 0 at 2*max, below min linearly to 0 at distance 0.
pub fn distance_subscore(length_km: f64, min_km: f64, max_km: f64) -> f64 {
    if length_km >= min_km && length_km <= max_km {
        return 1.0;
    }
    if length_km > max_km {
        if max_km <= 0.0 {
            return 0.0;
        }
        return ((2.0 * max_km - length_km) / max_km).clamp(0.0, 1.0);
    }
    // Below the minimum; min_km > 0 here because length < min.
    (length_km / min_km).clamp(0.0, 1.0)
}

/// Case-folded overlap: `|user ∩ route| / |user|`, 1.0 when the user has no
/// tag preferences at all.
pub fn tags_subscore(user_tags: &std::collections::BTreeSet<String>, route_tags: &[String]) -> f64 {
    if user_tags.is_empty() {
        return 1.0;
    }
    let matches = route_tags
        .iter()
        .map(|t| normalize_tag(t))
        .collect::<std::collections::BTreeSet<_>>()
        .intersection(user_tags)
        .count();
    matches as f64 / user_tags.len().max(1) as f64
}

/// Score one route against an (adjusted) vector. The returned breakdown has
/// no penalty applied yet; the caller folds that in.
pub fn score_route(
    route: &Route,
    vector: &PreferenceVector,
    config: &RecommendationConfig,
) -> ScoreBreakdown {
    let range = vector.difficulty_range;
    let difficulty = SubScore::new(
        difficulty_subscore(f64::from(route.difficulty.level()), range.lo, range.hi),
        config.weight_difficulty,
    );
    let distance = SubScore::new(
        distance_subscore(
            route.length_km(),
            vector.min_distance_km,
            vector.max_distance_km,
        ),
        config.weight_distance,
    );
    let tags = SubScore::new(
        tags_subscore(&vector.preferred_tags, &route.tags),
        config.weight_tags,
    );

    let base_score =
        (difficulty.weighted + distance.weighted + tags.weighted).clamp(0.0, 1.0);

    ScoreBreakdown {
        difficulty,
        distance,
        tags,
        user_difficulty_range: [range.lo, range.hi],
        user_distance_range_km: [vector.min_distance_km, vector.max_distance_km],
        user_tags: vector.preferred_tags.iter().cloned().collect(),
        route_difficulty: route.difficulty.level(),
        route_length_km: route.length_km(),
        route_tags: route.tags.clone(),
        base_score,
        final_score: base_score,
        penalty_multiplier: None,
    }
}
