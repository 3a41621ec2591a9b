//! Achievement rules and unlocks.
//!
//! Rules are seeded at startup and append-only across releases; keys are
//! stable identifiers. A rule unlocks at most once per profile.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AchievementRuleId, ProfileId};
use crate::stats::ProfileStatistics;

/// Declarative unlock predicate, closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition_type", content = "condition_value", rename_all = "snake_case")]
pub enum AchievementCondition {
    RoutesCompletedCount(u32),
    RoutesOfCategoryCompleted(String),
    Level(i64),
    TotalXp(i64),
    TotalDistanceKm(f64),
}

impl AchievementCondition {
    /// Persisted representation: `(condition_type, condition_value)`.
    pub fn to_parts(&self) -> (&'static str, String) {
        match self {
            AchievementCondition::RoutesCompletedCount(n) => {
                ("routes_completed_count", n.to_string())
            }
            AchievementCondition::RoutesOfCategoryCompleted(c) => {
                ("routes_of_category_completed", c.clone())
            }
            AchievementCondition::Level(n) => ("level", n.to_string()),
            AchievementCondition::TotalXp(n) => ("total_xp", n.to_string()),
            AchievementCondition::TotalDistanceKm(n) => ("total_distance_km", n.to_string()),
        }
    }

    /// Parse the persisted pair back into a condition.
    pub fn from_parts(condition_type: &str, condition_value: &str) -> Option<Self> {
        match condition_type {
            "routes_completed_count" => condition_value
                .parse()
                .ok()
                .map(AchievementCondition::RoutesCompletedCount),
            "routes_of_category_completed" => Some(
                AchievementCondition::RoutesOfCategoryCompleted(condition_value.to_string()),
            ),
            "level" => condition_value.parse().ok().map(AchievementCondition::Level),
            "total_xp" => condition_value
                .parse()
                .ok()
                .map(AchievementCondition::TotalXp),
            "total_distance_km" => condition_value
                .parse()
                .ok()
                .map(AchievementCondition::TotalDistanceKm),
            _ => None,
        }
    }

    /// Evaluate against derived per-profile statistics.
    pub fn is_met(&self, stats: &ProfileStatistics) -> bool {
        match self {
            AchievementCondition::RoutesCompletedCount(n) => stats.routes_completed >= u64::from(*n),
            AchievementCondition::RoutesOfCategoryCompleted(category) => stats
                .completions_by_category
                .get(category)
                .is_some_and(|&count| count > 0),
            AchievementCondition::Level(n) => stats.level >= *n,
            AchievementCondition::TotalXp(n) => stats.total_xp >= *n,
            AchievementCondition::TotalDistanceKm(n) => stats.total_distance_km >= *n,
        }
    }
}

/// A seeded achievement rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRule {
    pub id: AchievementRuleId,
    pub key: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub condition: AchievementCondition,
}

/// Unlock row; `(profile_id, rule_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub profile_id: ProfileId,
    pub rule_id: AchievementRuleId,
    pub unlocked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stats() -> ProfileStatistics {
        let mut by_category = HashMap::new();
        by_category.insert("hiking".to_string(), 2u64);
        ProfileStatistics {
            routes_completed: 3,
            distinct_routes_completed: 2,
            total_distance_km: 24.5,
            completions_by_category: by_category,
            total_xp: 650,
            level: 3,
            achievements_unlocked: 1,
        }
    }

    #[test]
    fn conditions_roundtrip_through_parts() {
        let conditions = [
            AchievementCondition::RoutesCompletedCount(5),
            AchievementCondition::RoutesOfCategoryCompleted("hiking".to_string()),
            AchievementCondition::Level(2),
            AchievementCondition::TotalXp(1000),
            AchievementCondition::TotalDistanceKm(42.0),
        ];
        for condition in conditions {
            let (kind, value) = condition.to_parts();
            let back = AchievementCondition::from_parts(kind, &value).expect("roundtrip");
            assert_eq!(back, condition);
        }
    }

    #[test]
    fn unknown_condition_type_is_rejected() {
        assert!(AchievementCondition::from_parts("longest_streak", "7").is_none());
    }

    #[test]
    fn evaluation_against_statistics() {
        let stats = stats();
        assert!(AchievementCondition::RoutesCompletedCount(3).is_met(&stats));
        assert!(!AchievementCondition::RoutesCompletedCount(4).is_met(&stats));
        assert!(AchievementCondition::RoutesOfCategoryCompleted("hiking".into()).is_met(&stats));
        assert!(!AchievementCondition::RoutesOfCategoryCompleted("cycling".into()).is_met(&stats));
        assert!(AchievementCondition::Level(3).is_met(&stats));
        assert!(AchievementCondition::TotalXp(650).is_met(&stats));
        assert!(!AchievementCondition::TotalXp(651).is_met(&stats));
        assert!(AchievementCondition::TotalDistanceKm(24.0).is_met(&stats));
    }
}
