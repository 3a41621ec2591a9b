//! Achievement rule engine.
//!
//! The rule set is seeded at startup and append-only across releases.
//! Evaluation derives the profile's statistics once, tests every rule, and
//! inserts unlocks at most once per (profile, rule).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use trailweaver_domain::{
    AchievementCondition, AchievementRule, Profile, ProfileId, ProfileStatistics, SouvenirSort,
};

use crate::infrastructure::ports::{
    AchievementRepo, ProfileRepo, RepoError, RouteRepo, RuleSeed,
};

#[derive(Debug, thiserror::Error)]
pub enum AchievementError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One rule with its unlock state for a profile.
#[derive(Debug, Clone, Serialize)]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub rule: AchievementRule,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<DateTime<Utc>>,
}

/// The shipped rule set. Keys are stable; new releases only append.
pub fn seeded_rules() -> Vec<RuleSeed> {
    vec![
        RuleSeed {
            key: "first-steps",
            name: "First Steps",
            description: "Complete your first route",
            icon: "👣",
            condition: AchievementCondition::RoutesCompletedCount(1),
        },
        RuleSeed {
            key: "explorer",
            name: "Explorer",
            description: "Complete five routes",
            icon: "🧭",
            condition: AchievementCondition::RoutesCompletedCount(5),
        },
        RuleSeed {
            key: "hiker",
            name: "Hiker",
            description: "Complete a hiking route",
            icon: "🥾",
            condition: AchievementCondition::RoutesOfCategoryCompleted("hiking".to_string()),
        },
        RuleSeed {
            key: "cyclist",
            name: "Cyclist",
            description: "Complete a cycling route",
            icon: "🚴",
            condition: AchievementCondition::RoutesOfCategoryCompleted("cycling".to_string()),
        },
        RuleSeed {
            key: "wanderer",
            name: "Wanderer",
            description: "Cover 50 km in total",
            icon: "🌲",
            condition: AchievementCondition::TotalDistanceKm(50.0),
        },
        RuleSeed {
            key: "marathoner",
            name: "Marathoner",
            description: "Cover 100 km in total",
            icon: "🏅",
            condition: AchievementCondition::TotalDistanceKm(100.0),
        },
        RuleSeed {
            key: "level-up",
            name: "Level Up",
            description: "Reach level 2",
            icon: "⭐",
            condition: AchievementCondition::Level(2),
        },
        RuleSeed {
            key: "seasoned",
            name: "Seasoned",
            description: "Reach level 5",
            icon: "🌟",
            condition: AchievementCondition::Level(5),
        },
        RuleSeed {
            key: "xp-collector",
            name: "XP Collector",
            description: "Earn 1000 XP",
            icon: "💎",
            condition: AchievementCondition::TotalXp(1000),
        },
    ]
}

pub struct AchievementService {
    achievements: Arc<dyn AchievementRepo>,
    profiles: Arc<dyn ProfileRepo>,
    routes: Arc<dyn RouteRepo>,
}

impl AchievementService {
    pub fn new(
        achievements: Arc<dyn AchievementRepo>,
        profiles: Arc<dyn ProfileRepo>,
        routes: Arc<dyn RouteRepo>,
    ) -> Self {
        Self {
            achievements,
            profiles,
            routes,
        }
    }

    /// Startup reconciliation: insert rules whose keys are new, leave
    /// existing rows untouched.
    pub async fn reconcile_rules(&self) -> Result<u64, AchievementError> {
        let inserted = self.achievements.seed_rules(seeded_rules()).await?;
        if inserted > 0 {
            tracing::info!(inserted, "Seeded new achievement rules");
        }
        Ok(inserted)
    }

    /// Derive the statistics snapshot every rule evaluates against.
    pub async fn derive_statistics(
        &self,
        profile: &Profile,
    ) -> Result<ProfileStatistics, RepoError> {
        let souvenirs = self
            .profiles
            .list_souvenirs(profile.id, SouvenirSort::Oldest, u32::MAX, 0)
            .await?;

        let mut route_ids: Vec<_> = souvenirs.iter().map(|s| s.route_id).collect();
        route_ids.sort();
        route_ids.dedup();
        let distinct_routes_completed = route_ids.len() as u64;
        let facts = self.routes.facts_for(route_ids).await?;

        let mut total_distance_km = 0.0;
        let mut completions_by_category: HashMap<String, u64> = HashMap::new();
        for souvenir in &souvenirs {
            if let Some(fact) = facts.get(&souvenir.route_id) {
                total_distance_km += fact.length_m / 1000.0;
                *completions_by_category
                    .entry(fact.category.clone())
                    .or_default() += 1;
            }
        }

        let achievements_unlocked = self.achievements.list_unlocks(profile.id).await?.len() as u64;

        Ok(ProfileStatistics {
            routes_completed: souvenirs.len() as u64,
            distinct_routes_completed,
            total_distance_km,
            completions_by_category,
            total_xp: profile.total_xp,
            level: profile.level,
            achievements_unlocked,
        })
    }

    /// Evaluate every rule for a profile and unlock the newly met ones.
    /// Returns the keys of this call's new unlocks; repeat calls return
    /// nothing new.
    pub async fn check(&self, profile_id: ProfileId) -> Result<Vec<String>, AchievementError> {
        let profile = self
            .profiles
            .get(profile_id)
            .await?
            .ok_or(AchievementError::ProfileNotFound(profile_id))?;

        let stats = self.derive_statistics(&profile).await?;
        let rules = self.achievements.list_rules().await?;

        let mut newly_unlocked = Vec::new();
        for rule in rules {
            if !rule.condition.is_met(&stats) {
                continue;
            }
            // One rule failing must not block the rest.
            match self.achievements.insert_unlock(profile_id, rule.id).await {
                Ok(true) => {
                    tracing::info!(profile_id = %profile_id, key = %rule.key,
                        "Achievement unlocked");
                    newly_unlocked.push(rule.key);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(profile_id = %profile_id, key = %rule.key, error = %e,
                        "Achievement unlock failed, continuing with remaining rules");
                }
            }
        }
        Ok(newly_unlocked)
    }

    /// All rules with the profile's unlock flags, for the listing endpoint.
    pub async fn list_for_profile(
        &self,
        profile_id: ProfileId,
    ) -> Result<Vec<AchievementStatus>, AchievementError> {
        if self.profiles.get(profile_id).await?.is_none() {
            return Err(AchievementError::ProfileNotFound(profile_id));
        }

        let rules = self.achievements.list_rules().await?;
        let unlocks: HashMap<_, _> = self
            .achievements
            .list_unlocks(profile_id)
            .await?
            .into_iter()
            .map(|u| (u.rule_id, u.unlocked_at))
            .collect();

        Ok(rules
            .into_iter()
            .map(|rule| {
                let unlocked_at = unlocks.get(&rule.id).copied();
                AchievementStatus {
                    unlocked: unlocked_at.is_some(),
                    unlocked_at,
                    rule,
                }
            })
            .collect())
    }
}
