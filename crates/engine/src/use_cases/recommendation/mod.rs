//! Recommendation engine - candidate scoring, penalties, ranking.

pub mod adjust;
mod cache;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use trailweaver_domain::{Profile, ProfileId, Route, RouteId};

use crate::config::RecommendationConfig;
use crate::infrastructure::ports::{ClockPort, ProfileRepo, RepoError, RouteRepo};

use cache::{AdjustedVectorCache, Fingerprint};

pub use adjust::{adjust_vector, decay_weight, AdjustedPreferences};
pub use scoring::{score_route, ScoreBreakdown, SubScore};

#[derive(Debug, thiserror::Error)]
pub enum RecommendationError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One ranked result. `score` and `breakdown` are absent on anonymous
/// requests, where ordering falls back to the popularity proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedRoute {
    pub route: Route,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub personalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<ScoreBreakdown>,
}

pub struct RecommendationService {
    routes: Arc<dyn RouteRepo>,
    profiles: Arc<dyn ProfileRepo>,
    clock: Arc<dyn ClockPort>,
    adjusted_cache: AdjustedVectorCache,
    config: RecommendationConfig,
}

impl RecommendationService {
    pub fn new(
        routes: Arc<dyn RouteRepo>,
        profiles: Arc<dyn ProfileRepo>,
        clock: Arc<dyn ClockPort>,
        config: RecommendationConfig,
    ) -> Self {
        let ttl = Duration::from_secs(config.adjusted_vector_ttl_secs);
        Self {
            routes,
            profiles,
            clock,
            adjusted_cache: AdjustedVectorCache::new(ttl),
            config,
        }
    }

    /// Rank candidate routes for a profile, or by popularity when no
    /// profile is given. An empty catalog yields an empty list, not an error.
    pub async fn recommend(
        &self,
        profile_id: Option<ProfileId>,
        category: Option<String>,
        limit: usize,
    ) -> Result<Vec<RecommendedRoute>, RecommendationError> {
        let profile = match profile_id {
            Some(id) => Some(
                self.profiles
                    .get(id)
                    .await?
                    .ok_or(RecommendationError::ProfileNotFound(id))?,
            ),
            None => None,
        };

        let candidates = self.routes.list(category, None).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        match profile {
            None => self.rank_by_popularity(candidates, limit).await,
            Some(profile) => self.rank_personalized(profile, candidates, limit).await,
        }
    }

    async fn rank_by_popularity(
        &self,
        candidates: Vec<Route>,
        limit: usize,
    ) -> Result<Vec<RecommendedRoute>, RecommendationError> {
        let counts = self.profiles.completion_counts().await?;
        let mut ranked: Vec<(u64, Route)> = candidates
            .into_iter()
            .map(|route| (counts.get(&route.id).copied().unwrap_or(0), route))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));

        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(_, route)| RecommendedRoute {
                route,
                score: None,
                personalized: false,
                breakdown: None,
            })
            .collect())
    }

    async fn rank_personalized(
        &self,
        profile: Profile,
        candidates: Vec<Route>,
        limit: usize,
    ) -> Result<Vec<RecommendedRoute>, RecommendationError> {
        let adjusted = self.adjusted_preferences(&profile).await?;

        let mut scored: Vec<RecommendedRoute> = Vec::with_capacity(candidates.len());
        for route in candidates {
            // Repeatedly disliked routes are never scored.
            if adjusted.is_filtered(route.id, self.config.filter_threshold) {
                tracing::debug!(route_id = %route.id, profile_id = %profile.id,
                    "Route filtered by feedback threshold");
                continue;
            }

            let mut breakdown = score_route(&route, &adjusted.vector, &self.config);
            let feedback_count = adjusted.feedback_count(route.id);
            if feedback_count > 0 {
                let penalty = adjusted.penalty_multiplier(route.id, self.config.penalty_base);
                breakdown.penalty_multiplier = Some(penalty);
                breakdown.final_score = (breakdown.base_score * penalty).clamp(0.0, 1.0);
            }

            scored.push(RecommendedRoute {
                score: Some(breakdown.final_score),
                personalized: true,
                breakdown: Some(breakdown),
                route,
            });
        }

        scored.sort_by(|a, b| {
            let score_a = a.score.unwrap_or(0.0);
            let score_b = b.score.unwrap_or(0.0);
            score_b
                .total_cmp(&score_a)
                .then_with(|| a.route.difficulty.level().cmp(&b.route.difficulty.level()))
                .then_with(|| a.route.length_m.total_cmp(&b.route.length_m))
                .then_with(|| a.route.id.cmp(&b.route.id))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Sweep expired adjusted-vector entries. Returns the removed count.
    pub async fn sweep_cache(&self) -> usize {
        self.adjusted_cache.sweep().await
    }

    /// Adjusted vector and penalty counts, cached per (vector, feedback)
    /// fingerprint. Any feedback write changes the fingerprint, so stale
    /// entries are never served.
    async fn adjusted_preferences(
        &self,
        profile: &Profile,
    ) -> Result<AdjustedPreferences, RepoError> {
        let feedback = self.profiles.list_feedback(profile.id).await?;
        let key = Fingerprint::of(&profile.preferences, &feedback);

        if let Some(cached) = self.adjusted_cache.get(key).await {
            return Ok(cached);
        }

        // Tags of fed-back routes, needed for the not-interested removal.
        let mut tag_route_ids: Vec<RouteId> = feedback
            .iter()
            .filter(|f| f.reason == trailweaver_domain::FeedbackReason::NotInterested)
            .map(|f| f.route_id)
            .collect();
        tag_route_ids.sort();
        tag_route_ids.dedup();
        let route_tags: HashMap<RouteId, Vec<String>> = if tag_route_ids.is_empty() {
            HashMap::new()
        } else {
            self.routes.tags_for(tag_route_ids).await?
        };

        let adjusted = adjust_vector(
            &profile.preferences,
            &feedback,
            &route_tags,
            self.clock.now(),
            self.config.half_life_days,
        );
        self.adjusted_cache.put(key, adjusted.clone()).await;
        Ok(adjusted)
    }
}
