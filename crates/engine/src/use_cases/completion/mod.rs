//! Route completion pipeline.
//!
//! One serialized transaction per profile: validate quests, compute XP,
//! persist the souvenir, then decorate it (LLM summary, pixel-art SVG),
//! bump the profile, and re-evaluate achievements. The souvenir and XP
//! survive any LLM failure; decoration degrades to deterministic fallbacks.

pub mod pixel_svg;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use trailweaver_domain::{
    MiniQuestId, Profile, ProfileId, QuestXp, Route, RouteId, Souvenir, XpBreakdown,
};

use crate::infrastructure::gate::ProfileLocks;
use crate::infrastructure::ports::{
    ClockPort, CompletionRequest, LlmPort, NewSouvenir, ProfileRepo, RepoError, RouteRepo,
};
use crate::use_cases::achievements::AchievementService;

use pixel_svg::{fallback_svg, is_valid_svg};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error("Route not found: {0}")]
    RouteNotFound(RouteId),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// What a completion call hands back to the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub souvenir: Souvenir,
    pub xp_breakdown: XpBreakdown,
    pub total_xp_gained: i64,
    pub new_total_xp: i64,
    pub new_level: i64,
    pub newly_unlocked: Vec<String>,
}

pub struct CompletionService {
    profiles: Arc<dyn ProfileRepo>,
    routes: Arc<dyn RouteRepo>,
    achievements: Arc<AchievementService>,
    llm: Arc<dyn LlmPort>,
    locks: Arc<ProfileLocks>,
    clock: Arc<dyn ClockPort>,
    xp_per_level: i64,
}

impl CompletionService {
    pub fn new(
        profiles: Arc<dyn ProfileRepo>,
        routes: Arc<dyn RouteRepo>,
        achievements: Arc<AchievementService>,
        llm: Arc<dyn LlmPort>,
        locks: Arc<ProfileLocks>,
        clock: Arc<dyn ClockPort>,
        xp_per_level: i64,
    ) -> Self {
        Self {
            profiles,
            routes,
            achievements,
            llm,
            locks,
            clock,
            xp_per_level,
        }
    }

    /// Record one route completion. Serialized per profile: concurrent calls
    /// for the same profile queue up rather than race on XP.
    pub async fn complete(
        &self,
        profile_id: ProfileId,
        route_id: RouteId,
        completed_quest_ids: Vec<MiniQuestId>,
    ) -> Result<CompletionOutcome, CompletionError> {
        let _guard = self.locks.lock(profile_id).await;

        // 1. Load and validate.
        let profile = self
            .profiles
            .get(profile_id)
            .await?
            .ok_or(CompletionError::ProfileNotFound(profile_id))?;
        let route = self
            .routes
            .get_with_breakpoints(route_id)
            .await?
            .ok_or(CompletionError::RouteNotFound(route_id))?;

        let completed = validate_quests(&route, completed_quest_ids);

        // 2. XP.
        let total_quests: usize = route.breakpoints.iter().map(|b| b.mini_quests.len()).sum();
        let quest_count = completed.len();
        let breakdown =
            XpBreakdown::compute(route.base_xp_reward, completed, route.difficulty.xp_multiplier());

        // 3. The souvenir row commits before any LLM work; nothing after
        // this point can take it back.
        let mut souvenir = self
            .profiles
            .insert_souvenir(NewSouvenir {
                profile_id,
                route_id,
                completed_at: self.clock.now(),
                total_xp_gained: breakdown.total,
                xp_breakdown: breakdown.clone(),
            })
            .await?;

        // 4. Summary - template fallback on any LLM trouble.
        let summary = self
            .generate_summary(&profile, &route, &breakdown, quest_count, total_quests)
            .await;
        match self
            .profiles
            .set_souvenir_summary(souvenir.id, summary.clone())
            .await
        {
            Ok(()) => souvenir.summary = Some(summary),
            Err(e) => tracing::warn!(souvenir_id = %souvenir.id, error = %e,
                "Souvenir summary not persisted; a regeneration job may fill it"),
        }

        // 5. Pixel-art SVG - deterministic fallback on invalid output.
        let artwork = self.generate_artwork(&route, &breakdown).await;
        match self
            .profiles
            .set_souvenir_artwork(souvenir.id, artwork.clone())
            .await
        {
            Ok(()) => souvenir.artwork_svg = Some(artwork),
            Err(e) => tracing::warn!(souvenir_id = %souvenir.id, error = %e,
                "Souvenir artwork not persisted; a regeneration job may fill it"),
        }

        // 6. Profile XP and level.
        let new_total_xp = profile.total_xp + breakdown.total;
        let new_level = Profile::level_for_xp(new_total_xp, self.xp_per_level);
        self.profiles
            .update_xp_and_level(profile_id, new_total_xp, new_level)
            .await?;

        // 7. Achievements - failures defer to the next explicit check.
        let newly_unlocked = match self.achievements.check(profile_id).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(profile_id = %profile_id, error = %e,
                    "Achievement evaluation deferred");
                Vec::new()
            }
        };

        tracing::info!(profile_id = %profile_id, route_id = %route_id,
            total_xp_gained = breakdown.total, new_level, "Route completed");

        Ok(CompletionOutcome {
            souvenir,
            total_xp_gained: breakdown.total,
            xp_breakdown: breakdown,
            new_total_xp,
            new_level,
            newly_unlocked,
        })
    }

    async fn generate_summary(
        &self,
        profile: &Profile,
        route: &Route,
        breakdown: &XpBreakdown,
        quest_count: usize,
        total_quests: usize,
    ) -> String {
        let prompt = format!(
            "Write a warm two-sentence completion summary for a user who just \
             finished an outdoor route. Write in a {style} tone, second person.\n\
             Route: {title}\n\
             Length: {length_km:.1} km\n\
             Quests completed: {quest_count} of {total_quests}\n\
             User level: {level}\n\
             XP earned: {xp}",
            style = profile.preferences.narrative_style,
            title = route.title,
            length_km = route.length_km(),
            quest_count = quest_count,
            total_quests = total_quests,
            level = profile.level,
            xp = breakdown.total,
        );

        match self
            .llm
            .complete(
                CompletionRequest::text(prompt)
                    .with_temperature(0.7)
                    .with_max_tokens(160),
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(_) => fallback_summary(&route.title, breakdown.total),
            Err(e) => {
                tracing::warn!(route_id = %route.id, error = %e,
                    "Summary generation unavailable, using template");
                fallback_summary(&route.title, breakdown.total)
            }
        }
    }

    async fn generate_artwork(&self, route: &Route, breakdown: &XpBreakdown) -> String {
        let date = self.clock.now().format("%Y-%m-%d").to_string();
        let prompt = format!(
            "Produce a small pixel-art style SVG (max 120x140) commemorating a \
             finished outdoor route. Flat colors, no gradients, no scripts.\n\
             Title: {title}\n\
             Location: {location}\n\
             Distance: {length_km:.1} km\n\
             XP: {xp}\n\
             Date: {date}\n\
             Respond with the SVG document only.",
            title = route.title,
            location = route.location.as_deref().unwrap_or("unknown"),
            length_km = route.length_km(),
            xp = breakdown.total,
        );

        match self
            .llm
            .complete(
                CompletionRequest::text(prompt)
                    .with_temperature(0.6)
                    .with_max_tokens(1200),
            )
            .await
        {
            Ok(response) if is_valid_svg(&response.content) => response.content.trim().to_string(),
            Ok(_) => {
                tracing::warn!(route_id = %route.id,
                    "Model returned invalid SVG, using deterministic fallback");
                fallback_svg(
                    &route.title,
                    route.location.as_deref(),
                    breakdown.total,
                    &date,
                )
            }
            Err(e) => {
                tracing::warn!(route_id = %route.id, error = %e,
                    "Artwork generation unavailable, using deterministic fallback");
                fallback_svg(
                    &route.title,
                    route.location.as_deref(),
                    breakdown.total,
                    &date,
                )
            }
        }
    }
}

fn fallback_summary(title: &str, total_xp: i64) -> String {
    format!("Congratulations on completing {title}! You earned {total_xp} XP.")
}

/// Keep quest ids that belong to this route, once each; everything else is
/// dropped with a warning.
fn validate_quests(route: &Route, completed_quest_ids: Vec<MiniQuestId>) -> Vec<QuestXp> {
    let known: HashMap<MiniQuestId, i64> = route
        .breakpoints
        .iter()
        .flat_map(|b| b.mini_quests.iter())
        .map(|q| (q.id, q.xp_reward))
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut completed = Vec::new();
    for quest_id in completed_quest_ids {
        if !seen.insert(quest_id) {
            continue;
        }
        match known.get(&quest_id) {
            Some(&xp) => completed.push(QuestXp { quest_id, xp }),
            None => tracing::warn!(route_id = %route.id, quest_id = %quest_id,
                "Dropping completed quest id that does not belong to this route"),
        }
    }
    completed
}
