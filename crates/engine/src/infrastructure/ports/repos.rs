//! Repository port traits for database access.

use std::collections::HashMap;

use async_trait::async_trait;

use trailweaver_domain::{
    AchievementRule, AchievementRuleId, AchievementUnlock, BreakpointId, FeedbackReason,
    FeedbackRecord, PreferenceVector, Profile, ProfileId, Route, RouteId, RouteStory, Souvenir,
    SouvenirId, SouvenirSort,
};

use super::error::RepoError;
use super::types::{NewMiniQuest, NewSouvenir, RouteFacts, RouteSeed, RuleSeed};

// =============================================================================
// Profile Store
// =============================================================================

/// Profiles plus everything a profile owns: feedback, souvenirs.
///
/// Reads are snapshot-consistent; writes are transactional.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn create(
        &self,
        preferences: PreferenceVector,
        welcome_summary: Option<String>,
    ) -> Result<Profile, RepoError>;

    async fn get(&self, id: ProfileId) -> Result<Option<Profile>, RepoError>;

    /// Destructive reset: removes every profile and every profile-owned row
    /// (feedback, souvenirs, unlocks). Routes and rules survive. Returns the
    /// number of deleted profiles.
    async fn delete_all(&self) -> Result<u64, RepoError>;

    // Feedback
    async fn append_feedback(
        &self,
        profile_id: ProfileId,
        route_id: RouteId,
        reason: FeedbackReason,
    ) -> Result<FeedbackRecord, RepoError>;
    async fn list_feedback(&self, profile_id: ProfileId) -> Result<Vec<FeedbackRecord>, RepoError>;

    // XP
    async fn update_xp_and_level(
        &self,
        profile_id: ProfileId,
        total_xp: i64,
        level: i64,
    ) -> Result<(), RepoError>;

    // Souvenirs
    async fn insert_souvenir(&self, souvenir: NewSouvenir) -> Result<Souvenir, RepoError>;
    async fn set_souvenir_summary(&self, id: SouvenirId, summary: String) -> Result<(), RepoError>;
    async fn set_souvenir_artwork(&self, id: SouvenirId, svg: String) -> Result<(), RepoError>;
    async fn list_souvenirs(
        &self,
        profile_id: ProfileId,
        sort: SouvenirSort,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Souvenir>, RepoError>;

    /// Completion events per route across all profiles - the popularity
    /// proxy for anonymous recommendations.
    async fn completion_counts(&self) -> Result<HashMap<RouteId, u64>, RepoError>;
}

// =============================================================================
// Route Catalog
// =============================================================================

/// Immutable route records with lazily-filled story fields.
///
/// Listings return breakpoints eagerly, ordered by `order_index`, so scoring
/// never re-fetches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RouteRepo: Send + Sync {
    async fn list(
        &self,
        category: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<Route>, RepoError>;

    async fn get_with_breakpoints(&self, id: RouteId) -> Result<Option<Route>, RepoError>;

    /// Tags of the given routes, for feedback-driven tag removal.
    async fn tags_for(
        &self,
        ids: Vec<RouteId>,
    ) -> Result<HashMap<RouteId, Vec<String>>, RepoError>;

    /// Category and length lookups for derived statistics.
    async fn facts_for(
        &self,
        ids: Vec<RouteId>,
    ) -> Result<HashMap<RouteId, RouteFacts>, RepoError>;

    // Story persistence
    async fn persist_skeleton(&self, route_id: RouteId, story: RouteStory) -> Result<(), RepoError>;
    async fn persist_chapter(
        &self,
        breakpoint_id: BreakpointId,
        body: String,
        quests: Vec<NewMiniQuest>,
    ) -> Result<(), RepoError>;
    /// Drops story fields, chapters, and generated quests so a forced
    /// regeneration starts clean.
    async fn clear_story(&self, route_id: RouteId) -> Result<(), RepoError>;
    /// Routes with any missing story field (no skeleton or any chapterless
    /// breakpoint), for batch generation.
    async fn routes_missing_story(&self) -> Result<Vec<RouteId>, RepoError>;

    // Bulk import
    /// Insert new routes with their breakpoints. Routes are immutable once
    /// imported: a seed whose id already exists fails the batch with a
    /// constraint violation.
    async fn import(&self, seeds: Vec<RouteSeed>) -> Result<u64, RepoError>;
    async fn count(&self) -> Result<u64, RepoError>;
}

// =============================================================================
// Achievement Rules & Unlocks
// =============================================================================

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AchievementRepo: Send + Sync {
    /// Insert rules whose keys are not yet present; existing rows stay
    /// untouched. Returns the number of newly inserted rules.
    async fn seed_rules(&self, rules: Vec<RuleSeed>) -> Result<u64, RepoError>;

    async fn list_rules(&self) -> Result<Vec<AchievementRule>, RepoError>;

    async fn list_unlocks(&self, profile_id: ProfileId)
        -> Result<Vec<AchievementUnlock>, RepoError>;

    /// Insert an unlock row. Returns `false` when `(profile, rule)` already
    /// exists - the uniqueness race is a benign conflict, not an error.
    async fn insert_unlock(
        &self,
        profile_id: ProfileId,
        rule_id: AchievementRuleId,
    ) -> Result<bool, RepoError>;
}
