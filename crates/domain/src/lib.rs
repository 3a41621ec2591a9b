//! TrailWeaver domain types.
//!
//! Pure data: entities, typed ids, the preference vector, and derived
//! statistics. No I/O lives here.

pub mod entities;
pub mod ids;
pub mod preference;
pub mod stats;

pub use entities::{
    AchievementCondition, AchievementRule, AchievementUnlock, Breakpoint, Coordinates, Difficulty,
    FeedbackReason, FeedbackRecord, MiniQuest, MiniQuestKind, Profile, QuestTask, QuestXp, Route,
    RouteStory, Souvenir, SouvenirSort, XpBreakdown, SURFACED_TAG_LIMIT,
};
pub use ids::{
    AchievementRuleId, BreakpointId, FeedbackId, MiniQuestId, ProfileId, RouteId, SouvenirId,
};
pub use preference::{
    normalize_tag, DifficultyRange, FitnessLevel, NarrativeStyle, PreferenceVector,
};
pub use stats::ProfileStatistics;
