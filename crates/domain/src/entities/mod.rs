//! Domain entities.

pub mod achievement;
pub mod feedback;
pub mod profile;
pub mod route;
pub mod souvenir;

pub use achievement::{AchievementCondition, AchievementRule, AchievementUnlock};
pub use feedback::{FeedbackReason, FeedbackRecord};
pub use profile::Profile;
pub use route::{
    Breakpoint, Coordinates, Difficulty, MiniQuest, MiniQuestKind, QuestTask, Route, RouteStory,
    SURFACED_TAG_LIMIT,
};
pub use souvenir::{QuestXp, Souvenir, SouvenirSort, XpBreakdown};
