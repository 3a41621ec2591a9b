//! Plain data types crossing the port boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trailweaver_domain::{
    Coordinates, Difficulty, MiniQuestKind, ProfileId, QuestTask, RouteId, XpBreakdown,
};

/// Souvenir row to insert. Summary and artwork start out null.
#[derive(Debug, Clone)]
pub struct NewSouvenir {
    pub profile_id: ProfileId,
    pub route_id: RouteId,
    pub completed_at: DateTime<Utc>,
    pub total_xp_gained: i64,
    pub xp_breakdown: XpBreakdown,
}

/// Mini-quest to persist alongside a generated chapter.
#[derive(Debug, Clone)]
pub struct NewMiniQuest {
    pub kind: MiniQuestKind,
    pub task: QuestTask,
    pub xp_reward: i64,
}

/// Category and length of a route, used for derived statistics.
#[derive(Debug, Clone)]
pub struct RouteFacts {
    pub title: String,
    pub category: String,
    pub length_m: f64,
}

/// Achievement rule definition used for startup seeding.
#[derive(Debug, Clone)]
pub struct RuleSeed {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub condition: trailweaver_domain::AchievementCondition,
}

/// One breakpoint of an imported route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointSeed {
    pub order_index: u32,
    #[serde(default)]
    pub poi_name: Option<String>,
    #[serde(default)]
    pub poi_type: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

/// One route of a bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSeed {
    pub id: RouteId,
    pub title: String,
    pub category: String,
    pub length_m: f64,
    pub duration_min: i64,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub elevation_m: Option<f64>,
    #[serde(default)]
    pub gpx: Option<String>,
    pub base_xp_reward: i64,
    #[serde(default)]
    pub xp_required: i64,
    #[serde(default)]
    pub breakpoints: Vec<BreakpointSeed>,
}
