//! Route catalog entities - routes, breakpoints, and their mini-quests.
//!
//! Routes are imported in bulk and immutable afterwards, except for the
//! story fields which the story pipeline fills lazily. Breakpoints carry a
//! contiguous `order_index` starting at 0 within their route.

use serde::{Deserialize, Serialize};

use crate::ids::{BreakpointId, MiniQuestId, RouteId};

/// Route difficulty on the 0..=3 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Numeric level, 0 for easy through 3 for expert.
    pub fn level(self) -> u8 {
        match self {
            Difficulty::Easy => 0,
            Difficulty::Medium => 1,
            Difficulty::Hard => 2,
            Difficulty::Expert => 3,
        }
    }

    /// Inverse of [`Difficulty::level`]. Values above 3 are rejected.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Difficulty::Easy),
            1 => Some(Difficulty::Medium),
            2 => Some(Difficulty::Hard),
            3 => Some(Difficulty::Expert),
            _ => None,
        }
    }

    /// Completion XP multiplier for this difficulty.
    pub fn xp_multiplier(self) -> f64 {
        match self {
            Difficulty::Easy => 1.0,
            Difficulty::Medium => 1.2,
            Difficulty::Hard => 1.5,
            Difficulty::Expert => 2.0,
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
            Difficulty::Expert => write!(f, "expert"),
        }
    }
}

/// Geographic position of a breakpoint. Latitude and longitude always travel
/// together; a breakpoint without a fix has no `Coordinates` at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Closed set of mini-quest flavors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiniQuestKind {
    Photo,
    Observation,
    Collection,
    Puzzle,
}

impl std::fmt::Display for MiniQuestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MiniQuestKind::Photo => write!(f, "photo"),
            MiniQuestKind::Observation => write!(f, "observation"),
            MiniQuestKind::Collection => write!(f, "collection"),
            MiniQuestKind::Puzzle => write!(f, "puzzle"),
        }
    }
}

impl std::str::FromStr for MiniQuestKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "photo" => Ok(MiniQuestKind::Photo),
            "observation" => Ok(MiniQuestKind::Observation),
            "collection" => Ok(MiniQuestKind::Collection),
            "puzzle" => Ok(MiniQuestKind::Puzzle),
            _ => Err(()),
        }
    }
}

/// What the mini-quest asks of the user.
///
/// Puzzle quests carry a quiz payload; everything else is a plain task line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestTask {
    Quiz {
        question: String,
        choices: Vec<String>,
        correct_index: usize,
    },
    Plain(String),
}

impl QuestTask {
    /// Quiz payloads need exactly 4 choices and an in-range answer.
    pub fn is_well_formed(&self) -> bool {
        match self {
            QuestTask::Plain(text) => !text.trim().is_empty(),
            QuestTask::Quiz {
                question,
                choices,
                correct_index,
            } => !question.trim().is_empty() && choices.len() == 4 && *correct_index < choices.len(),
        }
    }
}

/// A mini-quest attached to one breakpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniQuest {
    pub id: MiniQuestId,
    pub breakpoint_id: BreakpointId,
    pub kind: MiniQuestKind,
    pub task: QuestTask,
    pub xp_reward: i64,
}

impl MiniQuest {
    /// Reward scales with position along the route: `10 + 5 * order_index`,
    /// capped at 40.
    pub fn reward_for_order(order_index: u32) -> i64 {
        (10 + 5 * i64::from(order_index)).min(40)
    }
}

/// An ordered point of interest along a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub id: BreakpointId,
    pub route_id: RouteId,
    pub order_index: u32,
    pub poi_name: Option<String>,
    pub poi_type: Option<String>,
    pub coordinates: Option<Coordinates>,
    /// Chapter body, filled by stage B of the story pipeline.
    pub main_quest_snippet: Option<String>,
    pub mini_quests: Vec<MiniQuest>,
}

impl Breakpoint {
    pub fn has_chapter(&self) -> bool {
        self.main_quest_snippet
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// Route-level story fields, filled by stage A of the story pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteStory {
    pub prologue_title: Option<String>,
    pub prologue_body: Option<String>,
    pub epilogue_body: Option<String>,
}

impl RouteStory {
    pub fn has_skeleton(&self) -> bool {
        self.prologue_body
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// A route with its eagerly loaded breakpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub title: String,
    /// Normalized lowercase category, e.g. "hiking".
    pub category: String,
    pub length_m: f64,
    pub duration_min: i64,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub location: Option<String>,
    pub elevation_m: Option<f64>,
    pub gpx: Option<String>,
    pub base_xp_reward: i64,
    /// XP gate: profiles below this total cannot engage the route.
    pub xp_required: i64,
    pub story: RouteStory,
    /// Ordered by `order_index`.
    pub breakpoints: Vec<Breakpoint>,
}

/// At most this many tags are surfaced to clients.
pub const SURFACED_TAG_LIMIT: usize = 3;

impl Route {
    pub fn length_km(&self) -> f64 {
        self.length_m / 1000.0
    }

    /// The first three tags, the rest stay internal to scoring.
    pub fn surfaced_tags(&self) -> &[String] {
        &self.tags[..self.tags.len().min(SURFACED_TAG_LIMIT)]
    }

    /// True once the skeleton and every chapter are present.
    pub fn story_complete(&self) -> bool {
        self.story.has_skeleton() && self.breakpoints.iter().all(Breakpoint::has_chapter)
    }
}
