//! Souvenirs - the persistent record of one route completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MiniQuestId, ProfileId, RouteId, SouvenirId};

/// XP awarded for one completed mini-quest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestXp {
    pub quest_id: MiniQuestId,
    pub xp: i64,
}

/// How a completion's XP total was computed. Travels as structured JSON;
/// unknown fields are accepted on read and dropped on write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XpBreakdown {
    pub base_xp: i64,
    pub quest_xp: i64,
    #[serde(default)]
    pub completed_quests: Vec<QuestXp>,
    pub multiplier: f64,
    pub total: i64,
}

impl XpBreakdown {
    /// `round((base + quest_xp) * multiplier)`.
    pub fn compute(base_xp: i64, completed_quests: Vec<QuestXp>, multiplier: f64) -> Self {
        let quest_xp: i64 = completed_quests.iter().map(|q| q.xp).sum();
        let total = ((base_xp + quest_xp) as f64 * multiplier).round() as i64;
        Self {
            base_xp,
            quest_xp,
            completed_quests,
            multiplier,
            total,
        }
    }
}

/// One souvenir per completion event; re-completions mint new souvenirs.
///
/// Summary and artwork stay null until their generation succeeds; a
/// regeneration job may fill them later but never alters the breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Souvenir {
    pub id: SouvenirId,
    pub profile_id: ProfileId,
    pub route_id: RouteId,
    pub completed_at: DateTime<Utc>,
    pub total_xp_gained: i64,
    pub xp_breakdown: XpBreakdown,
    pub summary: Option<String>,
    pub artwork_svg: Option<String>,
}

/// Sort orders for souvenir listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SouvenirSort {
    #[default]
    Newest,
    Oldest,
    XpHigh,
    XpLow,
}

impl std::str::FromStr for SouvenirSort {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(SouvenirSort::Newest),
            "oldest" => Ok(SouvenirSort::Oldest),
            "xp_high" => Ok(SouvenirSort::XpHigh),
            "xp_low" => Ok(SouvenirSort::XpLow),
            _ => Err(()),
        }
    }
}
