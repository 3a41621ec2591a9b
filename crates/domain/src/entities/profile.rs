//! Profile entity - the single owner of feedback, souvenirs, and unlocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ProfileId;
use crate::preference::PreferenceVector;

/// A user profile.
///
/// Created once by onboarding. XP and level are mutated only by the
/// completion pipeline; the preference vector is write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub total_xp: i64,
    pub level: i64,
    pub preferences: PreferenceVector,
    pub welcome_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Level for a given XP total: `1 + floor(total_xp / xp_per_level)`.
    pub fn level_for_xp(total_xp: i64, xp_per_level: i64) -> i64 {
        1 + total_xp / xp_per_level.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_formula() {
        assert_eq!(Profile::level_for_xp(0, 300), 1);
        assert_eq!(Profile::level_for_xp(299, 300), 1);
        assert_eq!(Profile::level_for_xp(300, 300), 2);
        assert_eq!(Profile::level_for_xp(500, 300), 2);
        assert_eq!(Profile::level_for_xp(900, 300), 4);
    }
}
