//! Negative feedback records - append-only, cleared only by a profile wipe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FeedbackId, ProfileId, RouteId};

/// Why a profile pushed a route away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackReason {
    TooHard,
    TooEasy,
    TooFar,
    NotInterested,
    /// Accepted and counted toward penalties, but not applied to the
    /// adjusted vector. Reserved for a category-aware penalty.
    WrongType,
}

impl FeedbackReason {
    pub fn all() -> [FeedbackReason; 5] {
        [
            FeedbackReason::TooHard,
            FeedbackReason::TooEasy,
            FeedbackReason::TooFar,
            FeedbackReason::NotInterested,
            FeedbackReason::WrongType,
        ]
    }
}

impl std::fmt::Display for FeedbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackReason::TooHard => write!(f, "too-hard"),
            FeedbackReason::TooEasy => write!(f, "too-easy"),
            FeedbackReason::TooFar => write!(f, "too-far"),
            FeedbackReason::NotInterested => write!(f, "not-interested"),
            FeedbackReason::WrongType => write!(f, "wrong-type"),
        }
    }
}

impl std::str::FromStr for FeedbackReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "too-hard" => Ok(FeedbackReason::TooHard),
            "too-easy" => Ok(FeedbackReason::TooEasy),
            "too-far" => Ok(FeedbackReason::TooFar),
            "not-interested" => Ok(FeedbackReason::NotInterested),
            "wrong-type" => Ok(FeedbackReason::WrongType),
            _ => Err(()),
        }
    }
}

/// One feedback entry.
///
/// `created_at` is nullable: installations that predate the timestamp column
/// hold rows without one, and those weigh like fresh feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: FeedbackId,
    pub profile_id: ProfileId,
    pub route_id: RouteId,
    pub reason: FeedbackReason,
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn reasons_roundtrip_through_strings() {
        for reason in FeedbackReason::all() {
            let parsed = FeedbackReason::from_str(&reason.to_string()).expect("roundtrip");
            assert_eq!(parsed, reason);
        }
    }

    #[test]
    fn unknown_reason_is_rejected() {
        assert!(FeedbackReason::from_str("boring").is_err());
        assert!(FeedbackReason::from_str("TOO-HARD").is_err());
    }
}
