//! Derived per-profile statistics.
//!
//! Computed from souvenirs, route lookups, and the profile's XP fields.
//! The achievement engine evaluates its rules against this snapshot, and the
//! statistics endpoint returns it verbatim.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStatistics {
    /// Completion events, re-completions included.
    pub routes_completed: u64,
    /// Distinct routes with at least one completion.
    pub distinct_routes_completed: u64,
    /// Sum of completed route lengths, re-completions included.
    pub total_distance_km: f64,
    /// Completion events per route category.
    pub completions_by_category: HashMap<String, u64>,
    pub total_xp: i64,
    pub level: i64,
    pub achievements_unlocked: u64,
}
