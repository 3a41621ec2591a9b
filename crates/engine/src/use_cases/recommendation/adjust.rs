//! Feedback-aware preference adjustment.
//!
//! Given the stored base vector and the profile's feedback history, derive a
//! transient adjusted vector plus per-route penalty counts. The stored vector
//! is never touched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use trailweaver_domain::{normalize_tag, FeedbackReason, FeedbackRecord, PreferenceVector, RouteId};

/// Adjusted vector and the per-route feedback tally it was derived from.
#[derive(Debug, Clone)]
pub struct AdjustedPreferences {
    pub vector: PreferenceVector,
    pub feedback_counts: HashMap<RouteId, u32>,
}

impl AdjustedPreferences {
    /// Multiplicative penalty `base^k` for a route with `k` feedback entries.
    pub fn penalty_multiplier(&self, route_id: RouteId, penalty_base: f64) -> f64 {
        match self.feedback_counts.get(&route_id) {
            Some(&k) => penalty_base.powi(k as i32),
            None => 1.0,
        }
    }

    pub fn feedback_count(&self, route_id: RouteId) -> u32 {
        self.feedback_counts.get(&route_id).copied().unwrap_or(0)
    }

    /// Routes at or past the threshold are never scored.
    pub fn is_filtered(&self, route_id: RouteId, filter_threshold: u32) -> bool {
        self.feedback_count(route_id) >= filter_threshold
    }
}

/// Time-decay weight `2^(-age_days / half_life)`. Entries without a
/// timestamp weigh like fresh ones.
pub fn decay_weight(
    created_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> f64 {
    let Some(created_at) = created_at else {
        return 1.0;
    };
    if half_life_days <= 0.0 {
        return 1.0;
    }
    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    2f64.powf(-age_days / half_life_days)
}

/// Apply the feedback history to a copy of the base vector, in feedback
/// order. `route_tags` supplies the tags of fed-back routes for the
/// `not-interested` removal; routes missing from the lookup contribute
/// nothing to the tag set.
pub fn adjust_vector(
    base: &PreferenceVector,
    feedback: &[FeedbackRecord],
    route_tags: &HashMap<RouteId, Vec<String>>,
    now: DateTime<Utc>,
    half_life_days: f64,
) -> AdjustedPreferences {
    let mut vector = base.clone();
    let mut feedback_counts: HashMap<RouteId, u32> = HashMap::new();

    for record in feedback {
        *feedback_counts.entry(record.route_id).or_default() += 1;

        let w = decay_weight(record.created_at, now, half_life_days);
        match record.reason {
            FeedbackReason::TooHard => {
                vector.difficulty_range.hi = (vector.difficulty_range.hi - 0.5 * w).max(0.0);
            }
            FeedbackReason::TooEasy => {
                vector.difficulty_range.lo = (vector.difficulty_range.lo + 0.5 * w).min(3.0);
            }
            FeedbackReason::TooFar => {
                vector.max_distance_km *= 1.0 - 0.1 * w;
            }
            FeedbackReason::NotInterested => {
                if let Some(tags) = route_tags.get(&record.route_id) {
                    for tag in tags {
                        vector.preferred_tags.remove(&normalize_tag(tag));
                    }
                } else {
                    tracing::debug!(route_id = %record.route_id,
                        "No tag lookup for not-interested feedback, nothing to remove");
                }
            }
            // Recorded and penalized, but not applied to the vector.
            // Reserved for a future category-aware penalty.
            FeedbackReason::WrongType => {}
        }
    }

    vector.difficulty_range.clamp();

    AdjustedPreferences {
        vector,
        feedback_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use trailweaver_domain::{FeedbackId, FitnessLevel, ProfileId};

    fn base() -> PreferenceVector {
        PreferenceVector::from_questionnaire(
            FitnessLevel::Intermediate,
            &["forest".to_string(), "lake".to_string()],
            None,
        )
    }

    fn record(route: i64, reason: FeedbackReason, created_at: Option<DateTime<Utc>>) -> FeedbackRecord {
        FeedbackRecord {
            id: FeedbackId::new(route),
            profile_id: ProfileId::new(1),
            route_id: RouteId::new(route),
            reason,
            created_at,
        }
    }

    #[test]
    fn missing_timestamp_weighs_like_fresh_feedback() {
        let now = Utc::now();
        assert_eq!(decay_weight(None, now, 30.0), 1.0);
        assert_eq!(decay_weight(Some(now), now, 30.0), 1.0);
    }

    #[test]
    fn weight_halves_every_half_life() {
        let now = Utc::now();
        let thirty_days_ago = now - Duration::days(30);
        let weight = decay_weight(Some(thirty_days_ago), now, 30.0);
        assert!((weight - 0.5).abs() < 1e-9);

        let sixty_days_ago = now - Duration::days(60);
        let weight = decay_weight(Some(sixty_days_ago), now, 30.0);
        assert!((weight - 0.25).abs() < 1e-9);
    }

    #[test]
    fn future_timestamps_are_clamped() {
        let now = Utc::now();
        let weight = decay_weight(Some(now + Duration::days(5)), now, 30.0);
        assert_eq!(weight, 1.0);
    }

    #[test]
    fn too_hard_lowers_the_upper_bound() {
        let now = Utc::now();
        let adjusted = adjust_vector(
            &base(),
            &[record(1, FeedbackReason::TooHard, Some(now))],
            &HashMap::new(),
            now,
            30.0,
        );
        assert_eq!(adjusted.vector.difficulty_range.hi, 1.5);
        assert_eq!(adjusted.vector.difficulty_range.lo, 1.0);
    }

    #[test]
    fn too_easy_raises_the_lower_bound() {
        let now = Utc::now();
        let adjusted = adjust_vector(
            &base(),
            &[record(1, FeedbackReason::TooEasy, Some(now))],
            &HashMap::new(),
            now,
            30.0,
        );
        assert_eq!(adjusted.vector.difficulty_range.lo, 1.5);
    }

    #[test]
    fn too_far_shrinks_max_distance() {
        let now = Utc::now();
        let adjusted = adjust_vector(
            &base(),
            &[record(1, FeedbackReason::TooFar, Some(now))],
            &HashMap::new(),
            now,
            30.0,
        );
        assert!((adjusted.vector.max_distance_km - 13.5).abs() < 1e-9);
    }

    #[test]
    fn not_interested_removes_route_tags() {
        let now = Utc::now();
        let mut route_tags = HashMap::new();
        route_tags.insert(RouteId::new(1), vec!["Forest".to_string()]);

        let adjusted = adjust_vector(
            &base(),
            &[record(1, FeedbackReason::NotInterested, Some(now))],
            &route_tags,
            now,
            30.0,
        );
        assert!(!adjusted.vector.preferred_tags.contains("forest"));
        assert!(adjusted.vector.preferred_tags.contains("lake"));
    }

    #[test]
    fn wrong_type_leaves_the_vector_alone_but_counts() {
        let now = Utc::now();
        let adjusted = adjust_vector(
            &base(),
            &[record(1, FeedbackReason::WrongType, Some(now))],
            &HashMap::new(),
            now,
            30.0,
        );
        assert_eq!(adjusted.vector, base());
        assert_eq!(adjusted.feedback_count(RouteId::new(1)), 1);
    }

    #[test]
    fn crossed_bounds_clamp_to_hi() {
        let now = Utc::now();
        // Three too-easy push lo to 2.5; three too-hard pull hi to 0.5.
        let feedback: Vec<_> = (0..3)
            .map(|i| record(i, FeedbackReason::TooEasy, Some(now)))
            .chain((3..6).map(|i| record(i, FeedbackReason::TooHard, Some(now))))
            .collect();

        let adjusted = adjust_vector(&base(), &feedback, &HashMap::new(), now, 30.0);
        let range = adjusted.vector.difficulty_range;
        assert!(range.lo <= range.hi);
        assert!(range.lo >= 0.0 && range.hi <= 3.0);
        assert_eq!(range.lo, range.hi);
    }

    #[test]
    fn penalty_is_exponential_in_feedback_count() {
        let now = Utc::now();
        let feedback = vec![
            record(1, FeedbackReason::TooHard, Some(now)),
            record(1, FeedbackReason::WrongType, Some(now)),
        ];
        let adjusted = adjust_vector(&base(), &feedback, &HashMap::new(), now, 30.0);

        let penalty = adjusted.penalty_multiplier(RouteId::new(1), 0.05);
        assert!((penalty - 0.0025).abs() < 1e-12);
        assert_eq!(adjusted.penalty_multiplier(RouteId::new(2), 0.05), 1.0);
    }

    #[test]
    fn any_feedback_monotonically_decreases_the_penalty() {
        let now = Utc::now();
        let mut feedback = Vec::new();
        let mut previous = 1.0;
        for reason in FeedbackReason::all() {
            feedback.push(record(1, reason, Some(now)));
            let adjusted = adjust_vector(&base(), &feedback, &HashMap::new(), now, 30.0);
            let penalty = adjusted.penalty_multiplier(RouteId::new(1), 0.05);
            assert!(penalty < previous);
            previous = penalty;
        }
    }

    #[test]
    fn filter_threshold_applies_at_exactly_k() {
        let now = Utc::now();
        let feedback: Vec<_> = (0..3)
            .map(|_| record(1, FeedbackReason::TooFar, Some(now)))
            .collect();
        let adjusted = adjust_vector(&base(), &feedback, &HashMap::new(), now, 30.0);

        assert!(adjusted.is_filtered(RouteId::new(1), 3));
        assert!(!adjusted.is_filtered(RouteId::new(2), 3));
    }
}
