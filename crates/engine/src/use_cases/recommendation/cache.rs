//! Cache for feedback-adjusted preference vectors.
//!
//! An adjustment is pure in (base vector, feedback history), so entries are
//! stored under a fingerprint of both: any feedback write produces a new
//! fingerprint and the stale entry is simply never looked up again. The TTL
//! only bounds how long orphaned fingerprints linger until the sweeper
//! drops them.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use trailweaver_domain::{FeedbackRecord, PreferenceVector};

use super::adjust::AdjustedPreferences;

/// Identity of one (base vector, feedback history) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    vector: u64,
    feedback: u64,
}

impl Fingerprint {
    /// The vector is fingerprinted through its JSON encoding, which is
    /// deterministic (fixed field order, sorted tag set). Feedback entries
    /// hash as (id, reason) pairs in sorted order, so listing order does
    /// not matter.
    pub fn of(vector: &PreferenceVector, feedback: &[FeedbackRecord]) -> Self {
        let mut vector_hasher = DefaultHasher::new();
        serde_json::to_string(vector)
            .unwrap_or_default()
            .hash(&mut vector_hasher);

        let mut entries: Vec<(i64, String)> = feedback
            .iter()
            .map(|f| (f.id.value(), f.reason.to_string()))
            .collect();
        entries.sort();
        let mut feedback_hasher = DefaultHasher::new();
        entries.hash(&mut feedback_hasher);

        Self {
            vector: vector_hasher.finish(),
            feedback: feedback_hasher.finish(),
        }
    }
}

struct Slot {
    adjusted: AdjustedPreferences,
    expires_at: Instant,
}

/// Thread-safe store of computed adjustments, keyed by fingerprint.
pub struct AdjustedVectorCache {
    slots: RwLock<HashMap<Fingerprint, Slot>>,
    ttl: Duration,
}

impl AdjustedVectorCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up a live adjustment for this fingerprint.
    pub async fn get(&self, key: Fingerprint) -> Option<AdjustedPreferences> {
        let slots = self.slots.read().await;
        slots
            .get(&key)
            .filter(|slot| Instant::now() < slot.expires_at)
            .map(|slot| slot.adjusted.clone())
    }

    /// Store a freshly computed adjustment under its fingerprint.
    pub async fn put(&self, key: Fingerprint, adjusted: AdjustedPreferences) {
        let slot = Slot {
            adjusted,
            expires_at: Instant::now() + self.ttl,
        };
        self.slots.write().await.insert(key, slot);
    }

    /// Drop every expired slot; returns how many went.
    pub async fn sweep(&self) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        let now = Instant::now();
        slots.retain(|_, slot| now < slot.expires_at);
        before - slots.len()
    }

    /// Force a slot past its deadline (tests only).
    #[cfg(test)]
    async fn expire(&self, key: Fingerprint) {
        if let Some(slot) = self.slots.write().await.get_mut(&key) {
            slot.expires_at = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trailweaver_domain::{
        FeedbackId, FeedbackReason, FitnessLevel, ProfileId, RouteId,
    };

    fn vector(tags: &[&str]) -> PreferenceVector {
        PreferenceVector::from_questionnaire(
            FitnessLevel::Intermediate,
            &tags.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
            None,
        )
    }

    fn record(id: i64, reason: FeedbackReason) -> FeedbackRecord {
        FeedbackRecord {
            id: FeedbackId::new(id),
            profile_id: ProfileId::new(1),
            route_id: RouteId::new(id),
            reason,
            created_at: None,
        }
    }

    fn adjusted(vector: PreferenceVector) -> AdjustedPreferences {
        AdjustedPreferences {
            vector,
            feedback_counts: HashMap::new(),
        }
    }

    #[test]
    fn fingerprint_ignores_feedback_listing_order() {
        let base = vector(&["forest"]);
        let a = record(1, FeedbackReason::TooHard);
        let b = record(2, FeedbackReason::TooFar);

        let forward = Fingerprint::of(&base, &[a.clone(), b.clone()]);
        let reversed = Fingerprint::of(&base, &[b, a]);

        assert_eq!(forward, reversed);
    }

    #[test]
    fn new_feedback_changes_the_fingerprint() {
        let base = vector(&["forest"]);
        let one = Fingerprint::of(&base, &[record(1, FeedbackReason::TooHard)]);
        let two = Fingerprint::of(
            &base,
            &[
                record(1, FeedbackReason::TooHard),
                record(2, FeedbackReason::TooHard),
            ],
        );

        assert_ne!(one, two);
    }

    #[test]
    fn different_vectors_do_not_collide() {
        let feedback = [record(1, FeedbackReason::TooEasy)];
        let forest = Fingerprint::of(&vector(&["forest"]), &feedback);
        let lake = Fingerprint::of(&vector(&["lake"]), &feedback);

        assert_ne!(forest, lake);
    }

    #[tokio::test]
    async fn put_and_get_roundtrip() {
        let cache = AdjustedVectorCache::new(Duration::from_secs(60));
        let base = vector(&["forest"]);
        let key = Fingerprint::of(&base, &[]);

        cache.put(key, adjusted(base.clone())).await;

        let hit = cache.get(key).await.expect("cached");
        assert_eq!(hit.vector, base);
        assert!(cache
            .get(Fingerprint::of(&vector(&["lake"]), &[]))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn expired_slots_are_not_served() {
        let cache = AdjustedVectorCache::new(Duration::from_secs(60));
        let base = vector(&["forest"]);
        let key = Fingerprint::of(&base, &[]);
        cache.put(key, adjusted(base)).await;

        cache.expire(key).await;

        assert!(cache.get(key).await.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_slots() {
        let cache = AdjustedVectorCache::new(Duration::from_secs(60));
        let stale_vector = vector(&["forest"]);
        let live_vector = vector(&["lake"]);
        let stale = Fingerprint::of(&stale_vector, &[]);
        let live = Fingerprint::of(&live_vector, &[]);
        cache.put(stale, adjusted(stale_vector)).await;
        cache.put(live, adjusted(live_vector)).await;

        cache.expire(stale).await;
        assert_eq!(cache.sweep().await, 1);

        assert!(cache.get(stale).await.is_none());
        assert!(cache.get(live).await.is_some());
    }

    #[tokio::test]
    async fn reput_extends_the_deadline() {
        let cache = AdjustedVectorCache::new(Duration::from_secs(60));
        let base = vector(&["forest"]);
        let key = Fingerprint::of(&base, &[]);
        cache.put(key, adjusted(base.clone())).await;
        cache.expire(key).await;

        cache.put(key, adjusted(base)).await;

        assert!(cache.get(key).await.is_some());
        assert_eq!(cache.sweep().await, 0);
    }
}
