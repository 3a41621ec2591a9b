//! Preference vectors - what a profile wants out of a route.
//!
//! The stored vector is derived once from the onboarding questionnaire and is
//! write-once after that. Feedback never mutates it directly; the
//! recommendation engine derives a transient adjusted copy per request.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Lowest and highest route difficulty the vector accepts, on the 0..=3 scale.
///
/// Bounds are stored as floats because feedback adjustments move them in
/// half-step increments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub lo: f64,
    pub hi: f64,
}

impl DifficultyRange {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, level: f64) -> bool {
        level >= self.lo && level <= self.hi
    }

    /// Restore `0 <= lo <= hi <= 3` after a sequence of adjustments.
    ///
    /// When the bounds cross, the range collapses onto `hi`.
    pub fn clamp(&mut self) {
        self.lo = self.lo.clamp(0.0, 3.0);
        self.hi = self.hi.clamp(0.0, 3.0);
        if self.lo > self.hi {
            self.lo = self.hi;
        }
    }
}

/// Self-reported fitness from the questionnaire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitnessLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for FitnessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitnessLevel::Beginner => write!(f, "beginner"),
            FitnessLevel::Intermediate => write!(f, "intermediate"),
            FitnessLevel::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for FitnessLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(FitnessLevel::Beginner),
            "intermediate" => Ok(FitnessLevel::Intermediate),
            "advanced" => Ok(FitnessLevel::Advanced),
            _ => Err(()),
        }
    }
}

/// Tone the story pipeline writes in for this profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeStyle {
    Adventure,
    Mystery,
    Playful,
}

impl std::fmt::Display for NarrativeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NarrativeStyle::Adventure => write!(f, "adventure"),
            NarrativeStyle::Mystery => write!(f, "mystery"),
            NarrativeStyle::Playful => write!(f, "playful"),
        }
    }
}

impl std::str::FromStr for NarrativeStyle {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adventure" => Ok(NarrativeStyle::Adventure),
            "mystery" => Ok(NarrativeStyle::Mystery),
            "playful" => Ok(NarrativeStyle::Playful),
            _ => Err(()),
        }
    }
}

/// The per-profile preference vector.
///
/// Extra fields are tolerated on read so stored vectors stay forward
/// compatible across releases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceVector {
    pub difficulty_range: DifficultyRange,
    pub min_distance_km: f64,
    pub max_distance_km: f64,
    /// Normalized lowercase tags.
    #[serde(default)]
    pub preferred_tags: BTreeSet<String>,
    pub fitness_level: FitnessLevel,
    pub narrative_style: NarrativeStyle,
}

impl PreferenceVector {
    /// Derive the write-once base vector from questionnaire answers.
    ///
    /// Unrecognized narrative answers fall back to `adventure`.
    pub fn from_questionnaire(
        fitness: FitnessLevel,
        activity_types: &[String],
        narrative: Option<NarrativeStyle>,
    ) -> Self {
        let (difficulty_range, min_distance_km, max_distance_km) = match fitness {
            FitnessLevel::Beginner => (DifficultyRange::new(0.0, 1.0), 0.0, 8.0),
            FitnessLevel::Intermediate => (DifficultyRange::new(1.0, 2.0), 2.0, 15.0),
            FitnessLevel::Advanced => (DifficultyRange::new(1.0, 3.0), 5.0, 30.0),
        };

        let preferred_tags = activity_types
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            difficulty_range,
            min_distance_km,
            max_distance_km,
            preferred_tags,
            fitness_level: fitness,
            narrative_style: narrative.unwrap_or(NarrativeStyle::Adventure),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.preferred_tags.contains(&normalize_tag(tag))
    }
}

/// Case-fold and trim a tag for set membership.
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}
