//! Profile lifecycle - onboarding, statistics, the destructive wipe.

use std::sync::Arc;

use serde::Deserialize;

use trailweaver_domain::{
    FitnessLevel, NarrativeStyle, PreferenceVector, Profile, ProfileId, ProfileStatistics,
};

use crate::infrastructure::ports::{CompletionRequest, LlmPort, ProfileRepo, RepoError};
use crate::use_cases::achievements::AchievementService;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile not found: {0}")]
    ProfileNotFound(ProfileId),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Onboarding answers. The boundary parses and validates the raw strings;
/// this is the already-typed form.
#[derive(Debug, Clone, Deserialize)]
pub struct Questionnaire {
    pub fitness: FitnessLevel,
    #[serde(default)]
    pub activity_types: Vec<String>,
    #[serde(default)]
    pub narrative: Option<NarrativeStyle>,
}

pub struct ProfileService {
    profiles: Arc<dyn ProfileRepo>,
    achievements: Arc<AchievementService>,
    llm: Arc<dyn LlmPort>,
}

impl ProfileService {
    pub fn new(
        profiles: Arc<dyn ProfileRepo>,
        achievements: Arc<AchievementService>,
        llm: Arc<dyn LlmPort>,
    ) -> Self {
        Self {
            profiles,
            achievements,
            llm,
        }
    }

    /// Onboard a new profile: derive the write-once vector from the
    /// questionnaire and attach a welcome summary (template on LLM trouble).
    pub async fn create(&self, questionnaire: Questionnaire) -> Result<Profile, ProfileError> {
        let vector = PreferenceVector::from_questionnaire(
            questionnaire.fitness,
            &questionnaire.activity_types,
            questionnaire.narrative,
        );
        let welcome = self.welcome_summary(&vector).await;
        let profile = self.profiles.create(vector, Some(welcome)).await?;
        tracing::info!(profile_id = %profile.id, "Profile created");
        Ok(profile)
    }

    pub async fn get(&self, id: ProfileId) -> Result<Profile, ProfileError> {
        self.profiles
            .get(id)
            .await?
            .ok_or(ProfileError::ProfileNotFound(id))
    }

    /// Destructive reset: every profile and everything it owns.
    pub async fn wipe_all(&self) -> Result<u64, ProfileError> {
        let deleted = self.profiles.delete_all().await?;
        tracing::warn!(deleted, "All profiles wiped");
        Ok(deleted)
    }

    /// Derived statistics, shared with the achievement engine.
    pub async fn statistics(&self, id: ProfileId) -> Result<ProfileStatistics, ProfileError> {
        let profile = self.get(id).await?;
        Ok(self.achievements.derive_statistics(&profile).await?)
    }

    async fn welcome_summary(&self, vector: &PreferenceVector) -> String {
        let tags: Vec<&str> = vector.preferred_tags.iter().map(String::as_str).collect();
        let prompt = format!(
            "Write a two-sentence welcome for a new user of an outdoor route \
             app. Second person, {style} tone, no emoji.\n\
             Fitness level: {fitness}\n\
             Preferred terrain: {tags}\n\
             Preferred distances: {min:.0}-{max:.0} km",
            style = vector.narrative_style,
            fitness = vector.fitness_level,
            tags = if tags.is_empty() {
                "no preference".to_string()
            } else {
                tags.join(", ")
            },
            min = vector.min_distance_km,
            max = vector.max_distance_km,
        );

        match self
            .llm
            .complete(
                CompletionRequest::text(prompt)
                    .with_temperature(0.7)
                    .with_max_tokens(120),
            )
            .await
        {
            Ok(response) if !response.content.trim().is_empty() => {
                response.content.trim().to_string()
            }
            Ok(_) => fallback_welcome(vector),
            Err(e) => {
                tracing::warn!(error = %e, "Welcome summary unavailable, using template");
                fallback_welcome(vector)
            }
        }
    }
}

fn fallback_welcome(vector: &PreferenceVector) -> String {
    format!(
        "Welcome to TrailWeaver! We will match you with {fitness}-friendly routes \
         and tell each one as a {style} story.",
        fitness = vector.fitness_level,
        style = vector.narrative_style,
    )
}
