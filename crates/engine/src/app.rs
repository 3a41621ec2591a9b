//! Application state and composition.

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::infrastructure::gate::{GatedLlmClient, ProfileLocks};
use crate::infrastructure::history::HistoricalContextProvider;
use crate::infrastructure::ollama::OllamaClient;
use crate::infrastructure::persistence::{
    SqliteAchievementRepo, SqliteProfileRepo, SqliteRouteRepo,
};
use crate::infrastructure::ports::{
    AchievementRepo, ClockPort, LlmPort, ProfileRepo, RouteRepo, RouteSeed, SystemClock,
};
use crate::infrastructure::resilient_llm::{ResilientLlmClient, RetryConfig};
use crate::use_cases::{
    achievements::AchievementService, completion::CompletionService, profile::ProfileService,
    recommendation::RecommendationService, story::StoryService,
};

/// Main application state.
///
/// Holds the repositories and use cases. Passed to HTTP handlers via Axum
/// state.
pub struct App {
    pub config: AppConfig,
    pub repositories: Repositories,
    pub use_cases: UseCases,
}

/// Port traits injected directly; concrete types stay behind `Arc<dyn _>` so
/// tests can substitute them.
pub struct Repositories {
    pub profiles: Arc<dyn ProfileRepo>,
    pub routes: Arc<dyn RouteRepo>,
    pub achievements: Arc<dyn AchievementRepo>,
}

pub struct UseCases {
    pub recommendation: RecommendationService,
    pub story: StoryService,
    pub completion: CompletionService,
    pub achievements: Arc<AchievementService>,
    pub profile: ProfileService,
}

impl App {
    /// Wire the production LLM stack: Ollama behind the process-wide
    /// semaphore, behind the retry policy.
    pub fn production_llm(config: &AppConfig) -> Arc<dyn LlmPort> {
        let ollama = Arc::new(OllamaClient::new(&config.llm));
        let gated = Arc::new(GatedLlmClient::new(ollama, config.llm.max_concurrency));
        Arc::new(ResilientLlmClient::new(
            gated,
            RetryConfig::with_retries(config.llm.retry_attempts),
        ))
    }

    /// Assemble the application over an open database pool and an LLM
    /// client. Tests hand in mocks; `main` hands in [`App::production_llm`].
    pub fn assemble(config: AppConfig, pool: SqlitePool, llm: Arc<dyn LlmPort>) -> App {
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);

        let profiles: Arc<dyn ProfileRepo> =
            Arc::new(SqliteProfileRepo::new(pool.clone(), clock.clone()));
        let routes: Arc<dyn RouteRepo> = Arc::new(SqliteRouteRepo::new(pool.clone()));
        let achievements_repo: Arc<dyn AchievementRepo> =
            Arc::new(SqliteAchievementRepo::new(pool, clock.clone()));

        let history = Arc::new(HistoricalContextProvider::new(config.history_dir.clone()));
        let locks = Arc::new(ProfileLocks::new());

        let achievements = Arc::new(AchievementService::new(
            achievements_repo.clone(),
            profiles.clone(),
            routes.clone(),
        ));

        let recommendation = RecommendationService::new(
            routes.clone(),
            profiles.clone(),
            clock.clone(),
            config.recommendation.clone(),
        );

        let story = StoryService::new(
            routes.clone(),
            llm.clone(),
            history,
            config.story.clone(),
        );

        let completion = CompletionService::new(
            profiles.clone(),
            routes.clone(),
            achievements.clone(),
            llm.clone(),
            locks,
            clock,
            config.xp_per_level,
        );

        let profile = ProfileService::new(profiles.clone(), achievements.clone(), llm);

        App {
            config,
            repositories: Repositories {
                profiles,
                routes,
                achievements: achievements_repo,
            },
            use_cases: UseCases {
                recommendation,
                story,
                completion,
                achievements,
                profile,
            },
        }
    }

    /// Startup seeding: reconcile the achievement rule set, and import the
    /// route catalog when it is empty and a seed file is configured.
    pub async fn seed(&self) -> anyhow::Result<()> {
        self.use_cases.achievements.reconcile_rules().await?;

        let Some(path) = self.config.routes_seed_path.clone() else {
            return Ok(());
        };
        if self.repositories.routes.count().await? > 0 {
            tracing::debug!("Route catalog already populated, skipping seed file");
            return Ok(());
        }

        let raw = tokio::fs::read_to_string(&path).await?;
        let seeds: Vec<RouteSeed> = serde_json::from_str(&raw)?;
        let imported = self.repositories.routes.import(seeds).await?;
        tracing::info!(imported, path = %path, "Route catalog seeded");
        Ok(())
    }
}
