//! Engine configuration, loaded once at startup from the environment.

use std::time::Duration;

/// LLM endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Base URL of the local Ollama endpoint.
    pub base_url: String,
    /// Model name passed on every request.
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the initial attempt for transient failures.
    pub retry_attempts: u32,
    /// Process-wide bound on in-flight LLM calls.
    pub max_concurrency: usize,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_secs: 60,
            retry_attempts: 2,
            max_concurrency: 4,
        }
    }
}

/// Recommendation scoring knobs. These are configuration, not invariants;
/// the defaults are untuned.
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Feedback time-decay half-life in days.
    pub half_life_days: f64,
    /// Feedback count at which a route is filtered out entirely.
    pub filter_threshold: u32,
    /// Base of the multiplicative feedback penalty (`base^k`).
    pub penalty_base: f64,
    pub weight_difficulty: f64,
    pub weight_distance: f64,
    pub weight_tags: f64,
    /// TTL of the adjusted-vector cache in seconds.
    pub adjusted_vector_ttl_secs: u64,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            half_life_days: 30.0,
            filter_threshold: 3,
            penalty_base: 0.05,
            weight_difficulty: 0.4,
            weight_distance: 0.3,
            weight_tags: 0.3,
            adjusted_vector_ttl_secs: 300,
        }
    }
}

/// Batch story generation bounds.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// Routes generated concurrently in batch mode.
    pub batch_concurrency: usize,
    /// Rough completion-token budget for one batch run.
    pub batch_token_budget: u64,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 2,
            batch_token_budget: 200_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_path: String,
    /// Directory of per-route historical-context artifacts.
    pub history_dir: String,
    /// Optional JSON file the catalog is seeded from when empty.
    pub routes_seed_path: Option<String>,
    pub xp_per_level: i64,
    pub llm: LlmConfig,
    pub recommendation: RecommendationConfig,
    pub story: StoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_path: "trailweaver.db".to_string(),
            history_dir: "data/history".to_string(),
            routes_seed_path: None,
            xp_per_level: 300,
            llm: LlmConfig::default(),
            recommendation: RecommendationConfig::default(),
            story: StoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Malformed values fail startup rather
    /// than silently defaulting.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            server_port: env_parsed("TRAILWEAVER_PORT", defaults.server_port)?,
            database_path: env_string("TRAILWEAVER_DB_PATH", &defaults.database_path),
            history_dir: env_string("TRAILWEAVER_HISTORY_DIR", &defaults.history_dir),
            routes_seed_path: std::env::var("TRAILWEAVER_ROUTES_PATH").ok(),
            xp_per_level: env_parsed("TRAILWEAVER_XP_PER_LEVEL", defaults.xp_per_level)?,
            llm: LlmConfig {
                base_url: env_string("OLLAMA_BASE_URL", &defaults.llm.base_url),
                model: env_string("OLLAMA_MODEL", &defaults.llm.model),
                timeout_secs: env_parsed("TRAILWEAVER_LLM_TIMEOUT_SECS", defaults.llm.timeout_secs)?,
                retry_attempts: env_parsed("TRAILWEAVER_LLM_RETRIES", defaults.llm.retry_attempts)?,
                max_concurrency: env_parsed(
                    "TRAILWEAVER_LLM_CONCURRENCY",
                    defaults.llm.max_concurrency,
                )?,
            },
            recommendation: RecommendationConfig {
                half_life_days: env_parsed(
                    "TRAILWEAVER_FEEDBACK_HALF_LIFE_DAYS",
                    defaults.recommendation.half_life_days,
                )?,
                filter_threshold: env_parsed(
                    "TRAILWEAVER_FILTER_THRESHOLD",
                    defaults.recommendation.filter_threshold,
                )?,
                penalty_base: env_parsed(
                    "TRAILWEAVER_PENALTY_BASE",
                    defaults.recommendation.penalty_base,
                )?,
                weight_difficulty: env_parsed(
                    "TRAILWEAVER_WEIGHT_DIFFICULTY",
                    defaults.recommendation.weight_difficulty,
                )?,
                weight_distance: env_parsed(
                    "TRAILWEAVER_WEIGHT_DISTANCE",
                    defaults.recommendation.weight_distance,
                )?,
                weight_tags: env_parsed(
                    "TRAILWEAVER_WEIGHT_TAGS",
                    defaults.recommendation.weight_tags,
                )?,
                adjusted_vector_ttl_secs: env_parsed(
                    "TRAILWEAVER_ADJUSTED_VECTOR_TTL_SECS",
                    defaults.recommendation.adjusted_vector_ttl_secs,
                )?,
            },
            story: StoryConfig {
                batch_concurrency: env_parsed(
                    "TRAILWEAVER_STORY_BATCH_CONCURRENCY",
                    defaults.story.batch_concurrency,
                )?,
                batch_token_budget: env_parsed(
                    "TRAILWEAVER_STORY_TOKEN_BUDGET",
                    defaults.story.batch_token_budget,
                )?,
            },
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.llm.retry_attempts, 2);
        assert_eq!(config.llm.max_concurrency, 4);
        assert_eq!(config.recommendation.half_life_days, 30.0);
        assert_eq!(config.recommendation.filter_threshold, 3);
        assert_eq!(config.recommendation.penalty_base, 0.05);
        assert_eq!(config.xp_per_level, 300);
        let weight_sum = config.recommendation.weight_difficulty
            + config.recommendation.weight_distance
            + config.recommendation.weight_tags;
        assert!((weight_sum - 1.0).abs() < 1e-9);
    }
}
