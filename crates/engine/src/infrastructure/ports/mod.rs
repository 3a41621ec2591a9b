//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is
//! concrete types. Ports exist for:
//! - Database access (could swap SQLite -> Postgres)
//! - LLM calls (could swap Ollama -> any OpenAI-compatible endpoint)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;
mod types;

// =============================================================================
// Error Types
// =============================================================================
pub use error::{LlmError, RepoError};

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{CompletionMode, CompletionRequest, CompletionResponse, LlmPort};

// =============================================================================
// Repository Ports
// =============================================================================
pub use repos::{AchievementRepo, ProfileRepo, RouteRepo};

// =============================================================================
// Port Types
// =============================================================================
pub use types::{BreakpointSeed, NewMiniQuest, NewSouvenir, RouteFacts, RouteSeed, RuleSeed};

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::{ClockPort, SystemClock};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::MockLlmPort;
#[cfg(test)]
pub use repos::{MockAchievementRepo, MockProfileRepo, MockRouteRepo};
#[cfg(test)]
pub use testing::{FixedClock, MockClockPort};
