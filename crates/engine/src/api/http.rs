//! HTTP routes - the thin adapter between the core operations and axum.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use trailweaver_domain::{
    FeedbackReason, FitnessLevel, MiniQuestId, NarrativeStyle, Profile, ProfileId,
    ProfileStatistics, Route, RouteId, Souvenir, SouvenirSort,
};

use crate::app::App;
use crate::infrastructure::ports::RouteSeed;
use crate::use_cases::achievements::{AchievementError, AchievementStatus};
use crate::use_cases::completion::{CompletionError, CompletionOutcome};
use crate::use_cases::profile::{ProfileError, Questionnaire};
use crate::use_cases::recommendation::{RecommendationError, RecommendedRoute};
use crate::use_cases::story::{BatchReport, StoryError, StoryStatus};

/// Listing endpoints cap their page size here.
const MAX_PAGE_SIZE: u32 = 100;

/// Default and ceiling for recommendation list length.
const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;
const MAX_RECOMMENDATION_LIMIT: usize = 50;

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/profiles", post(create_profile).delete(delete_all_profiles))
        .route("/api/profiles/{id}", get(get_profile))
        .route("/api/profiles/{id}/statistics", get(get_statistics))
        .route("/api/profiles/{id}/feedback", post(submit_feedback))
        .route(
            "/api/profiles/{id}/souvenirs",
            post(complete_route).get(list_souvenirs),
        )
        .route(
            "/api/profiles/{id}/achievements",
            get(list_achievements),
        )
        .route(
            "/api/profiles/{id}/achievements/check",
            post(check_achievements),
        )
        .route("/api/routes", get(list_routes))
        .route("/api/routes/import", post(import_routes))
        .route("/api/routes/recommendations", get(recommendations))
        .route("/api/routes/generate-stories", post(generate_stories_batch))
        .route("/api/routes/{id}", get(get_route))
        .route("/api/routes/{id}/generate-story", post(generate_story))
}

async fn health() -> &'static str {
    "OK"
}

// =============================================================================
// Profiles
// =============================================================================

/// Raw questionnaire payload; enum fields are validated here so the core
/// only ever sees well-typed values.
#[derive(Debug, Deserialize)]
struct CreateProfileRequest {
    fitness: String,
    #[serde(default, alias = "type")]
    activity_types: Vec<String>,
    #[serde(default)]
    narrative: Option<String>,
}

async fn create_profile(
    State(app): State<Arc<App>>,
    Json(payload): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<Profile>), ApiError> {
    let fitness = FitnessLevel::from_str(&payload.fitness)
        .map_err(|_| ApiError::BadRequest(format!("unknown fitness level: {}", payload.fitness)))?;
    let narrative = payload
        .narrative
        .as_deref()
        .map(|raw| {
            NarrativeStyle::from_str(raw)
                .map_err(|_| ApiError::BadRequest(format!("unknown narrative style: {raw}")))
        })
        .transpose()?;

    let profile = app
        .use_cases
        .profile
        .create(Questionnaire {
            fitness,
            activity_types: payload.activity_types,
            narrative,
        })
        .await
        .map_err(map_profile_error)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[derive(Debug, Serialize)]
struct DeleteAllResponse {
    deleted_count: u64,
}

async fn delete_all_profiles(
    State(app): State<Arc<App>>,
) -> Result<Json<DeleteAllResponse>, ApiError> {
    let deleted_count = app
        .use_cases
        .profile
        .wipe_all()
        .await
        .map_err(map_profile_error)?;
    Ok(Json(DeleteAllResponse { deleted_count }))
}

async fn get_profile(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Profile>, ApiError> {
    let profile = app
        .use_cases
        .profile
        .get(ProfileId::new(id))
        .await
        .map_err(map_profile_error)?;
    Ok(Json(profile))
}

async fn get_statistics(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<ProfileStatistics>, ApiError> {
    let stats = app
        .use_cases
        .profile
        .statistics(ProfileId::new(id))
        .await
        .map_err(map_profile_error)?;
    Ok(Json(stats))
}

// =============================================================================
// Feedback
// =============================================================================

#[derive(Debug, Deserialize)]
struct SubmitFeedbackRequest {
    route_id: i64,
    reason: String,
}

async fn submit_feedback(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitFeedbackRequest>,
) -> Result<(StatusCode, Json<trailweaver_domain::FeedbackRecord>), ApiError> {
    // Reasons are a closed literal set; anything else is rejected here.
    let reason = FeedbackReason::from_str(&payload.reason)
        .map_err(|_| ApiError::BadRequest(format!("unknown feedback reason: {}", payload.reason)))?;

    let profile_id = ProfileId::new(id);
    let route_id = RouteId::new(payload.route_id);

    app.use_cases
        .profile
        .get(profile_id)
        .await
        .map_err(map_profile_error)?;
    if app
        .repositories
        .routes
        .get_with_breakpoints(route_id)
        .await?
        .is_none()
    {
        return Err(ApiError::NotFound(format!("route {route_id}")));
    }

    let record = app
        .repositories
        .profiles
        .append_feedback(profile_id, route_id, reason)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

// =============================================================================
// Recommendations & Routes
// =============================================================================

#[derive(Debug, Deserialize)]
struct RecommendationParams {
    profile_id: Option<i64>,
    category: Option<String>,
    limit: Option<usize>,
}

async fn recommendations(
    State(app): State<Arc<App>>,
    Query(params): Query<RecommendationParams>,
) -> Result<Json<Vec<RecommendedRoute>>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RECOMMENDATION_LIMIT)
        .min(MAX_RECOMMENDATION_LIMIT);
    let results = app
        .use_cases
        .recommendation
        .recommend(params.profile_id.map(ProfileId::new), params.category, limit)
        .await
        .map_err(map_recommendation_error)?;
    Ok(Json(results))
}

#[derive(Debug, Serialize)]
struct RouteSummary {
    id: RouteId,
    title: String,
    category: String,
    difficulty: trailweaver_domain::Difficulty,
    length_m: f64,
    duration_min: i64,
    tags: Vec<String>,
    has_story: bool,
}

impl From<&Route> for RouteSummary {
    fn from(route: &Route) -> Self {
        Self {
            id: route.id,
            title: route.title.clone(),
            category: route.category.clone(),
            difficulty: route.difficulty,
            length_m: route.length_m,
            duration_min: route.duration_min,
            tags: route.surfaced_tags().to_vec(),
            has_story: route.story_complete(),
        }
    }
}

async fn list_routes(State(app): State<Arc<App>>) -> Result<Json<Vec<RouteSummary>>, ApiError> {
    let routes = app.repositories.routes.list(None, None).await?;
    Ok(Json(routes.iter().map(RouteSummary::from).collect()))
}

#[derive(Debug, Serialize)]
struct ImportRoutesResponse {
    imported: u64,
}

/// Bulk catalog import. Routes are immutable once imported, so a seed
/// whose id is already taken answers 409.
async fn import_routes(
    State(app): State<Arc<App>>,
    Json(seeds): Json<Vec<RouteSeed>>,
) -> Result<(StatusCode, Json<ImportRoutesResponse>), ApiError> {
    let imported = app.repositories.routes.import(seeds).await?;
    Ok((StatusCode::CREATED, Json(ImportRoutesResponse { imported })))
}

async fn get_route(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Route>, ApiError> {
    let route = app
        .repositories
        .routes
        .get_with_breakpoints(RouteId::new(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("route {id}")))?;
    Ok(Json(route))
}

// =============================================================================
// Stories
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct GenerateStoryRequest {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Serialize)]
struct GenerateStoryResponse {
    route: Route,
    status: StoryStatusResponse,
}

#[derive(Debug, Serialize)]
struct StoryStatusResponse {
    complete: bool,
    chapters_generated: usize,
    chapters_skipped: usize,
    chapters_failed: usize,
}

impl From<StoryStatus> for StoryStatusResponse {
    fn from(status: StoryStatus) -> Self {
        Self {
            complete: status.complete,
            chapters_generated: status.chapters_generated,
            chapters_skipped: status.chapters_skipped,
            chapters_failed: status.chapters_failed,
        }
    }
}

async fn generate_story(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    payload: Option<Json<GenerateStoryRequest>>,
) -> Result<Json<GenerateStoryResponse>, ApiError> {
    let force = payload.map(|Json(p)| p.force).unwrap_or(false);
    let route_id = RouteId::new(id);

    let status = app
        .use_cases
        .story
        .generate(route_id, force)
        .await
        .map_err(map_story_error)?;

    // Return the current state, partial or not.
    let route = app
        .repositories
        .routes
        .get_with_breakpoints(route_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("route {id}")))?;

    Ok(Json(GenerateStoryResponse {
        route,
        status: status.into(),
    }))
}

async fn generate_stories_batch(
    State(app): State<Arc<App>>,
) -> Result<Json<BatchReport>, ApiError> {
    let report = app
        .use_cases
        .story
        .generate_missing()
        .await
        .map_err(map_story_error)?;
    Ok(Json(report))
}

// =============================================================================
// Completions & Souvenirs
// =============================================================================

#[derive(Debug, Deserialize)]
struct CompleteRouteRequest {
    route_id: i64,
    #[serde(default)]
    completed_quest_ids: Vec<i64>,
}

async fn complete_route(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    Json(payload): Json<CompleteRouteRequest>,
) -> Result<(StatusCode, Json<CompletionOutcome>), ApiError> {
    let outcome = app
        .use_cases
        .completion
        .complete(
            ProfileId::new(id),
            RouteId::new(payload.route_id),
            payload
                .completed_quest_ids
                .into_iter()
                .map(MiniQuestId::new)
                .collect(),
        )
        .await
        .map_err(map_completion_error)?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

#[derive(Debug, Deserialize)]
struct ListSouvenirsParams {
    sort: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_souvenirs(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
    Query(params): Query<ListSouvenirsParams>,
) -> Result<Json<Vec<Souvenir>>, ApiError> {
    let sort = match params.sort.as_deref() {
        None => SouvenirSort::default(),
        Some(raw) => SouvenirSort::from_str(raw)
            .map_err(|_| ApiError::BadRequest(format!("unknown sort: {raw}")))?,
    };
    let profile_id = ProfileId::new(id);
    app.use_cases
        .profile
        .get(profile_id)
        .await
        .map_err(map_profile_error)?;

    let souvenirs = app
        .repositories
        .profiles
        .list_souvenirs(
            profile_id,
            sort,
            params.limit.unwrap_or(20).min(MAX_PAGE_SIZE),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(souvenirs))
}

// =============================================================================
// Achievements
// =============================================================================

#[derive(Debug, Serialize)]
struct CheckAchievementsResponse {
    newly_unlocked: Vec<String>,
}

async fn check_achievements(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<CheckAchievementsResponse>, ApiError> {
    let newly_unlocked = app
        .use_cases
        .achievements
        .check(ProfileId::new(id))
        .await
        .map_err(map_achievement_error)?;
    Ok(Json(CheckAchievementsResponse { newly_unlocked }))
}

async fn list_achievements(
    State(app): State<Arc<App>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AchievementStatus>>, ApiError> {
    let achievements = app
        .use_cases
        .achievements
        .list_for_profile(ProfileId::new(id))
        .await
        .map_err(map_achievement_error)?;
    Ok(Json(achievements))
}

// =============================================================================
// Error mapping
// =============================================================================

/// Boundary error with a stable kind; internal detail lives only in logs.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error, message) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message),
            ApiError::BadRequest(message) => {
                tracing::warn!(error = %message, "Bad request");
                (StatusCode::BAD_REQUEST, "bad_request", message)
            }
            ApiError::Conflict(message) => {
                tracing::warn!(error = %message, "Conflict");
                (StatusCode::CONFLICT, "conflict", message)
            }
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal API error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

impl From<crate::infrastructure::ports::RepoError> for ApiError {
    fn from(e: crate::infrastructure::ports::RepoError) -> Self {
        if e.is_not_found() {
            ApiError::NotFound(e.to_string())
        } else if e.is_conflict() {
            ApiError::Conflict(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

fn map_profile_error(e: ProfileError) -> ApiError {
    match e {
        ProfileError::ProfileNotFound(id) => ApiError::NotFound(format!("profile {id}")),
        ProfileError::Repo(e) => e.into(),
    }
}

fn map_recommendation_error(e: RecommendationError) -> ApiError {
    match e {
        RecommendationError::ProfileNotFound(id) => ApiError::NotFound(format!("profile {id}")),
        RecommendationError::Repo(e) => e.into(),
    }
}

fn map_story_error(e: StoryError) -> ApiError {
    match e {
        StoryError::RouteNotFound(id) => ApiError::NotFound(format!("route {id}")),
        StoryError::Storage(message) => ApiError::Internal(message),
    }
}

fn map_completion_error(e: CompletionError) -> ApiError {
    match e {
        CompletionError::ProfileNotFound(id) => ApiError::NotFound(format!("profile {id}")),
        CompletionError::RouteNotFound(id) => ApiError::NotFound(format!("route {id}")),
        CompletionError::Repo(e) => e.into(),
    }
}

fn map_achievement_error(e: AchievementError) -> ApiError {
    match e {
        AchievementError::ProfileNotFound(id) => ApiError::NotFound(format!("profile {id}")),
        AchievementError::Repo(e) => e.into(),
    }
}
