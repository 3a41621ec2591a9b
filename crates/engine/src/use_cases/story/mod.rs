//! Route story pipeline.
//!
//! Two stages: a route-level skeleton (prologue, outline, epilogue) and one
//! chapter per breakpoint, each grounded in that breakpoint's historical
//! context. Every successful stage persists immediately, so a crash resumes
//! from the last persisted point and regeneration is idempotent unless
//! forced. Concurrent requests for the same route share one run.

pub mod prompts;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use serde::Deserialize;

use trailweaver_domain::{
    Breakpoint, MiniQuest, MiniQuestKind, NarrativeStyle, QuestTask, Route, RouteId, RouteStory,
};

use crate::config::StoryConfig;
use crate::infrastructure::gate::SingleFlight;
use crate::infrastructure::history::{HistoricalContext, HistoricalContextProvider};
use crate::infrastructure::ports::{
    CompletionRequest, LlmError, LlmPort, NewMiniQuest, RouteRepo,
};

use prompts::{
    chapter_prompt, fallback_outline_beat, fallback_skeleton, skeleton_prompt, CHAPTER_SYSTEM,
    SKELETON_SYSTEM,
};

/// A chapter must quote the historical context verbatim, or at least a
/// slice of this many characters.
const MIN_MENTION_CHARS: usize = 100;

/// Quests persisted per breakpoint, at most.
const MAX_QUESTS_PER_BREAKPOINT: usize = 2;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoryError {
    #[error("Route not found: {0}")]
    RouteNotFound(RouteId),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<crate::infrastructure::ports::RepoError> for StoryError {
    fn from(e: crate::infrastructure::ports::RepoError) -> Self {
        StoryError::Storage(e.to_string())
    }
}

/// Outcome of one pipeline run for one route.
#[derive(Debug, Clone)]
pub struct StoryStatus {
    pub route_id: RouteId,
    /// Skeleton was produced in this run (not already persisted).
    pub skeleton_generated: bool,
    /// Skeleton came from the deterministic template, not the model.
    pub skeleton_from_template: bool,
    pub chapters_generated: usize,
    pub chapters_skipped: usize,
    pub chapters_failed: usize,
    /// Skeleton present and no chapter holes remain.
    pub complete: bool,
    /// Rough completion-token estimate for budget accounting.
    pub estimated_tokens: u64,
}

impl StoryStatus {
    fn new(route_id: RouteId) -> Self {
        Self {
            route_id,
            skeleton_generated: false,
            skeleton_from_template: false,
            chapters_generated: 0,
            chapters_skipped: 0,
            chapters_failed: 0,
            complete: false,
            estimated_tokens: 0,
        }
    }
}

/// Batch-mode tally.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchReport {
    pub attempted: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
    pub skipped_over_budget: usize,
}

/// The generation steps, separated from the single-flight bookkeeping so
/// the in-flight future owns its collaborators.
#[derive(Clone)]
struct StoryPipeline {
    routes: Arc<dyn RouteRepo>,
    llm: Arc<dyn LlmPort>,
    history: Arc<HistoricalContextProvider>,
}

pub struct StoryService {
    pipeline: StoryPipeline,
    flights: SingleFlight<RouteId, Result<StoryStatus, StoryError>>,
    config: StoryConfig,
}

impl StoryService {
    pub fn new(
        routes: Arc<dyn RouteRepo>,
        llm: Arc<dyn LlmPort>,
        history: Arc<HistoricalContextProvider>,
        config: StoryConfig,
    ) -> Self {
        Self {
            pipeline: StoryPipeline {
                routes,
                llm,
                history,
            },
            flights: SingleFlight::new(),
            config,
        }
    }

    /// Generate (or resume) the story for one route. Idempotent: persisted
    /// fields are skipped unless `force` is set, which rewrites everything.
    pub async fn generate(&self, route_id: RouteId, force: bool) -> Result<StoryStatus, StoryError> {
        let pipeline = self.pipeline.clone();
        self.flights
            .run(route_id, move || {
                async move { pipeline.run(route_id, force).await }.boxed()
            })
            .await
    }

    /// Batch mode: run the pipeline over every route with a story hole,
    /// bounded by the configured concurrency and token budget.
    pub async fn generate_missing(&self) -> Result<BatchReport, StoryError> {
        let ids = self.pipeline.routes.routes_missing_story().await?;
        let mut report = BatchReport {
            attempted: ids.len(),
            ..BatchReport::default()
        };

        let spent = Arc::new(AtomicU64::new(0));
        let budget = self.config.batch_token_budget;

        let outcomes: Vec<_> = stream::iter(ids)
            .map(|route_id| {
                let spent = Arc::clone(&spent);
                async move {
                    if spent.load(Ordering::Relaxed) >= budget {
                        tracing::warn!(route_id = %route_id, budget,
                            "Skipping route: batch token budget exhausted");
                        return None;
                    }
                    let outcome = self.generate(route_id, false).await;
                    if let Ok(status) = &outcome {
                        spent.fetch_add(status.estimated_tokens, Ordering::Relaxed);
                    }
                    Some(outcome)
                }
            })
            .buffer_unordered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                None => report.skipped_over_budget += 1,
                Some(Ok(status)) if status.complete => report.complete += 1,
                Some(Ok(_)) => report.partial += 1,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Batch story generation failed for a route");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            complete = report.complete,
            partial = report.partial,
            failed = report.failed,
            skipped = report.skipped_over_budget,
            "Batch story generation finished"
        );
        Ok(report)
    }
}

impl StoryPipeline {
    async fn run(&self, route_id: RouteId, force: bool) -> Result<StoryStatus, StoryError> {
        let mut route = self
            .routes
            .get_with_breakpoints(route_id)
            .await?
            .ok_or(StoryError::RouteNotFound(route_id))?;

        if force {
            self.routes.clear_story(route_id).await?;
            route = self
                .routes
                .get_with_breakpoints(route_id)
                .await?
                .ok_or(StoryError::RouteNotFound(route_id))?;
        }

        let style = NarrativeStyle::Adventure;
        let mut status = StoryStatus::new(route_id);

        // Stage A: skeleton. Persisted prologue means this already ran.
        let mut outline: Vec<String> = Vec::new();
        if !route.story.has_skeleton() {
            let (story, generated_outline, from_template) = self.stage_a(&route, style).await;
            self.routes.persist_skeleton(route_id, story.clone()).await?;
            status.skeleton_generated = true;
            status.skeleton_from_template = from_template;
            status.estimated_tokens += estimate_tokens(&story);
            route.story = story;
            outline = generated_outline;
        }

        // Stage B: one chapter per breakpoint, in order.
        let contexts = self.history.load_for_route(route_id).await;
        let mut previous_closing: Option<String> = None;
        for (index, breakpoint) in route.breakpoints.iter().enumerate() {
            if breakpoint.has_chapter() {
                status.chapters_skipped += 1;
                previous_closing = breakpoint
                    .main_quest_snippet
                    .as_deref()
                    .and_then(closing_sentence);
                continue;
            }

            let context = HistoricalContextProvider::context_for(&contexts, breakpoint);
            let beat = outline
                .get(index)
                .cloned()
                .unwrap_or_else(|| fallback_outline_beat(breakpoint));

            match self
                .stage_b(&route, breakpoint, style, &beat, previous_closing.as_deref(), &context)
                .await
            {
                Ok((body, quests)) => {
                    self.routes
                        .persist_chapter(breakpoint.id, body.clone(), quests)
                        .await?;
                    status.estimated_tokens += (body.len() / 4) as u64;
                    previous_closing = closing_sentence(&body);
                    status.chapters_generated += 1;
                }
                Err(e) => {
                    // The chapter stays unfilled; a later run retries it.
                    tracing::warn!(route_id = %route_id, breakpoint = breakpoint.order_index,
                        error = %e, "Chapter generation failed, leaving hole");
                    status.chapters_failed += 1;
                    previous_closing = None;
                }
            }
        }

        status.complete = route.story.has_skeleton() && status.chapters_failed == 0;
        Ok(status)
    }

    /// One call for prologue + outline + epilogue. A malformed response gets
    /// one more attempt; after that the deterministic template wins.
    async fn stage_a(
        &self,
        route: &Route,
        style: NarrativeStyle,
    ) -> (RouteStory, Vec<String>, bool) {
        let prompt = skeleton_prompt(route, style);

        for attempt in 0..2 {
            let request = CompletionRequest::json(&prompt)
                .with_system(SKELETON_SYSTEM)
                .with_temperature(0.8)
                .with_max_tokens(1500);
            match self.llm.complete(request).await {
                Ok(response) => match response.parse_json::<SkeletonDraft>() {
                    Ok(draft) if !draft.prologue_body.trim().is_empty() => {
                        return (
                            RouteStory {
                                prologue_title: Some(draft.prologue_title),
                                prologue_body: Some(draft.prologue_body),
                                epilogue_body: Some(draft.epilogue_body),
                            },
                            draft.outline_per_breakpoint,
                            false,
                        );
                    }
                    Ok(_) => {
                        tracing::warn!(route_id = %route.id, attempt,
                            "Skeleton response missing prologue body");
                    }
                    Err(e) => {
                        tracing::warn!(route_id = %route.id, attempt, error = %e,
                            "Skeleton response did not match the expected shape");
                    }
                },
                Err(e) => {
                    tracing::warn!(route_id = %route.id, error = %e,
                        "Skeleton generation unavailable, using template");
                    break;
                }
            }
        }

        let (prologue_title, prologue_body, epilogue_body) = fallback_skeleton(route);
        (
            RouteStory {
                prologue_title: Some(prologue_title),
                prologue_body: Some(prologue_body),
                epilogue_body: Some(epilogue_body),
            },
            Vec::new(),
            true,
        )
    }

    /// One chapter plus its mini-quests.
    async fn stage_b(
        &self,
        route: &Route,
        breakpoint: &Breakpoint,
        style: NarrativeStyle,
        beat: &str,
        previous_closing: Option<&str>,
        context: &HistoricalContext,
    ) -> Result<(String, Vec<NewMiniQuest>), LlmError> {
        let prompt = chapter_prompt(route, breakpoint, style, beat, previous_closing, context);
        let request = CompletionRequest::json(prompt)
            .with_system(CHAPTER_SYSTEM)
            .with_temperature(0.9)
            .with_max_tokens(2200);

        let response = self.llm.complete(request).await?;
        let draft: ChapterDraft = response.parse_json()?;
        if draft.chapter.trim().is_empty() {
            return Err(LlmError::InvalidResponse("empty chapter body".to_string()));
        }

        let (body, appended) = ensure_historical_mention(draft.chapter, &context.text);
        if appended {
            tracing::debug!(route_id = %route.id, breakpoint = breakpoint.order_index,
                "Model omitted the historical context, appended note");
        }

        Ok((body, validate_quests(draft.quests, breakpoint)))
    }
}

// =============================================================================
// Model output shapes
// =============================================================================

#[derive(Debug, Deserialize)]
struct SkeletonDraft {
    prologue_title: String,
    prologue_body: String,
    epilogue_body: String,
    #[serde(default)]
    outline_per_breakpoint: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterDraft {
    chapter: String,
    #[serde(default)]
    quests: Vec<QuestDraft>,
}

#[derive(Debug, Deserialize)]
struct QuestDraft {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    question: Option<String>,
    #[serde(default)]
    choices: Vec<String>,
    #[serde(default)]
    correct_index: Option<usize>,
}

/// Keep well-formed quests (at most two); if the model produced none, fall
/// back to a deterministic observation quest so every breakpoint has one.
fn validate_quests(drafts: Vec<QuestDraft>, breakpoint: &Breakpoint) -> Vec<NewMiniQuest> {
    let xp_reward = MiniQuest::reward_for_order(breakpoint.order_index);

    let mut quests: Vec<NewMiniQuest> = drafts
        .into_iter()
        .filter_map(|draft| {
            let kind: MiniQuestKind = draft.kind.parse().ok()?;
            let task = match kind {
                MiniQuestKind::Puzzle => QuestTask::Quiz {
                    question: draft.question?,
                    choices: draft.choices,
                    correct_index: draft.correct_index?,
                },
                _ => QuestTask::Plain(draft.description?),
            };
            task.is_well_formed().then_some(NewMiniQuest {
                kind,
                task,
                xp_reward,
            })
        })
        .take(MAX_QUESTS_PER_BREAKPOINT)
        .collect();

    if quests.is_empty() {
        let poi = breakpoint.poi_name.as_deref().unwrap_or("this stop");
        quests.push(NewMiniQuest {
            kind: MiniQuestKind::Observation,
            task: QuestTask::Plain(format!(
                "Pause at {poi} and note one detail you would tell a friend about."
            )),
            xp_reward,
        });
    }

    quests
}

// =============================================================================
// Historical-mention guarantee
// =============================================================================

/// True when the chapter quotes the context verbatim, or any slice of at
/// least [`MIN_MENTION_CHARS`] characters of it.
fn mentions_context(chapter: &str, context: &str) -> bool {
    let context = context.trim();
    if context.is_empty() || chapter.contains(context) {
        return true;
    }

    let boundaries: Vec<usize> = context
        .char_indices()
        .map(|(i, _)| i)
        .chain([context.len()])
        .collect();
    let n_chars = boundaries.len() - 1;
    if n_chars <= MIN_MENTION_CHARS {
        return false;
    }
    for start in 0..=(n_chars - MIN_MENTION_CHARS) {
        let slice = &context[boundaries[start]..boundaries[start + MIN_MENTION_CHARS]];
        if chapter.contains(slice) {
            return true;
        }
    }
    false
}

/// The one hard content guarantee: the context appears in the chapter, or a
/// "Historical note:" paragraph carries it literally.
fn ensure_historical_mention(body: String, context: &str) -> (String, bool) {
    if mentions_context(&body, context) {
        (body, false)
    } else {
        (format!("{body}\n\nHistorical note: {context}"), true)
    }
}

/// Crude completion-token estimate for budget accounting.
fn estimate_tokens(story: &RouteStory) -> u64 {
    let chars = story.prologue_title.as_deref().map_or(0, str::len)
        + story.prologue_body.as_deref().map_or(0, str::len)
        + story.epilogue_body.as_deref().map_or(0, str::len);
    (chars / 4) as u64
}

/// Last sentence of a chapter, fed into the next chapter's prompt for
/// continuity.
fn closing_sentence(text: &str) -> Option<String> {
    text.trim()
        .rsplit_terminator(['.', '!', '?'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use trailweaver_domain::{BreakpointId, Difficulty};

    use crate::infrastructure::ports::{CompletionResponse, RepoError};

    // -------------------------------------------------------------------------
    // Fixtures
    // -------------------------------------------------------------------------

    fn breakpoint(id: i64, order_index: u32, poi: &str, chapter: Option<&str>) -> Breakpoint {
        Breakpoint {
            id: BreakpointId::new(id),
            route_id: RouteId::new(1),
            order_index,
            poi_name: Some(poi.to_string()),
            poi_type: Some(poi.to_lowercase()),
            coordinates: None,
            main_quest_snippet: chapter.map(String::from),
            mini_quests: Vec::new(),
        }
    }

    fn route_with(story: RouteStory, breakpoints: Vec<Breakpoint>) -> Route {
        Route {
            id: RouteId::new(1),
            title: "Ridge Loop".to_string(),
            category: "hiking".to_string(),
            length_m: 9_500.0,
            duration_min: 150,
            difficulty: Difficulty::Medium,
            tags: vec![],
            location: Some("Harz".to_string()),
            elevation_m: None,
            gpx: None,
            base_xp_reward: 80,
            xp_required: 0,
            story,
            breakpoints,
        }
    }

    fn bare_route() -> Route {
        route_with(
            RouteStory::default(),
            vec![
                breakpoint(10, 0, "Gate", None),
                breakpoint(11, 1, "Statue", None),
                breakpoint(12, 2, "Bridge", None),
            ],
        )
    }

    /// Scripted model: a fixed skeleton for stage A, a fixed chapter body
    /// for stage B. Counts calls.
    struct ScriptedLlm {
        chapter_body: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedLlm {
        fn new(chapter_body: &str) -> Self {
            Self {
                chapter_body: chapter_body.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                chapter_body: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LlmError::Unavailable {
                    attempts: 3,
                    last_error: "connection refused".to_string(),
                });
            }
            let content = if request.prompt.contains("outline_per_breakpoint") {
                serde_json::json!({
                    "prologue_title": "The Ridge Calls",
                    "prologue_body": "The morning mist parts over the ridge.",
                    "epilogue_body": "The ridge lets you go, but not entirely.",
                    "outline_per_breakpoint": [
                        "The gate opens the journey.",
                        "The statue watches.",
                        "The bridge crosses over."
                    ]
                })
                .to_string()
            } else {
                serde_json::json!({
                    "chapter": self.chapter_body,
                    "quests": [
                        {"type": "photo", "description": "Photograph the landmark."}
                    ]
                })
                .to_string()
            };
            Ok(CompletionResponse { content })
        }
    }

    /// Route repo that serves a fixture and records story writes.
    struct RecordingRepo {
        route: Mutex<Route>,
        skeletons: Mutex<Vec<RouteStory>>,
        chapters: Mutex<Vec<(BreakpointId, String, Vec<NewMiniQuest>)>>,
        cleared: AtomicUsize,
    }

    impl RecordingRepo {
        fn new(route: Route) -> Self {
            Self {
                route: Mutex::new(route),
                skeletons: Mutex::new(Vec::new()),
                chapters: Mutex::new(Vec::new()),
                cleared: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RouteRepo for RecordingRepo {
        async fn list(
            &self,
            _category: Option<String>,
            _limit: Option<u32>,
        ) -> Result<Vec<Route>, RepoError> {
            Ok(vec![self.route.lock().expect("lock").clone()])
        }

        async fn get_with_breakpoints(&self, _id: RouteId) -> Result<Option<Route>, RepoError> {
            Ok(Some(self.route.lock().expect("lock").clone()))
        }

        async fn tags_for(
            &self,
            _ids: Vec<RouteId>,
        ) -> Result<std::collections::HashMap<RouteId, Vec<String>>, RepoError> {
            Ok(Default::default())
        }

        async fn facts_for(
            &self,
            _ids: Vec<RouteId>,
        ) -> Result<std::collections::HashMap<RouteId, crate::infrastructure::ports::RouteFacts>, RepoError>
        {
            Ok(Default::default())
        }

        async fn persist_skeleton(
            &self,
            _route_id: RouteId,
            story: RouteStory,
        ) -> Result<(), RepoError> {
            self.route.lock().expect("lock").story = story.clone();
            self.skeletons.lock().expect("lock").push(story);
            Ok(())
        }

        async fn persist_chapter(
            &self,
            breakpoint_id: BreakpointId,
            body: String,
            quests: Vec<NewMiniQuest>,
        ) -> Result<(), RepoError> {
            let mut route = self.route.lock().expect("lock");
            if let Some(b) = route.breakpoints.iter_mut().find(|b| b.id == breakpoint_id) {
                b.main_quest_snippet = Some(body.clone());
            }
            self.chapters
                .lock()
                .expect("lock")
                .push((breakpoint_id, body, quests));
            Ok(())
        }

        async fn clear_story(&self, _route_id: RouteId) -> Result<(), RepoError> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            let mut route = self.route.lock().expect("lock");
            route.story = RouteStory::default();
            for b in &mut route.breakpoints {
                b.main_quest_snippet = None;
                b.mini_quests.clear();
            }
            Ok(())
        }

        async fn routes_missing_story(&self) -> Result<Vec<RouteId>, RepoError> {
            let route = self.route.lock().expect("lock");
            if route.story_complete() {
                Ok(vec![])
            } else {
                Ok(vec![route.id])
            }
        }

        async fn import(
            &self,
            _seeds: Vec<crate::infrastructure::ports::RouteSeed>,
        ) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn count(&self) -> Result<u64, RepoError> {
            Ok(1)
        }
    }

    fn service_with(
        repo: Arc<RecordingRepo>,
        llm: Arc<ScriptedLlm>,
        history_dir: &std::path::Path,
    ) -> StoryService {
        StoryService::new(
            repo,
            llm,
            Arc::new(HistoricalContextProvider::new(history_dir)),
            StoryConfig::default(),
        )
    }

    // -------------------------------------------------------------------------
    // Pipeline behavior
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn generates_skeleton_and_all_chapters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new("A long chapter about the landmark."));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        let status = service
            .generate(RouteId::new(1), false)
            .await
            .expect("generate");

        assert!(status.skeleton_generated);
        assert!(!status.skeleton_from_template);
        assert_eq!(status.chapters_generated, 3);
        assert_eq!(status.chapters_failed, 0);
        assert!(status.complete);

        let skeletons = repo.skeletons.lock().expect("lock");
        assert_eq!(skeletons.len(), 1);
        assert!(skeletons[0].has_skeleton());

        let chapters = repo.chapters.lock().expect("lock");
        assert_eq!(chapters.len(), 3);
        // Quest XP scales with order: 10, 15, 20.
        let xp: Vec<i64> = chapters
            .iter()
            .map(|(_, _, quests)| quests[0].xp_reward)
            .collect();
        assert_eq!(xp, vec![10, 15, 20]);
        // 1 skeleton call + 3 chapter calls.
        assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn second_run_without_force_changes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new("A long chapter about the landmark."));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        service
            .generate(RouteId::new(1), false)
            .await
            .expect("first run");
        let calls_after_first = llm.calls.load(Ordering::SeqCst);

        let status = service
            .generate(RouteId::new(1), false)
            .await
            .expect("second run");

        assert!(!status.skeleton_generated);
        assert_eq!(status.chapters_generated, 0);
        assert_eq!(status.chapters_skipped, 3);
        assert!(status.complete);
        assert_eq!(llm.calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(repo.skeletons.lock().expect("lock").len(), 1);
        assert_eq!(repo.chapters.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn force_clears_and_rewrites_every_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new("A long chapter about the landmark."));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        service
            .generate(RouteId::new(1), false)
            .await
            .expect("first run");
        let status = service
            .generate(RouteId::new(1), true)
            .await
            .expect("forced run");

        assert_eq!(repo.cleared.load(Ordering::SeqCst), 1);
        assert!(status.skeleton_generated);
        assert_eq!(status.chapters_generated, 3);
        assert_eq!(repo.skeletons.lock().expect("lock").len(), 2);
        assert_eq!(repo.chapters.lock().expect("lock").len(), 6);
    }

    #[tokio::test]
    async fn appends_historical_note_when_model_omits_context() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Artifact only for breakpoints 0 and 2; breakpoint 1 synthesizes.
        let artifact = serde_json::json!({
            "0": "The gate was raised in 1721 to guard the mountain pass, and every traveler \
                  between the valleys paid a toll of two copper coins at its arch.",
            "2": "The stone bridge replaced a rope crossing in 1911 after the spring flood \
                  took the old one, and its middle arch still bears the mason's mark."
        })
        .to_string();
        tokio::fs::write(dir.path().join("1.json"), artifact)
            .await
            .expect("write artifact");

        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new(
            "The walk continues without a word of the past.",
        ));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        service
            .generate(RouteId::new(1), false)
            .await
            .expect("generate");

        let chapters = repo.chapters.lock().expect("lock");
        assert_eq!(chapters.len(), 3);
        for (_, body, _) in chapters.iter() {
            assert!(body.contains("Historical note:"), "missing note in {body}");
        }
        // Curated contexts appear literally; the synthesized one names its POI.
        assert!(chapters[0].1.contains("raised in 1721"));
        assert!(chapters[1].1.contains("Statue"));
        assert!(chapters[2].1.contains("mason's mark"));
    }

    #[tokio::test]
    async fn verbatim_context_needs_no_note() {
        let dir = tempfile::tempdir().expect("tempdir");
        let context = "The gate was raised in 1721 to guard the mountain pass, and every \
                       traveler between the valleys paid a toll of two copper coins.";
        tokio::fs::write(
            dir.path().join("1.json"),
            serde_json::json!({ "0": context }).to_string(),
        )
        .await
        .expect("write artifact");

        let repo = Arc::new(RecordingRepo::new(route_with(
            RouteStory::default(),
            vec![breakpoint(10, 0, "Gate", None)],
        )));
        let body = format!("They stopped at the arch. {context} Then the path bent north.");
        let llm = Arc::new(ScriptedLlm::new(&body));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        service
            .generate(RouteId::new(1), false)
            .await
            .expect("generate");

        let chapters = repo.chapters.lock().expect("lock");
        assert!(!chapters[0].1.contains("Historical note:"));
    }

    #[tokio::test]
    async fn llm_outage_falls_back_to_template_skeleton_and_leaves_chapter_holes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::failing());
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        let status = service
            .generate(RouteId::new(1), false)
            .await
            .expect("generate");

        assert!(status.skeleton_generated);
        assert!(status.skeleton_from_template);
        assert_eq!(status.chapters_failed, 3);
        assert!(!status.complete);

        // The template skeleton persisted even though every chapter failed.
        let skeletons = repo.skeletons.lock().expect("lock");
        assert_eq!(skeletons.len(), 1);
        assert!(skeletons[0].has_skeleton());
        assert!(repo.chapters.lock().expect("lock").is_empty());

        // A later run picks up only the holes.
        let retry = service
            .generate(RouteId::new(1), false)
            .await
            .expect("retry");
        assert!(!retry.skeleton_generated);
        assert_eq!(retry.chapters_failed, 3);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new("A chapter."));
        let service = Arc::new(service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path()));

        let a = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.generate(RouteId::new(1), false).await })
        };
        let b = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.generate(RouteId::new(1), false).await })
        };
        a.await.expect("join").expect("generate");
        b.await.expect("join").expect("generate");

        // One skeleton write total: the second caller joined the first run
        // or found everything persisted.
        assert_eq!(repo.skeletons.lock().expect("lock").len(), 1);
        assert_eq!(repo.chapters.lock().expect("lock").len(), 3);
    }

    #[tokio::test]
    async fn batch_mode_reports_outcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = Arc::new(RecordingRepo::new(bare_route()));
        let llm = Arc::new(ScriptedLlm::new("A chapter."));
        let service = service_with(Arc::clone(&repo), Arc::clone(&llm), dir.path());

        let report = service.generate_missing().await.expect("batch");
        assert_eq!(report.attempted, 1);
        assert_eq!(report.complete, 1);
        assert_eq!(report.failed, 0);

        // Nothing left to do afterwards.
        let report = service.generate_missing().await.expect("batch");
        assert_eq!(report.attempted, 0);
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    #[test]
    fn short_context_requires_verbatim_inclusion() {
        assert!(mentions_context("Before. The old gate. After.", "The old gate."));
        assert!(!mentions_context("No mention here.", "The old gate."));
    }

    #[test]
    fn long_context_accepts_a_hundred_char_slice() {
        let context = "x".repeat(50) + &"y".repeat(60) + &"z".repeat(50);
        // Chapter carries a 110-char middle slice.
        let slice: String = context.chars().skip(30).take(110).collect();
        let chapter = format!("Start. {slice} End.");
        assert!(mentions_context(&chapter, &context));

        let chapter_short_slice: String = context.chars().skip(30).take(50).collect();
        assert!(!mentions_context(&chapter_short_slice, &context));
    }

    #[test]
    fn ensure_mention_appends_note_once() {
        let (body, appended) =
            ensure_historical_mention("A chapter.".to_string(), "A fact about the gate.");
        assert!(appended);
        assert!(body.ends_with("Historical note: A fact about the gate."));

        let (unchanged, appended) = ensure_historical_mention(body.clone(), "A fact about the gate.");
        assert!(!appended);
        assert_eq!(unchanged, body);
    }

    #[test]
    fn closing_sentence_takes_the_last_sentence() {
        assert_eq!(
            closing_sentence("First. Second! And the last one.").as_deref(),
            Some("And the last one")
        );
        assert_eq!(closing_sentence("   ").as_deref(), None);
    }

    #[test]
    fn quest_validation_drops_malformed_puzzles() {
        let breakpoint = breakpoint(10, 0, "Gate", None);
        let drafts = vec![
            QuestDraft {
                kind: "puzzle".to_string(),
                description: None,
                question: Some("Which year?".to_string()),
                choices: vec!["1721".to_string(), "1800".to_string()],
                correct_index: Some(0),
            },
            QuestDraft {
                kind: "treasure-hunt".to_string(),
                description: Some("Unknown type".to_string()),
                question: None,
                choices: vec![],
                correct_index: None,
            },
        ];

        let quests = validate_quests(drafts, &breakpoint);
        // Both invalid: the default observation quest steps in.
        assert_eq!(quests.len(), 1);
        assert_eq!(quests[0].kind, MiniQuestKind::Observation);
    }

    #[test]
    fn quest_validation_keeps_at_most_two() {
        let breakpoint = breakpoint(10, 9, "Gate", None);
        let drafts = (0..4)
            .map(|i| QuestDraft {
                kind: "photo".to_string(),
                description: Some(format!("Shot {i}")),
                question: None,
                choices: vec![],
                correct_index: None,
            })
            .collect();

        let quests = validate_quests(drafts, &breakpoint);
        assert_eq!(quests.len(), 2);
        // Order index 9 caps the reward at 40.
        assert!(quests.iter().all(|q| q.xp_reward == 40));
    }
}
