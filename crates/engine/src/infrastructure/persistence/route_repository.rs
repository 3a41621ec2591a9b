//! SQLite-backed route catalog.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use trailweaver_domain::{
    Breakpoint, BreakpointId, Coordinates, Difficulty, MiniQuest, MiniQuestId, MiniQuestKind,
    QuestTask, Route, RouteId, RouteStory,
};

use crate::infrastructure::ports::{NewMiniQuest, RepoError, RouteFacts, RouteRepo, RouteSeed};

pub struct SqliteRouteRepo {
    pool: SqlitePool,
}

impl SqliteRouteRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn map_route(row: &SqliteRow) -> Result<Route, RepoError> {
        let difficulty_level: i64 = row.get("difficulty");
        let difficulty = Difficulty::from_level(difficulty_level as u8).ok_or_else(|| {
            RepoError::serialization(format!("difficulty out of range: {difficulty_level}"))
        })?;
        let tags: Vec<String> = serde_json::from_str(&row.get::<String, _>("tags"))
            .map_err(|e| RepoError::serialization(format!("tags: {e}")))?;

        Ok(Route {
            id: RouteId::new(row.get("id")),
            title: row.get("title"),
            category: row.get("category"),
            length_m: row.get("length_m"),
            duration_min: row.get("duration_min"),
            difficulty,
            tags,
            location: row.get("location"),
            elevation_m: row.get("elevation_m"),
            gpx: row.get("gpx"),
            base_xp_reward: row.get("base_xp_reward"),
            xp_required: row.get("xp_required"),
            story: RouteStory {
                prologue_title: row.get("prologue_title"),
                prologue_body: row.get("prologue_body"),
                epilogue_body: row.get("epilogue_body"),
            },
            breakpoints: Vec::new(),
        })
    }

    fn map_breakpoint(row: &SqliteRow) -> Breakpoint {
        let latitude: Option<f64> = row.get("latitude");
        let longitude: Option<f64> = row.get("longitude");
        // Lat/lon either both present or both absent; a half-set pair is
        // treated as absent.
        let coordinates = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Breakpoint {
            id: BreakpointId::new(row.get("id")),
            route_id: RouteId::new(row.get("route_id")),
            order_index: row.get::<i64, _>("order_index") as u32,
            poi_name: row.get("poi_name"),
            poi_type: row.get("poi_type"),
            coordinates,
            main_quest_snippet: row.get("main_quest_snippet"),
            mini_quests: Vec::new(),
        }
    }

    /// Attach ordered breakpoints and their mini-quests to a route.
    async fn load_breakpoints(&self, route: &mut Route) -> Result<(), RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM breakpoints WHERE route_id = ? ORDER BY order_index ASC",
        )
        .bind(route.id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("load_breakpoints", e))?;

        let mut breakpoints: Vec<Breakpoint> = rows.iter().map(Self::map_breakpoint).collect();

        let quest_rows = sqlx::query(
            r#"
            SELECT mq.* FROM mini_quests mq
            JOIN breakpoints b ON mq.breakpoint_id = b.id
            WHERE b.route_id = ?
            ORDER BY mq.id ASC
            "#,
        )
        .bind(route.id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("load_mini_quests", e))?;

        let mut quests_by_breakpoint: HashMap<i64, Vec<MiniQuest>> = HashMap::new();
        for row in quest_rows {
            let raw_kind: String = row.get("kind");
            let Ok(kind) = MiniQuestKind::from_str(&raw_kind) else {
                tracing::warn!(kind = %raw_kind, "Skipping mini-quest with unknown kind");
                continue;
            };
            let task: QuestTask = serde_json::from_str(&row.get::<String, _>("task"))
                .map_err(|e| RepoError::serialization(format!("quest task: {e}")))?;
            let breakpoint_id: i64 = row.get("breakpoint_id");
            quests_by_breakpoint
                .entry(breakpoint_id)
                .or_default()
                .push(MiniQuest {
                    id: MiniQuestId::new(row.get("id")),
                    breakpoint_id: BreakpointId::new(breakpoint_id),
                    kind,
                    task,
                    xp_reward: row.get("xp_reward"),
                });
        }

        for breakpoint in &mut breakpoints {
            if let Some(quests) = quests_by_breakpoint.remove(&breakpoint.id.value()) {
                breakpoint.mini_quests = quests;
            }
        }

        route.breakpoints = breakpoints;
        Ok(())
    }
}

#[async_trait]
impl RouteRepo for SqliteRouteRepo {
    async fn list(
        &self,
        category: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<Route>, RepoError> {
        let limit = i64::from(limit.unwrap_or(u32::MAX));
        let rows = match &category {
            Some(category) => {
                sqlx::query("SELECT * FROM routes WHERE category = ? ORDER BY id ASC LIMIT ?")
                    .bind(category)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM routes ORDER BY id ASC LIMIT ?")
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| RepoError::database("list_routes", e))?;

        let mut routes = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut route = Self::map_route(row)?;
            self.load_breakpoints(&mut route).await?;
            routes.push(route);
        }
        Ok(routes)
    }

    async fn get_with_breakpoints(&self, id: RouteId) -> Result<Option<Route>, RepoError> {
        let row = sqlx::query("SELECT * FROM routes WHERE id = ?")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_route", e))?;

        match row {
            Some(row) => {
                let mut route = Self::map_route(&row)?;
                self.load_breakpoints(&mut route).await?;
                Ok(Some(route))
            }
            None => Ok(None),
        }
    }

    async fn tags_for(
        &self,
        ids: Vec<RouteId>,
    ) -> Result<HashMap<RouteId, Vec<String>>, RepoError> {
        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT tags FROM routes WHERE id = ?")
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("tags_for", e))?;
            if let Some(row) = row {
                let tags: Vec<String> = serde_json::from_str(&row.get::<String, _>("tags"))
                    .map_err(|e| RepoError::serialization(format!("tags: {e}")))?;
                result.insert(id, tags);
            }
        }
        Ok(result)
    }

    async fn facts_for(
        &self,
        ids: Vec<RouteId>,
    ) -> Result<HashMap<RouteId, RouteFacts>, RepoError> {
        let mut result = HashMap::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT title, category, length_m FROM routes WHERE id = ?")
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::database("facts_for", e))?;
            if let Some(row) = row {
                result.insert(
                    id,
                    RouteFacts {
                        title: row.get("title"),
                        category: row.get("category"),
                        length_m: row.get("length_m"),
                    },
                );
            }
        }
        Ok(result)
    }

    async fn persist_skeleton(&self, route_id: RouteId, story: RouteStory) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE routes SET prologue_title = ?, prologue_body = ?, epilogue_body = ? WHERE id = ?",
        )
        .bind(&story.prologue_title)
        .bind(&story.prologue_body)
        .bind(&story.epilogue_body)
        .bind(route_id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("persist_skeleton", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Route", route_id));
        }
        Ok(())
    }

    async fn persist_chapter(
        &self,
        breakpoint_id: BreakpointId,
        body: String,
        quests: Vec<NewMiniQuest>,
    ) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("persist_chapter", e))?;

        let result = sqlx::query("UPDATE breakpoints SET main_quest_snippet = ? WHERE id = ?")
            .bind(&body)
            .bind(breakpoint_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("persist_chapter", e))?;
        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Breakpoint", breakpoint_id));
        }

        // Regeneration replaces any previously generated quests.
        sqlx::query("DELETE FROM mini_quests WHERE breakpoint_id = ?")
            .bind(breakpoint_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("persist_chapter", e))?;

        for quest in quests {
            let task_json = serde_json::to_string(&quest.task)
                .map_err(|e| RepoError::serialization(e.to_string()))?;
            sqlx::query(
                "INSERT INTO mini_quests (breakpoint_id, kind, task, xp_reward) VALUES (?, ?, ?, ?)",
            )
            .bind(breakpoint_id.value())
            .bind(quest.kind.to_string())
            .bind(&task_json)
            .bind(quest.xp_reward)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("persist_chapter", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("persist_chapter", e))
    }

    async fn clear_story(&self, route_id: RouteId) -> Result<(), RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("clear_story", e))?;

        sqlx::query(
            "UPDATE routes SET prologue_title = NULL, prologue_body = NULL, epilogue_body = NULL WHERE id = ?",
        )
        .bind(route_id.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("clear_story", e))?;

        sqlx::query(
            "DELETE FROM mini_quests WHERE breakpoint_id IN (SELECT id FROM breakpoints WHERE route_id = ?)",
        )
        .bind(route_id.value())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepoError::database("clear_story", e))?;

        sqlx::query("UPDATE breakpoints SET main_quest_snippet = NULL WHERE route_id = ?")
            .bind(route_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("clear_story", e))?;

        tx.commit()
            .await
            .map_err(|e| RepoError::database("clear_story", e))
    }

    async fn routes_missing_story(&self) -> Result<Vec<RouteId>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM routes
            WHERE prologue_body IS NULL OR prologue_body = ''
               OR EXISTS (
                    SELECT 1 FROM breakpoints b
                    WHERE b.route_id = routes.id
                      AND (b.main_quest_snippet IS NULL OR b.main_quest_snippet = '')
               )
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("routes_missing_story", e))?;

        Ok(rows
            .into_iter()
            .map(|row| RouteId::new(row.get("id")))
            .collect())
    }

    async fn import(&self, seeds: Vec<RouteSeed>) -> Result<u64, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("import_routes", e))?;

        let mut imported = 0u64;
        for seed in seeds {
            let mut breakpoints = seed.breakpoints;
            breakpoints.sort_by_key(|b| b.order_index);
            for (position, breakpoint) in breakpoints.iter().enumerate() {
                if breakpoint.order_index as usize != position {
                    return Err(RepoError::constraint(format!(
                        "route {}: breakpoint order_index not contiguous from 0",
                        seed.id
                    )));
                }
            }

            let tags_json = serde_json::to_string(&seed.tags)
                .map_err(|e| RepoError::serialization(e.to_string()))?;

            // Routes are immutable once imported; a colliding id aborts the
            // whole batch.
            sqlx::query(
                r#"
                INSERT INTO routes
                    (id, title, category, length_m, duration_min, difficulty, tags,
                     location, elevation_m, gpx, base_xp_reward, xp_required)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(seed.id.value())
            .bind(&seed.title)
            .bind(seed.category.trim().to_lowercase())
            .bind(seed.length_m)
            .bind(seed.duration_min)
            .bind(i64::from(seed.difficulty.level()))
            .bind(&tags_json)
            .bind(&seed.location)
            .bind(seed.elevation_m)
            .bind(&seed.gpx)
            .bind(seed.base_xp_reward)
            .bind(seed.xp_required)
            .execute(&mut *tx)
            .await
            .map_err(|e| route_insert_error(seed.id, e))?;

            imported += 1;

            for breakpoint in breakpoints {
                let (latitude, longitude) = match breakpoint.coordinates {
                    Some(c) => (Some(c.latitude), Some(c.longitude)),
                    None => (None, None),
                };
                sqlx::query(
                    r#"
                    INSERT INTO breakpoints
                        (route_id, order_index, poi_name, poi_type, latitude, longitude)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(seed.id.value())
                .bind(i64::from(breakpoint.order_index))
                .bind(&breakpoint.poi_name)
                .bind(&breakpoint.poi_type)
                .bind(latitude)
                .bind(longitude)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("import_routes", e))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| RepoError::database("import_routes", e))?;

        Ok(imported)
    }

    async fn count(&self) -> Result<u64, RepoError> {
        let row = sqlx::query("SELECT COUNT(*) AS routes FROM routes")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::database("count_routes", e))?;
        Ok(row.get::<i64, _>("routes") as u64)
    }
}

/// Classify a failed route insert: a primary-key collision is a conflict
/// the boundary can answer with 409, everything else stays a database error.
fn route_insert_error(id: RouteId, e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            RepoError::constraint(format!("route {id} already exists"))
        }
        _ => RepoError::database("import_routes", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::connection::connect_in_memory;
    use crate::infrastructure::ports::BreakpointSeed;

    async fn repo() -> SqliteRouteRepo {
        let pool = connect_in_memory().await.expect("in-memory pool");
        SqliteRouteRepo::new(pool)
    }

    fn seed(id: i64, category: &str) -> RouteSeed {
        RouteSeed {
            id: RouteId::new(id),
            title: format!("Route {id}"),
            category: category.to_string(),
            length_m: 12_000.0,
            duration_min: 180,
            difficulty: Difficulty::Hard,
            tags: vec!["forest".to_string(), "river".to_string()],
            location: Some("Black Forest".to_string()),
            elevation_m: Some(420.0),
            gpx: None,
            base_xp_reward: 100,
            xp_required: 0,
            breakpoints: vec![
                BreakpointSeed {
                    order_index: 0,
                    poi_name: Some("Gate".to_string()),
                    poi_type: Some("gate".to_string()),
                    coordinates: Some(Coordinates {
                        latitude: 48.0,
                        longitude: 8.2,
                    }),
                },
                BreakpointSeed {
                    order_index: 1,
                    poi_name: Some("Statue".to_string()),
                    poi_type: Some("statue".to_string()),
                    coordinates: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn import_and_get_roundtrip() {
        let repo = repo().await;
        let imported = repo.import(vec![seed(1, "hiking")]).await.expect("import");
        assert_eq!(imported, 1);

        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(route.title, "Route 1");
        assert_eq!(route.category, "hiking");
        assert_eq!(route.difficulty, Difficulty::Hard);
        assert_eq!(route.breakpoints.len(), 2);
        assert_eq!(route.breakpoints[0].order_index, 0);
        assert!(route.breakpoints[0].coordinates.is_some());
        assert!(route.breakpoints[1].coordinates.is_none());
        assert!(!route.story.has_skeleton());
    }

    #[tokio::test]
    async fn import_rejects_duplicate_ids() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking")]).await.expect("import");

        let err = repo
            .import(vec![seed(1, "hiking")])
            .await
            .expect_err("duplicate id");
        assert!(err.is_conflict());

        // The failed transaction left the catalog untouched.
        assert_eq!(repo.count().await.expect("count"), 1);
        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(route.breakpoints.len(), 2, "no duplicate breakpoints");
    }

    #[tokio::test]
    async fn import_rejects_gapped_order_indices() {
        let repo = repo().await;
        let mut bad = seed(9, "hiking");
        bad.breakpoints[1].order_index = 3;

        let err = repo.import(vec![bad]).await.expect_err("should fail");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn list_filters_by_category() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking"), seed(2, "cycling"), seed(3, "hiking")])
            .await
            .expect("import");

        let hiking = repo
            .list(Some("hiking".to_string()), None)
            .await
            .expect("list");
        assert_eq!(hiking.len(), 2);
        assert!(hiking.iter().all(|r| r.category == "hiking"));

        let limited = repo.list(None, Some(2)).await.expect("list");
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn story_persistence_and_clear() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking")]).await.expect("import");

        repo.persist_skeleton(
            RouteId::new(1),
            RouteStory {
                prologue_title: Some("The Gate".to_string()),
                prologue_body: Some("Once upon a trail...".to_string()),
                epilogue_body: Some("And so it ended.".to_string()),
            },
        )
        .await
        .expect("skeleton");

        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        let first_breakpoint = route.breakpoints[0].id;

        repo.persist_chapter(
            first_breakpoint,
            "Chapter one.".to_string(),
            vec![NewMiniQuest {
                kind: MiniQuestKind::Photo,
                task: QuestTask::Plain("Photograph the gate".to_string()),
                xp_reward: 10,
            }],
        )
        .await
        .expect("chapter");

        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        assert!(route.story.has_skeleton());
        assert_eq!(
            route.breakpoints[0].main_quest_snippet.as_deref(),
            Some("Chapter one.")
        );
        assert_eq!(route.breakpoints[0].mini_quests.len(), 1);

        repo.clear_story(RouteId::new(1)).await.expect("clear");
        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        assert!(!route.story.has_skeleton());
        assert!(route.breakpoints[0].main_quest_snippet.is_none());
        assert!(route.breakpoints[0].mini_quests.is_empty());
    }

    #[tokio::test]
    async fn persist_chapter_replaces_quests() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking")]).await.expect("import");
        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        let breakpoint = route.breakpoints[0].id;

        for round in 0..2 {
            repo.persist_chapter(
                breakpoint,
                format!("Draft {round}"),
                vec![NewMiniQuest {
                    kind: MiniQuestKind::Observation,
                    task: QuestTask::Plain(format!("Look around ({round})")),
                    xp_reward: 10,
                }],
            )
            .await
            .expect("chapter");
        }

        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        assert_eq!(route.breakpoints[0].mini_quests.len(), 1);
    }

    #[tokio::test]
    async fn routes_missing_story_tracks_progress() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking")]).await.expect("import");
        assert_eq!(
            repo.routes_missing_story().await.expect("missing"),
            vec![RouteId::new(1)]
        );

        repo.persist_skeleton(
            RouteId::new(1),
            RouteStory {
                prologue_title: Some("T".to_string()),
                prologue_body: Some("B".to_string()),
                epilogue_body: Some("E".to_string()),
            },
        )
        .await
        .expect("skeleton");
        // Chapters still missing.
        assert_eq!(repo.routes_missing_story().await.expect("missing").len(), 1);

        let route = repo
            .get_with_breakpoints(RouteId::new(1))
            .await
            .expect("get")
            .expect("present");
        for breakpoint in &route.breakpoints {
            repo.persist_chapter(breakpoint.id, "Chapter.".to_string(), Vec::new())
                .await
                .expect("chapter");
        }

        assert!(repo.routes_missing_story().await.expect("missing").is_empty());
    }

    #[tokio::test]
    async fn facts_and_tags_lookup() {
        let repo = repo().await;
        repo.import(vec![seed(1, "hiking")]).await.expect("import");

        let tags = repo
            .tags_for(vec![RouteId::new(1), RouteId::new(99)])
            .await
            .expect("tags");
        assert_eq!(tags.len(), 1);
        assert_eq!(
            tags.get(&RouteId::new(1)),
            Some(&vec!["forest".to_string(), "river".to_string()])
        );

        let facts = repo.facts_for(vec![RouteId::new(1)]).await.expect("facts");
        let fact = facts.get(&RouteId::new(1)).expect("present");
        assert_eq!(fact.category, "hiking");
        assert_eq!(fact.length_m, 12_000.0);
    }
}
