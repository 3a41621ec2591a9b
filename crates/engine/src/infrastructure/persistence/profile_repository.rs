//! SQLite-backed profile store.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use trailweaver_domain::{
    FeedbackId, FeedbackReason, FeedbackRecord, PreferenceVector, Profile, ProfileId, RouteId,
    Souvenir, SouvenirId, SouvenirSort, XpBreakdown,
};

use crate::infrastructure::ports::{ClockPort, NewSouvenir, ProfileRepo, RepoError};

pub struct SqliteProfileRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteProfileRepo {
    pub fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        Self { pool, clock }
    }

    fn map_profile(row: &SqliteRow) -> Result<Profile, RepoError> {
        let preferences: PreferenceVector =
            serde_json::from_str(&row.get::<String, _>("preferences"))
                .map_err(|e| RepoError::serialization(format!("preferences: {e}")))?;
        Ok(Profile {
            id: ProfileId::new(row.get("id")),
            total_xp: row.get("total_xp"),
            level: row.get("level"),
            preferences,
            welcome_summary: row.get("welcome_summary"),
            created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
            updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        })
    }

    fn map_souvenir(row: &SqliteRow) -> Result<Souvenir, RepoError> {
        let xp_breakdown: XpBreakdown =
            serde_json::from_str(&row.get::<String, _>("xp_breakdown"))
                .map_err(|e| RepoError::serialization(format!("xp_breakdown: {e}")))?;
        Ok(Souvenir {
            id: SouvenirId::new(row.get("id")),
            profile_id: ProfileId::new(row.get("profile_id")),
            route_id: RouteId::new(row.get("route_id")),
            completed_at: parse_timestamp(&row.get::<String, _>("completed_at"))?,
            total_xp_gained: row.get("total_xp_gained"),
            xp_breakdown,
            summary: row.get("summary"),
            artwork_svg: row.get("artwork_svg"),
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("timestamp {raw:?}: {e}")))
}

#[async_trait]
impl ProfileRepo for SqliteProfileRepo {
    async fn create(
        &self,
        preferences: PreferenceVector,
        welcome_summary: Option<String>,
    ) -> Result<Profile, RepoError> {
        let now = self.clock.now();
        let preferences_json = serde_json::to_string(&preferences)
            .map_err(|e| RepoError::serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO profiles (total_xp, level, preferences, welcome_summary, created_at, updated_at)
            VALUES (0, 1, ?, ?, ?, ?)
            "#,
        )
        .bind(&preferences_json)
        .bind(&welcome_summary)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("create_profile", e))?;

        Ok(Profile {
            id: ProfileId::new(result.last_insert_rowid()),
            total_xp: 0,
            level: 1,
            preferences,
            welcome_summary,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get(&self, id: ProfileId) -> Result<Option<Profile>, RepoError> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::database("get_profile", e))?;

        row.as_ref().map(Self::map_profile).transpose()
    }

    async fn delete_all(&self) -> Result<u64, RepoError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::database("delete_all", e))?;

        // Cascade through everything a profile owns before the profiles
        // themselves go.
        for statement in [
            "DELETE FROM achievement_unlocks",
            "DELETE FROM souvenirs",
            "DELETE FROM feedback",
        ] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepoError::database("delete_all", e))?;
        }

        let deleted = sqlx::query("DELETE FROM profiles")
            .execute(&mut *tx)
            .await
            .map_err(|e| RepoError::database("delete_all", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| RepoError::database("delete_all", e))?;

        Ok(deleted)
    }

    async fn append_feedback(
        &self,
        profile_id: ProfileId,
        route_id: RouteId,
        reason: FeedbackReason,
    ) -> Result<FeedbackRecord, RepoError> {
        let now = self.clock.now();
        let result = sqlx::query(
            "INSERT INTO feedback (profile_id, route_id, reason, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(profile_id.value())
        .bind(route_id.value())
        .bind(reason.to_string())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("append_feedback", e))?;

        Ok(FeedbackRecord {
            id: FeedbackId::new(result.last_insert_rowid()),
            profile_id,
            route_id,
            reason,
            created_at: Some(now),
        })
    }

    async fn list_feedback(&self, profile_id: ProfileId) -> Result<Vec<FeedbackRecord>, RepoError> {
        let rows = sqlx::query("SELECT * FROM feedback WHERE profile_id = ? ORDER BY id ASC")
            .bind(profile_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_feedback", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let raw_reason: String = row.get("reason");
            // Unknown reasons (from future releases) are skipped, not fatal.
            let Ok(reason) = FeedbackReason::from_str(&raw_reason) else {
                tracing::warn!(profile_id = %profile_id, reason = %raw_reason,
                    "Skipping feedback row with unknown reason");
                continue;
            };
            let created_at = row
                .get::<Option<String>, _>("created_at")
                .map(|raw| parse_timestamp(&raw))
                .transpose()?;
            records.push(FeedbackRecord {
                id: FeedbackId::new(row.get("id")),
                profile_id,
                route_id: RouteId::new(row.get("route_id")),
                reason,
                created_at,
            });
        }
        Ok(records)
    }

    async fn update_xp_and_level(
        &self,
        profile_id: ProfileId,
        total_xp: i64,
        level: i64,
    ) -> Result<(), RepoError> {
        let result =
            sqlx::query("UPDATE profiles SET total_xp = ?, level = ?, updated_at = ? WHERE id = ?")
                .bind(total_xp)
                .bind(level)
                .bind(self.clock.now().to_rfc3339())
                .bind(profile_id.value())
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::database("update_xp_and_level", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Profile", profile_id));
        }
        Ok(())
    }

    async fn insert_souvenir(&self, souvenir: NewSouvenir) -> Result<Souvenir, RepoError> {
        let breakdown_json = serde_json::to_string(&souvenir.xp_breakdown)
            .map_err(|e| RepoError::serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO souvenirs (profile_id, route_id, completed_at, total_xp_gained, xp_breakdown)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(souvenir.profile_id.value())
        .bind(souvenir.route_id.value())
        .bind(souvenir.completed_at.to_rfc3339())
        .bind(souvenir.total_xp_gained)
        .bind(&breakdown_json)
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("insert_souvenir", e))?;

        Ok(Souvenir {
            id: SouvenirId::new(result.last_insert_rowid()),
            profile_id: souvenir.profile_id,
            route_id: souvenir.route_id,
            completed_at: souvenir.completed_at,
            total_xp_gained: souvenir.total_xp_gained,
            xp_breakdown: souvenir.xp_breakdown,
            summary: None,
            artwork_svg: None,
        })
    }

    async fn set_souvenir_summary(&self, id: SouvenirId, summary: String) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE souvenirs SET summary = ? WHERE id = ?")
            .bind(&summary)
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("set_souvenir_summary", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Souvenir", id));
        }
        Ok(())
    }

    async fn set_souvenir_artwork(&self, id: SouvenirId, svg: String) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE souvenirs SET artwork_svg = ? WHERE id = ?")
            .bind(&svg)
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("set_souvenir_artwork", e))?;

        if result.rows_affected() == 0 {
            return Err(RepoError::not_found("Souvenir", id));
        }
        Ok(())
    }

    async fn list_souvenirs(
        &self,
        profile_id: ProfileId,
        sort: SouvenirSort,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Souvenir>, RepoError> {
        let order_by = match sort {
            SouvenirSort::Newest => "completed_at DESC, id DESC",
            SouvenirSort::Oldest => "completed_at ASC, id ASC",
            SouvenirSort::XpHigh => "total_xp_gained DESC, id DESC",
            SouvenirSort::XpLow => "total_xp_gained ASC, id ASC",
        };
        let sql = format!(
            "SELECT * FROM souvenirs WHERE profile_id = ? ORDER BY {order_by} LIMIT ? OFFSET ?"
        );

        let rows = sqlx::query(&sql)
            .bind(profile_id.value())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_souvenirs", e))?;

        rows.iter().map(Self::map_souvenir).collect()
    }

    async fn completion_counts(&self) -> Result<HashMap<RouteId, u64>, RepoError> {
        let rows = sqlx::query("SELECT route_id, COUNT(*) AS completions FROM souvenirs GROUP BY route_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("completion_counts", e))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    RouteId::new(row.get("route_id")),
                    row.get::<i64, _>("completions") as u64,
                )
            })
            .collect())
    }
}
