//! SQLite-backed achievement rules and unlocks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use trailweaver_domain::{
    AchievementCondition, AchievementRule, AchievementRuleId, AchievementUnlock, ProfileId,
};

use crate::infrastructure::ports::{AchievementRepo, ClockPort, RepoError, RuleSeed};

pub struct SqliteAchievementRepo {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteAchievementRepo {
    pub fn new(pool: SqlitePool, clock: Arc<dyn ClockPort>) -> Self {
        Self { pool, clock }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| RepoError::serialization(format!("timestamp {raw:?}: {e}")))
}

#[async_trait]
impl AchievementRepo for SqliteAchievementRepo {
    async fn seed_rules(&self, rules: Vec<RuleSeed>) -> Result<u64, RepoError> {
        let mut inserted = 0u64;
        for rule in rules {
            let (condition_type, condition_value) = rule.condition.to_parts();
            // Keys are stable identifiers; existing rules stay untouched.
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO achievement_rules
                    (key, name, description, icon, condition_type, condition_value)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(rule.key)
            .bind(rule.name)
            .bind(rule.description)
            .bind(rule.icon)
            .bind(condition_type)
            .bind(&condition_value)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::database("seed_rules", e))?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    async fn list_rules(&self) -> Result<Vec<AchievementRule>, RepoError> {
        let rows = sqlx::query("SELECT * FROM achievement_rules ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::database("list_rules", e))?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let condition_type: String = row.get("condition_type");
            let condition_value: String = row.get("condition_value");
            // A rule from a newer release with an unknown condition type is
            // skipped rather than breaking evaluation of the rest.
            let Some(condition) =
                AchievementCondition::from_parts(&condition_type, &condition_value)
            else {
                tracing::warn!(
                    key = %row.get::<String, _>("key"),
                    condition_type = %condition_type,
                    "Skipping achievement rule with unknown condition type"
                );
                continue;
            };
            rules.push(AchievementRule {
                id: AchievementRuleId::new(row.get("id")),
                key: row.get("key"),
                name: row.get("name"),
                description: row.get("description"),
                icon: row.get("icon"),
                condition,
            });
        }
        Ok(rules)
    }

    async fn list_unlocks(
        &self,
        profile_id: ProfileId,
    ) -> Result<Vec<AchievementUnlock>, RepoError> {
        let rows = sqlx::query(
            "SELECT * FROM achievement_unlocks WHERE profile_id = ? ORDER BY unlocked_at ASC",
        )
        .bind(profile_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepoError::database("list_unlocks", e))?;

        rows.into_iter()
            .map(|row| {
                Ok(AchievementUnlock {
                    profile_id: ProfileId::new(row.get("profile_id")),
                    rule_id: AchievementRuleId::new(row.get("rule_id")),
                    unlocked_at: parse_timestamp(&row.get::<String, _>("unlocked_at"))?,
                })
            })
            .collect()
    }

    async fn insert_unlock(
        &self,
        profile_id: ProfileId,
        rule_id: AchievementRuleId,
    ) -> Result<bool, RepoError> {
        // The primary key makes a duplicate insert a no-op, which keeps
        // concurrent checks idempotent.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO achievement_unlocks (profile_id, rule_id, unlocked_at) VALUES (?, ?, ?)",
        )
        .bind(profile_id.value())
        .bind(rule_id.value())
        .bind(self.clock.now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::database("insert_unlock", e))?;

        Ok(result.rows_affected() == 1)
    }
}
