//! SQLite pool setup and schema creation.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::infrastructure::ports::RepoError;

/// Open (or create) the database file and ensure the schema exists.
pub async fn connect(database_path: &str) -> Result<SqlitePool, RepoError> {
    let pool = SqlitePool::connect(&format!("sqlite:{database_path}?mode=rwc"))
        .await
        .map_err(|e| RepoError::database("connect", e))?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests. A single connection, so every query sees
/// the same database.
pub async fn connect_in_memory() -> Result<SqlitePool, RepoError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| RepoError::database("connect", e))?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// One table per entity, plus the unlock link table.
async fn create_schema(pool: &SqlitePool) -> Result<(), RepoError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            total_xp INTEGER NOT NULL DEFAULT 0,
            level INTEGER NOT NULL DEFAULT 1,
            preferences TEXT NOT NULL,
            welcome_summary TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id INTEGER NOT NULL,
            route_id INTEGER NOT NULL,
            reason TEXT NOT NULL,
            created_at TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS routes (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            length_m REAL NOT NULL,
            duration_min INTEGER NOT NULL,
            difficulty INTEGER NOT NULL,
            tags TEXT NOT NULL,
            location TEXT,
            elevation_m REAL,
            gpx TEXT,
            base_xp_reward INTEGER NOT NULL,
            xp_required INTEGER NOT NULL DEFAULT 0,
            prologue_title TEXT,
            prologue_body TEXT,
            epilogue_body TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS breakpoints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            route_id INTEGER NOT NULL,
            order_index INTEGER NOT NULL,
            poi_name TEXT,
            poi_type TEXT,
            latitude REAL,
            longitude REAL,
            main_quest_snippet TEXT,
            UNIQUE (route_id, order_index)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS mini_quests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            breakpoint_id INTEGER NOT NULL,
            kind TEXT NOT NULL,
            task TEXT NOT NULL,
            xp_reward INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS souvenirs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile_id INTEGER NOT NULL,
            route_id INTEGER NOT NULL,
            completed_at TEXT NOT NULL,
            total_xp_gained INTEGER NOT NULL,
            xp_breakdown TEXT NOT NULL,
            summary TEXT,
            artwork_svg TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS achievement_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT NOT NULL,
            icon TEXT NOT NULL,
            condition_type TEXT NOT NULL,
            condition_value TEXT NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS achievement_unlocks (
            profile_id INTEGER NOT NULL,
            rule_id INTEGER NOT NULL,
            unlocked_at TEXT NOT NULL,
            PRIMARY KEY (profile_id, rule_id)
        )
        "#,
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| RepoError::database("create_schema", e))?;
    }

    Ok(())
}
