//! Versioned, additive schema migrations for the on-device store.
//!
//! Each migration only creates tables or indexes (`IF NOT EXISTS`), runs in its
//! own transaction and is recorded in `schema_migrations`. Re-running against
//! an up-to-date file is a no-op.

use rusqlite::{params, Connection};

use crate::local::{LocalStoreError, LocalStoreResult};

pub const CURRENT_SCHEMA_VERSION: i32 = 5;

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    /// Monotonic version, starting at 1
    pub version: i32,
    /// Short label recorded in `schema_migrations`
    pub name: &'static str,
    /// Batch of `CREATE ... IF NOT EXISTS` statements
    pub sql: &'static str,
}

/// All migrations in version order. Append only.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "results_and_vocabulary",
        sql: r#"
        CREATE TABLE IF NOT EXISTS results (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_results_timestamp ON results(timestamp);

        CREATE TABLE IF NOT EXISTS vocabulary (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            level TEXT NOT NULL,
            last_reviewed INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_vocabulary_last_reviewed ON vocabulary(last_reviewed);
        "#,
    },
    Migration {
        version: 2,
        name: "pronunciation_history",
        sql: r#"
        CREATE TABLE IF NOT EXISTS pronunciation_history (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            word TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pronunciation_word ON pronunciation_history(word, timestamp);
        CREATE INDEX IF NOT EXISTS idx_pronunciation_timestamp ON pronunciation_history(timestamp);
        "#,
    },
    Migration {
        version: 3,
        name: "daily_stats_and_goals",
        sql: r#"
        CREATE TABLE IF NOT EXISTS daily_stats (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            date TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_daily_stats_date ON daily_stats(date);

        CREATE TABLE IF NOT EXISTS user_goals (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL
        );
        "#,
    },
    Migration {
        version: 4,
        name: "shared_audio_cache",
        sql: r#"
        CREATE TABLE IF NOT EXISTS audio_cache (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audio_cache_timestamp ON audio_cache(timestamp);
        "#,
    },
    Migration {
        version: 5,
        name: "vocabulary_level_index",
        sql: r#"
        CREATE INDEX IF NOT EXISTS idx_vocabulary_level ON vocabulary(level, last_reviewed);
        "#,
    },
];

fn ensure_migrations_table(conn: &Connection) -> LocalStoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| LocalStoreError::Migration(format!("failed to create schema_migrations: {e}")))
}

/// Highest applied version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> LocalStoreResult<i32> {
    ensure_migrations_table(conn)?;
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Applies every migration newer than the recorded version. Returns how many
/// were applied.
pub fn run_migrations(conn: &mut Connection) -> LocalStoreResult<usize> {
    let from = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        tracing::info!(version = migration.version, name = migration.name, "applying local migration");

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            LocalStoreError::Migration(format!("migration {} ({}) failed: {e}", migration.version, migration.name))
        })?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![migration.version, migration.name, chrono::Utc::now().timestamp()],
        )?;
        tx.commit()?;

        applied += 1;
    }

    if applied > 0 {
        tracing::info!(count = applied, version = CURRENT_SCHEMA_VERSION, "local schema migrated");
    } else {
        tracing::debug!(version = from, "local schema up to date");
    }

    Ok(applied)
}
