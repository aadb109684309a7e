pub mod models;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Timestamp format shared by the SQL column defaults and rows written from Rust.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn create_pool(db_path: &Path) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);
    let pool = Pool::builder().max_size(8).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;

    Ok(pool)
}

/// Per-connection pragmas. Foreign keys and the busy timeout are connection
/// scoped in SQLite, so every pooled connection needs them.
fn configure_connection(conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Single-connection in-memory pool with migrations applied.
#[cfg(test)]
pub(crate) fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory().with_init(configure_connection);
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    run_migrations(&pool).unwrap();
    pool
}

/// Inserts a user row directly, bypassing registration. Returns the id.
#[cfg(test)]
pub(crate) fn seed_user(conn: &rusqlite::Connection, username: &str) -> String {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, username, email, full_name, password_hash, refresh_token)
         VALUES (?1, ?2, ?3, ?4, 'not-a-real-hash', 'stored-refresh-token')",
        params![id, username, format!("{}@example.com", username), username],
    )
    .unwrap();
    id
}

/// Inserts a published video row owned by `owner_id`. Returns the id.
/// Each call gets a strictly later `created_at` than the previous one.
#[cfg(test)]
pub(crate) fn seed_video(conn: &rusqlite::Connection, owner_id: &str, title: &str) -> String {
    use std::sync::atomic::{AtomicI64, Ordering};
    static SEQ: AtomicI64 = AtomicI64::new(0);

    let n = SEQ.fetch_add(1, Ordering::SeqCst);
    let created_at = (chrono::DateTime::UNIX_EPOCH + chrono::Duration::seconds(1_700_000_000 + n))
        .format(TIMESTAMP_FORMAT)
        .to_string();
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO videos (id, owner_id, title, description, is_published, created_at)
         VALUES (?1, ?2, ?3, 'seeded', 1, ?4)",
        params![id, owner_id, title, created_at],
    )
    .unwrap();
    id
}
