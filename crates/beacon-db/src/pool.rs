//! SQLite pool construction.
//!
//! Every crate that touches the database goes through [`create_pool`]: an
//! r2d2 pool of rusqlite connections, each initialized for WAL journaling,
//! enforced foreign keys, and a shared busy timeout. The server's
//! `[database]` config section maps onto [`DbRuntimeSettings`] directly.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Connection tunables surfaced through the server configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database before reporting
    /// busy, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on pooled connections. Tests that need a single shared
    /// in-memory database set this to 1.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("could not build the SQLite connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Builds the connection pool for the database at `db_path`.
///
/// `:memory:` is accepted for tests. Each connection the pool hands out has
/// already been through [`init_connection`].
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(move |conn| init_connection(conn, settings.busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;

    Ok(pool)
}

/// Per-connection setup: WAL journaling, foreign keys, busy timeout.
///
/// WAL is confirmed rather than just requested — SQLite silently keeps the
/// old journal mode when it cannot switch, and status reads must not block
/// behind writers. In-memory databases answer `memory`, which is fine.
fn init_connection(conn: &Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    match mode.as_str() {
        "wal" | "memory" => {}
        other => {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("journal_mode pragma answered {other:?}, not wal")),
            ));
        }
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_in_memory_pool() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(":memory:", settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert!(
            mode == "wal" || mode == "memory",
            "unexpected journal_mode: {mode}"
        );

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500, "busy timeout should match settings");

        assert_eq!(pool.max_size(), 3, "pool max size should match settings");
    }

    #[test]
    fn pool_on_disk_persists_across_connections() {
        let dir = tempfile::tempdir().expect("should create temp dir");
        let path = dir.path().join("beacon-test.db");
        let path = path.to_str().expect("path should be valid utf-8");

        let pool = create_pool(path, DbRuntimeSettings::default()).expect("pool should build");
        {
            let conn = pool.get().expect("should get a connection");
            conn.execute_batch("CREATE TABLE marker (id INTEGER PRIMARY KEY);")
                .expect("should create table");
        }

        let conn = pool.get().expect("should get a second connection");
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'marker')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert!(exists, "table should be visible from another connection");
    }
}
