use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use r2d2_sqlite::SqliteConnectionManager;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Clone)]
pub struct Database {
    pub pool: r2d2::Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open (or create) the database file and bring its schema up to date.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Like [`Database::connect`], with an explicit wait for the write lock.
    /// Publishing holds that lock while it copies images, so slow blob storage
    /// needs a longer wait here.
    pub fn connect_with(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Creating database directory {}", parent.display()))?;
        }
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            conn.busy_timeout(busy_timeout)
        });
        let pool = r2d2::Pool::new(manager)?;
        let me = Self { pool };
        me.migrate()?;
        Ok(me)
    }

    /// Migrate the database to the latest version.
    fn migrate(&self) -> Result<()> {
        let migrations = [include_str!("migrations/01-initial.sql")];
        // Find the current migration version. If it fails, we need to run all the migrations.
        let conn = self.pool.get()?;
        let current_version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                rusqlite::params![],
                |row| row.get(0),
            )
            .unwrap_or("0".to_string());
        let current_version = current_version.parse::<usize>().unwrap_or(0);
        tracing::info!("Current schema version: {}", current_version);
        for (index, migration) in migrations.iter().enumerate().skip(current_version) {
            tracing::warn!("Applying migration {}", index + 1);
            conn.execute_batch(migration)
                .with_context(|| format!("Applying migration {}", index + 1))?;
        }
        Ok(())
    }

    /// Convenience method to collect rows from a query into a Vec.
    pub fn collect_rows<T: FromRow, P: rusqlite::Params>(
        &self,
        sql: &str,
        parameters: P,
    ) -> Result<Vec<T>> {
        let conn = self.pool.get()?;
        collect_rows(&conn, sql, parameters)
    }
}

/// Same as [`Database::collect_rows`], but on a connection the caller already holds,
/// which is what you want inside a transaction.
pub fn collect_rows<T: FromRow, P: rusqlite::Params>(
    conn: &rusqlite::Connection,
    sql: &str,
    parameters: P,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query(parameters)?;
    rows.mapped(T::from_row)
        .map(|r| r.map_err(Into::into))
        .collect::<Result<_>>()
}

pub trait FromRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self>
    where
        Self: Sized;
}

pub fn sqlite_current_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
