//! SQLite-backed persistent cache tier.
//!
//! One row per key. A row whose `value` is NULL is a negative entry; a missing
//! row means the key was never cached.

use crate::domain::cache::Cached;
use crate::domain::error::FutdataError;
use crate::ports::cache_port::CachePort;
use crate::ports::config_port::ConfigPort;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

const CACHE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entry (
    key TEXT PRIMARY KEY,
    value TEXT
)";

pub struct SqliteCacheStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCacheStore {
    /// `Ok(None)` when `[cache] path` is not configured.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, FutdataError> {
        config
            .get_string("cache", "path")
            .map(Self::open)
            .transpose()
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FutdataError> {
        Self::with_manager(SqliteConnectionManager::file(path.as_ref()), 4)
    }

    pub fn in_memory() -> Result<Self, FutdataError> {
        // each in-memory connection is its own database
        Self::with_manager(SqliteConnectionManager::memory(), 1)
    }

    fn with_manager(manager: SqliteConnectionManager, size: u32) -> Result<Self, FutdataError> {
        let pool = Pool::builder()
            .max_size(size)
            .build(manager)
            .map_err(|e: r2d2::Error| FutdataError::Database {
                reason: e.to_string(),
            })?;
        let conn = pool.get().map_err(|e: r2d2::Error| FutdataError::Database {
            reason: e.to_string(),
        })?;
        conn.execute_batch(CACHE_SCHEMA)
            .map_err(|e: rusqlite::Error| FutdataError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        drop(conn);
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, FutdataError> {
        self.pool.get().map_err(|e: r2d2::Error| FutdataError::Cache {
            reason: e.to_string(),
        })
    }
}

impl CachePort for SqliteCacheStore {
    fn load(&self, key: &str) -> Result<Cached<String>, FutdataError> {
        let row: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT value FROM cache_entry WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e: rusqlite::Error| FutdataError::Cache {
                reason: e.to_string(),
            })?;

        Ok(match row {
            None => Cached::NotCached,
            Some(None) => Cached::Absent,
            Some(Some(value)) => Cached::Present(value),
        })
    }

    fn store(&self, key: &str, value: Option<&str>) -> Result<(), FutdataError> {
        self.conn()?
            .execute(
                "INSERT OR REPLACE INTO cache_entry (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(|e: rusqlite::Error| FutdataError::Cache {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unknown_key_is_not_cached() {
        let store = SqliteCacheStore::in_memory().unwrap();
        assert_eq!(store.load("missing").unwrap(), Cached::NotCached);
    }

    #[test]
    fn negative_entries_are_distinct() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.store("k", None).unwrap();
        assert_eq!(store.load("k").unwrap(), Cached::Absent);
    }

    #[test]
    fn overwrite_replaces_value() {
        let store = SqliteCacheStore::in_memory().unwrap();
        store.store("k", Some("1")).unwrap();
        store.store("k", Some("2")).unwrap();
        assert_eq!(store.load("k").unwrap(), Cached::Present("2".to_string()));
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteCacheStore::open(&path).unwrap();
            store.store("ChineseFuturesProduct_rb_20170103", Some("{}")).unwrap();
            store.store("ChineseFuturesProduct_cu_20170103", None).unwrap();
        }
        let store = SqliteCacheStore::open(&path).unwrap();
        assert_eq!(
            store.load("ChineseFuturesProduct_rb_20170103").unwrap(),
            Cached::Present("{}".to_string())
        );
        assert_eq!(
            store.load("ChineseFuturesProduct_cu_20170103").unwrap(),
            Cached::Absent
        );
    }
}
