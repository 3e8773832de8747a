//! Database handle: connection, pragmas, and the migration runner.
//!
//! Grounded on the teacher's `Database` (`Arc<parking_lot::Mutex<Connection>>`
//! plus a schema-version check), generalized from a single-statement schema
//! to an ordered migration list recorded in `schema_migrations` per
//! `spec.md` §6.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::schema::{self, SCHEMA_VERSION};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if absent) the database at `path` and bring its schema
    /// up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=100000;
            ",
        )?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Run `f` inside one SQLite transaction, committing on success and
    /// rolling back on error. Used for every multi-table update `spec.md`
    /// §5 requires to be atomic (e.g. reserve IP + insert VM + insert
    /// config v1).
    pub fn with_tx<T>(&self, f: impl FnOnce(&rusqlite::Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn migrate(&self) -> Result<()> {
        let mut conn = self.conn();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let current: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        if current > SCHEMA_VERSION {
            return Err(DbError::SchemaTooNew {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        for migration in schema::MIGRATIONS.iter().filter(|m| m.version > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)
                .map_err(|source| DbError::Migration {
                    version: migration.version,
                    source,
                })?;
            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, Utc::now().to_rfc3339()],
            )
            .map_err(|source| DbError::Migration {
                version: migration.version,
                source,
            })?;
            tx.commit()?;
            tracing::info!(version = migration.version, "applied schema migration");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_migrates_fresh_db() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn()
            .query_row(
                "SELECT MAX(version) FROM schema_migrations",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn reopening_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volant.db");
        {
            let _db = Database::open(&path).unwrap();
        }
        let db2 = Database::open(&path).unwrap();
        let version: i32 = db2
            .conn()
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn rejects_database_with_future_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volant.db");
        {
            let db = Database::open(&path).unwrap();
            db.conn()
                .execute(
                    "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                    rusqlite::params![SCHEMA_VERSION + 1, "2024-01-01T00:00:00Z"],
                )
                .unwrap();
        }
        let err = Database::open(&path).unwrap_err();
        assert!(matches!(err, DbError::SchemaTooNew { .. }));
    }
}
