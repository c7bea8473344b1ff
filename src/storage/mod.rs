//! SQLite persistence.
//!
//! # Data Flow
//! ```text
//! services
//!     → Database::read / Database::write (serialized access to one connection)
//!     → artifacts.rs / attestations.rs / provenance.rs / events.rs / verifications.rs (SQL)
//!     → SQLite file (WAL) or in-memory database
//! ```
//!
//! # Invariants
//! - Migrations run before any read or write.
//! - Foreign keys are enforced on every connection.
//! - Write closures run inside one transaction; an error rolls everything back.

pub mod artifacts;
pub mod attestations;
pub mod events;
pub mod migrations;
pub mod provenance;
pub mod verifications;

use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use artifacts::{ArtifactFilter, ArtifactRepo};
pub use attestations::{AttestationFilter, AttestationRepo};
pub use events::EventRepo;
pub use provenance::ProvenanceRepo;
pub use verifications::VerificationRepo;

/// Errors from opening or migrating a database.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion { db_version: u32, latest_supported: u32 },
}

pub type DbResult<T> = Result<T, DbError>;

/// Errors from repository reads and writes.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("invalid persisted data: {0}")]
    InvalidData(String),

    #[error("database connection lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for RepoError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, ref message) = err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                return RepoError::Conflict(
                    message.clone().unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
        }
        RepoError::Db(DbError::Sqlite(err))
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Shared handle to the application database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database file and apply pending migrations.
    ///
    /// `:memory:` opens a private in-memory database.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        if path.as_os_str() == ":memory:" {
            return Self::open_in_memory();
        }

        let started = Instant::now();
        let mut conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        bootstrap(&mut conn)?;
        tracing::info!(
            path = %path.display(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Database opened"
        );
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database with the schema applied.
    pub fn open_in_memory() -> DbResult<Self> {
        let mut conn = Connection::open_in_memory()?;
        bootstrap(&mut conn)?;
        tracing::debug!("In-memory database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RepoError::Poisoned)
    }

    /// Run read-only queries against the connection.
    pub fn read<T, F>(&self, f: F) -> RepoResult<T>
    where
        F: FnOnce(&Connection) -> RepoResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run writes inside a transaction, committing only if `f` succeeds.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<RepoError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(RepoError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }

    /// Cheap liveness probe.
    pub fn ping(&self) -> bool {
        self.read(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .is_ok()
    }
}

fn bootstrap(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrations::apply_migrations(conn)?;
    Ok(())
}

/// Decode a JSON text column.
pub(crate) fn parse_json_column(raw: &str, column: &str) -> RepoResult<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| RepoError::InvalidData(format!("column {column} is not valid JSON: {e}")))
}

/// Decode a UUID text column.
pub(crate) fn parse_uuid_column(raw: &str, column: &str) -> RepoResult<uuid::Uuid> {
    uuid::Uuid::parse_str(raw)
        .map_err(|e| RepoError::InvalidData(format!("column {column} is not a UUID: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_has_latest_schema() {
        let db = Database::open_in_memory().unwrap();
        let version = db
            .read(|conn| Ok(migrations::current_user_version(conn)?))
            .unwrap();
        assert_eq!(version, migrations::latest_version());
        assert!(db.ping());
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrityx.db");
        drop(Database::open(&path).unwrap());
        let db = Database::open(&path).unwrap();
        assert!(db.ping());
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }
        match Database::open(&path) {
            Err(DbError::UnsupportedSchemaVersion { db_version, .. }) => assert_eq!(db_version, 99),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected schema version error"),
        }
    }

    #[test]
    fn test_upgrade_backfills_verifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v1.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(include_str!("migrations/0001_init.sql")).unwrap();
            conn.execute_batch(
                "PRAGMA user_version = 1;
                 INSERT INTO artifacts (id, loan_id, kind, payload_sha256, size_bytes, status, created_by, created_at)
                 VALUES ('a', 'L', 'json', 'h', 1, 'sealed', 'x', 0);
                 INSERT INTO artifact_events (id, artifact_id, event_type, actor, payload, created_at)
                 VALUES ('e1', 'a', 'verified', 'p', '{\"is_valid\": true}', 1),
                        ('e2', 'a', 'verified', 'p', '{\"is_valid\": false, \"by_content\": true}', 2);",
            )
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let counts = db.read(|c| VerificationRepo::new(c).counts()).unwrap();
        assert_eq!(counts, (1, 1));
        let content: i64 = db
            .read(|c| {
                Ok(c.query_row(
                    "SELECT COUNT(*) FROM verifications WHERE method = 'content'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(content, 1);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: RepoResult<()> = db.write(|tx| {
            tx.execute(
                "INSERT INTO artifacts (id, loan_id, kind, payload_sha256, size_bytes, status, created_by, created_at)
                 VALUES ('a', 'L', 'json', 'h', 1, 'sealed', 'x', 0)",
                [],
            )?;
            Err(RepoError::InvalidData("boom".into()))
        });
        assert!(result.is_err());
        let count: i64 = db
            .read(|c| Ok(c.query_row("SELECT COUNT(*) FROM artifacts", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
