use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed at version {version}: {source}")]
    Migration {
        version: i32,
        #[source]
        source: rusqlite::Error,
    },

    #[error("database schema version {found} is newer than supported {supported}; upgrade volant")]
    SchemaTooNew { found: i32, supported: i32 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for volant_core::CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(s) => volant_core::CoreError::NotFound(s),
            DbError::SchemaTooNew { .. } => volant_core::CoreError::Invariant(e.to_string()),
            other => volant_core::CoreError::ExternalIo(other.to_string()),
        }
    }
}
