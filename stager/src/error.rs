use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagerError {
    #[error("unsupported source scheme: {0}")]
    UnsupportedScheme(String),

    #[error("fetch failed for {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("unsupported cloud-init seed mode: {0}")]
    UnsupportedSeedMode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] volant_db::DbError),
}

pub type Result<T> = std::result::Result<T, StagerError>;

impl From<StagerError> for volant_core::CoreError {
    fn from(e: StagerError) -> Self {
        match e {
            StagerError::UnsupportedScheme(_) | StagerError::UnsupportedSeedMode(_) | StagerError::ChecksumMismatch { .. } => {
                volant_core::CoreError::Validation(e.to_string())
            }
            StagerError::Fetch { .. } | StagerError::Io(_) => volant_core::CoreError::ExternalIo(e.to_string()),
            StagerError::Db(db_err) => db_err.into(),
        }
    }
}
