use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetprogError {
    #[error("command {program} failed with {status}: {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("host network programming is unsupported on this platform")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, NetprogError>;

impl From<NetprogError> for volant_core::CoreError {
    fn from(e: NetprogError) -> Self {
        match e {
            NetprogError::Unsupported => volant_core::CoreError::RuntimeUnavailable(e.to_string()),
            NetprogError::CommandFailed { .. } | NetprogError::Spawn { .. } => {
                volant_core::CoreError::ExternalIo(e.to_string())
            }
        }
    }
}
