use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn hypervisor for {vm_name}: {source}")]
    Spawn {
        vm_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hypervisor process for {0} is not running")]
    NotRunning(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

impl From<SupervisorError> for volant_core::CoreError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::NotRunning(_) => volant_core::CoreError::Invariant(e.to_string()),
            SupervisorError::Spawn { .. } | SupervisorError::Io(_) => {
                volant_core::CoreError::ExternalIo(e.to_string())
            }
        }
    }
}
