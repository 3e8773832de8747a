use thiserror::Error;

/// Aggregates every downstream crate's error type. `spec.md` §7: components
/// surface typed errors upward, the orchestrator converts them into
/// user-visible categories at the seam where they leave this crate.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("vm {0} not found")]
    VmNotFound(String),

    #[error("vm name {0} is already in use")]
    DuplicateVmName(String),

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error(transparent)]
    Manifest(#[from] volant_manifest::ManifestError),

    #[error(transparent)]
    Allocator(#[from] volant_allocator::AllocatorError),

    #[error(transparent)]
    Stager(#[from] volant_stager::StagerError),

    #[error(transparent)]
    Netprog(#[from] volant_netprog::NetprogError),

    #[error(transparent)]
    Vfio(#[from] volant_vfio::VfioError),

    #[error(transparent)]
    Supervisor(#[from] volant_supervisor::SupervisorError),

    #[error(transparent)]
    Dataplane(#[from] volant_dataplane::DataplaneError),

    #[error(transparent)]
    Routes(#[from] volant_routes::RoutesError),

    #[error(transparent)]
    Db(#[from] volant_db::DbError),

    #[error(transparent)]
    Core(#[from] volant_core::CoreError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl From<OrchestratorError> for volant_core::CoreError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::VmNotFound(s) => volant_core::CoreError::NotFound(format!("vm {s}")),
            OrchestratorError::DuplicateVmName(s) => volant_core::CoreError::Validation(format!("vm name {s} already in use")),
            OrchestratorError::GroupNotFound(s) => volant_core::CoreError::NotFound(format!("group {s}")),
            OrchestratorError::Manifest(e) => e.into(),
            OrchestratorError::Allocator(e) => e.into(),
            OrchestratorError::Stager(e) => e.into(),
            OrchestratorError::Netprog(e) => e.into(),
            OrchestratorError::Vfio(e) => e.into(),
            OrchestratorError::Supervisor(e) => e.into(),
            OrchestratorError::Dataplane(e) => e.into(),
            OrchestratorError::Routes(e) => e.into(),
            OrchestratorError::Db(e) => e.into(),
            OrchestratorError::Core(e) => e,
        }
    }
}
