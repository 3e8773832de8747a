use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoutesError {
    #[error("host_port must be nonzero")]
    InvalidPort,

    #[error("bridge backend requires a valid IPv4 address: {0}")]
    InvalidIpv4(String),

    #[error("vsock backend requires cid > 0")]
    InvalidCid,

    #[error("vsock backend only supports tcp")]
    VsockRequiresTcp,

    #[error(transparent)]
    Dataplane(#[from] volant_dataplane::DataplaneError),

    #[error(transparent)]
    Db(#[from] volant_db::DbError),
}

pub type Result<T> = std::result::Result<T, RoutesError>;

impl From<RoutesError> for volant_core::CoreError {
    fn from(e: RoutesError) -> Self {
        match e {
            RoutesError::InvalidPort | RoutesError::InvalidIpv4(_) | RoutesError::InvalidCid | RoutesError::VsockRequiresTcp => {
                volant_core::CoreError::Validation(e.to_string())
            }
            RoutesError::Dataplane(inner) => inner.into(),
            RoutesError::Db(inner) => inner.into(),
        }
    }
}
