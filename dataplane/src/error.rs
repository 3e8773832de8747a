use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataplaneError {
    #[error("packet too short for {0}")]
    Truncated(&'static str),

    #[error("unsupported protocol {0}")]
    UnsupportedProtocol(u8),

    #[error("vsock bridging only supports tcp")]
    VsockRequiresTcp,

    #[error("L4 dataplane is unsupported on this platform")]
    Unsupported,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DataplaneError>;

impl From<DataplaneError> for volant_core::CoreError {
    fn from(e: DataplaneError) -> Self {
        match e {
            DataplaneError::Unsupported => volant_core::CoreError::RuntimeUnavailable(e.to_string()),
            DataplaneError::Truncated(_)
            | DataplaneError::UnsupportedProtocol(_)
            | DataplaneError::VsockRequiresTcp => volant_core::CoreError::Validation(e.to_string()),
            DataplaneError::Io(_) => volant_core::CoreError::ExternalIo(e.to_string()),
        }
    }
}
