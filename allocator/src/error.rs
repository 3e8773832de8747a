use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("no available IPs in the pool")]
    NoAvailableIPs,

    #[error("requested IP {0} is not available")]
    IpNotAvailable(std::net::Ipv4Addr),

    #[error("vsock CID space exhausted")]
    NoAvailableCid,

    #[error("PCI device {0} is already claimed by another VM")]
    DeviceAlreadyClaimed(String),

    #[error(transparent)]
    Db(#[from] volant_db::DbError),
}

pub type Result<T> = std::result::Result<T, AllocatorError>;

impl From<AllocatorError> for volant_core::CoreError {
    fn from(e: AllocatorError) -> Self {
        match e {
            AllocatorError::NoAvailableIPs | AllocatorError::NoAvailableCid => {
                volant_core::CoreError::ResourceExhausted(e.to_string())
            }
            AllocatorError::IpNotAvailable(_) | AllocatorError::DeviceAlreadyClaimed(_) => {
                volant_core::CoreError::Validation(e.to_string())
            }
            AllocatorError::Db(db_err) => db_err.into(),
        }
    }
}
