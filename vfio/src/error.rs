use thiserror::Error;

#[derive(Error, Debug)]
pub enum VfioError {
    #[error("invalid PCI address {0}: expected DDDD:BB:DD.F")]
    InvalidAddress(String),

    #[error("PCI device {0} not found in sysfs")]
    DeviceNotFound(String),

    #[error("PCI device {0} not present in the allowlist")]
    NotAllowlisted(String),

    #[error("IOMMU is not enabled for device {0} (no iommu_group)")]
    IommuNotEnabled(String),

    #[error("device {device} shares IOMMU group {group} with {sibling}, which was not passed to this call")]
    IncompleteGroup {
        device: String,
        group: String,
        sibling: String,
    },

    #[error("vfio group device {0} is missing")]
    MissingGroupDevice(String),

    #[error("sysfs I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, VfioError>;

impl From<VfioError> for volant_core::CoreError {
    fn from(e: VfioError) -> Self {
        match e {
            VfioError::InvalidAddress(_)
            | VfioError::NotAllowlisted(_)
            | VfioError::IncompleteGroup { .. } => volant_core::CoreError::Validation(e.to_string()),
            VfioError::DeviceNotFound(_) | VfioError::MissingGroupDevice(_) | VfioError::IommuNotEnabled(_) => {
                volant_core::CoreError::NotFound(e.to_string())
            }
            VfioError::Io { .. } => volant_core::CoreError::ExternalIo(e.to_string()),
        }
    }
}
