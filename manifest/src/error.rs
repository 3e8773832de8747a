use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("missing kernel image: {0}")]
    MissingKernel(String),

    #[error("ambiguous boot media: exactly one of rootfs.url or initramfs.url must be set")]
    AmbiguousBootMedia,

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

impl From<ManifestError> for volant_core::CoreError {
    fn from(e: ManifestError) -> Self {
        volant_core::CoreError::Validation(e.to_string())
    }
}
