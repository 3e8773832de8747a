use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuestInitError {
    #[error("mount failed: {0}")]
    Mount(#[source] nix::Error),

    #[error("switch_root failed: {0}")]
    SwitchRoot(String),

    #[error("no rootfs device found")]
    NoRootfsDevice,

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),

    #[error("exec failed: {0}")]
    Exec(#[source] std::io::Error),

    #[error("signal handling failed: {0}")]
    Signal(#[source] nix::Error),

    #[error("cmdline missing required key: {0}")]
    MissingCmdlineKey(String),

    #[error("manifest decode failed: {0}")]
    ManifestDecode(#[from] volant_manifest::ManifestError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GuestInitError>;
