use thiserror::Error;

/// Top-level error taxonomy for the orchestrator core.
///
/// Individual crates (`volant-allocator`, `volant-stager`, `volant-vfio`, …)
/// define their own narrower error enums; `volant-orchestrator` converts
/// those into this one at the seam where they become user-visible.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Manifest or request failed validation; no state was mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested resource (IP, CID, tap name, PCI device) is exhausted.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A capability the host does not support was invoked.
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// External I/O (process spawn, sysfs write, network) failed.
    #[error("external I/O failure: {0}")]
    ExternalIo(String),

    /// An invariant the implementation guarantees was violated; fatal for
    /// the operation in progress.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// The referenced VM, route, or plugin does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error, converted automatically via `?`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Catch-all for conditions that don't fit the above kinds.
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let e = CoreError::Validation("exactly one of rootfs/initramfs must be set".into());
        assert_eq!(
            e.to_string(),
            "validation failed: exactly one of rootfs/initramfs must be set"
        );
    }

    #[test]
    fn resource_exhausted_display() {
        let e = CoreError::ResourceExhausted("no available IPs".into());
        assert_eq!(e.to_string(), "resource exhausted: no available IPs");
    }

    #[test]
    fn io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: CoreError = io.into();
        assert!(matches!(e, CoreError::Io(_)));
    }

    #[test]
    fn serialization_conversion() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ not json");
        let e: CoreError = bad.unwrap_err().into();
        assert!(matches!(e, CoreError::Serialization(_)));
    }
}
