//! Host network programmer. `spec.md` §4.4: create/attach tap devices to a
//! Linux bridge, idempotently, with cleanup on VM stop.
//!
//! Mirrors the teacher's `PasstManager` (compose argv, spawn, check exit
//! status) but shells out to `ip`(8) instead of supervising a daemon, since
//! tap/bridge programming is a one-shot operation rather than a long-lived
//! process.

mod error;
#[cfg(target_os = "linux")]
mod linux;
mod noop;

pub use error::{NetprogError, Result};

use async_trait::async_trait;

/// Capability interface so the orchestrator can depend on a single trait
/// object regardless of host platform.
#[async_trait]
pub trait NetworkProgrammer: Send + Sync {
    /// Ensure the bridge exists, create (or reuse) a tap device named after
    /// `vm_name`, set its MAC, attach it to the bridge, and bring it up.
    /// Returns the tap device name. Idempotent: repeated calls with the same
    /// inputs converge on the same state.
    async fn prepare_tap(&self, vm_name: &str, tap_name: &str, mac: &str, bridge: &str) -> Result<String>;

    /// Tear down a tap device created by `prepare_tap`. Not an error if the
    /// tap is already gone.
    async fn cleanup_tap(&self, tap_name: &str) -> Result<()>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxNetworkProgrammer;
pub use noop::NoopNetworkProgrammer;

/// Construct the platform-appropriate implementation.
pub fn platform_default() -> Box<dyn NetworkProgrammer> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxNetworkProgrammer::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(NoopNetworkProgrammer::default())
    }
}
