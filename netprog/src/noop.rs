//! Off-Linux stub. `spec.md` §4.4: "a no-op implementation returns a
//! deterministic synthetic tap name to keep the control path testable
//! off-target."

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::NetworkProgrammer;

#[derive(Debug, Default)]
pub struct NoopNetworkProgrammer;

#[async_trait]
impl NetworkProgrammer for NoopNetworkProgrammer {
    async fn prepare_tap(&self, vm_name: &str, tap_name: &str, _mac: &str, _bridge: &str) -> Result<String> {
        debug!(vm_name, tap_name, "noop prepare_tap");
        Ok(tap_name.to_string())
    }

    async fn cleanup_tap(&self, tap_name: &str) -> Result<()> {
        debug!(tap_name, "noop cleanup_tap");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_the_requested_tap_name_deterministically() {
        let programmer = NoopNetworkProgrammer::default();
        let tap = programmer.prepare_tap("web", "vttap-web", "06:00:00:00:00:01", "vtbr0").await.unwrap();
        assert_eq!(tap, "vttap-web");
        programmer.cleanup_tap(&tap).await.unwrap();
    }
}
