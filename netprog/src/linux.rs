//! Linux implementation: shells out to `ip`(8), the same "compose argv,
//! spawn, check exit status" shape as the teacher's `PasstManager::spawn`.

use std::process::Output;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{NetprogError, Result};
use crate::NetworkProgrammer;

#[derive(Debug, Default)]
pub struct LinuxNetworkProgrammer;

impl LinuxNetworkProgrammer {
    pub fn new() -> Self {
        Self
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "running ip");
        let output = std::process::Command::new("ip")
            .args(args)
            .output()
            .map_err(|source| NetprogError::Spawn { program: "ip".to_string(), source })?;
        Ok(output)
    }

    /// Run `ip args...`, treating `ignore_exists` stderr substrings as
    /// success (idempotent re-creation of already-present state).
    fn run_idempotent(&self, args: &[&str], ignore_substrings: &[&str]) -> Result<()> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if ignore_substrings.iter().any(|s| stderr.contains(s)) {
            return Ok(());
        }
        Err(NetprogError::CommandFailed {
            program: "ip".to_string(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

#[async_trait]
impl NetworkProgrammer for LinuxNetworkProgrammer {
    async fn prepare_tap(&self, vm_name: &str, tap_name: &str, mac: &str, bridge: &str) -> Result<String> {
        self.run_idempotent(&["link", "add", bridge, "type", "bridge"], &["File exists"])?;
        self.run_idempotent(&["link", "set", bridge, "up"], &[])?;

        // Detach the tap from any prior master before recreating it, so a
        // stale tap from a previous crash doesn't keep its old attachment.
        let _ = self.run(&["link", "set", tap_name, "nomaster"]);

        self.run_idempotent(
            &["tuntap", "add", "dev", tap_name, "mode", "tap"],
            &["File exists"],
        )?;
        self.run_idempotent(&["link", "set", tap_name, "address", mac], &[])?;
        self.run_idempotent(&["link", "set", tap_name, "master", bridge], &[])?;

        match self.run_idempotent(&["link", "set", tap_name, "up"], &[]) {
            Ok(()) => {
                info!(vm_name, tap_name, bridge, "tap device prepared");
                Ok(tap_name.to_string())
            }
            Err(e) => {
                let _ = self.run(&["link", "delete", tap_name]);
                Err(e)
            }
        }
    }

    async fn cleanup_tap(&self, tap_name: &str) -> Result<()> {
        self.run_idempotent(
            &["link", "delete", tap_name],
            &["Cannot find device", "No such device"],
        )?;
        info!(tap_name, "tap device removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires root and the ip(8) binary; exercised in integration environments"]
    async fn prepare_and_cleanup_tap_roundtrip() {
        let programmer = LinuxNetworkProgrammer::new();
        let tap = programmer
            .prepare_tap("test-vm", "vttap-test", "06:00:c0:a8:7f:02", "vtbr0")
            .await
            .unwrap();
        assert_eq!(tap, "vttap-test");
        programmer.cleanup_tap(&tap).await.unwrap();
    }
}
