//! Per-VM hypervisor process supervisor. `spec.md` §4.6.
//!
//! Grounded on the teacher's `VmController::start` (clean stale socket,
//! spawn with redirected I/O, record PID) and `ShimHandler::stop` (SIGTERM,
//! poll with timeout, SIGKILL) — ported from `std::process` to
//! `tokio::process` so the watcher can run as a detached async task instead
//! of the teacher's blocking poll loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{info, warn};

use crate::error::{Result, SupervisorError};

/// Default grace period between SIGTERM and SIGKILL (`spec.md` §4.6).
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    CleanStop,
    Crashed,
    Unknown,
}

pub struct SupervisedProcess {
    vm_name: String,
    child: Option<Child>,
    pid: u32,
    api_socket_path: PathBuf,
    /// Set once `stop()` has been called, so the watcher can tell an
    /// intentional exit from a crash.
    stopping: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl SupervisedProcess {
    /// Spawn the hypervisor binary with `argv`, redirecting stdout/stderr to
    /// `log_path` (teacher: `Stdio::inherit`; here the per-VM log file
    /// `spec.md` requires). Removes a stale API socket first.
    pub async fn spawn(
        vm_name: &str,
        hypervisor_bin: &Path,
        argv: &[String],
        log_path: &Path,
        api_socket_path: &Path,
    ) -> Result<Self> {
        if api_socket_path.exists() {
            warn!(path = %api_socket_path.display(), "removing stale API socket");
            let _ = std::fs::remove_file(api_socket_path);
        }
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let log_file = std::fs::OpenOptions::new().create(true).append(true).open(log_path)?;
        let log_file_err = log_file.try_clone()?;

        info!(vm_name, bin = %hypervisor_bin.display(), "spawning hypervisor");
        let child = Command::new(hypervisor_bin)
            .args(argv)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log_file))
            .stderr(std::process::Stdio::from(log_file_err))
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| SupervisorError::Spawn { vm_name: vm_name.to_string(), source })?;

        let pid = child.id().ok_or_else(|| SupervisorError::NotRunning(vm_name.to_string()))?;
        info!(vm_name, pid, "hypervisor spawned");

        Ok(Self {
            vm_name: vm_name.to_string(),
            child: Some(child),
            pid,
            api_socket_path: api_socket_path.to_path_buf(),
            stopping: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Spawn a detached task that waits for process exit and reports why.
    /// `on_exit` runs exactly once, with `ExitReason::Crashed` for any
    /// unexpected exit that happened before `stop()` was called.
    pub fn watch(&mut self, on_exit: impl FnOnce(ExitReason) + Send + 'static) {
        let Some(mut child) = self.child.take() else { return };
        let vm_name = self.vm_name.clone();
        let stopping = self.stopping.clone();
        tokio::spawn(async move {
            let status = child.wait().await;
            let reason = if stopping.load(std::sync::atomic::Ordering::SeqCst) {
                ExitReason::CleanStop
            } else {
                match status {
                    Ok(status) if status.success() => ExitReason::CleanStop,
                    Ok(_) => ExitReason::Crashed,
                    Err(_) => ExitReason::Unknown,
                }
            };
            info!(vm_name, ?reason, "hypervisor process exited");
            on_exit(reason);
        });
    }

    /// SIGTERM, wait up to `timeout`, then SIGKILL. Safe to call on an
    /// already-exited process. Cleans up the API socket.
    pub async fn stop(&mut self, timeout: Duration) -> Result<()> {
        self.stopping.store(true, std::sync::atomic::Ordering::SeqCst);

        // Signal 0 / ESRCH tells us if the PID is already gone; `kill_on_drop`
        // is false so a taken-by-watch() child doesn't race us here.
        let still_alive = unsafe { libc::kill(self.pid as i32, 0) } == 0;
        if still_alive {
            unsafe {
                libc::kill(self.pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(timeout, wait_for_exit(self.pid)).await.is_err() {
                warn!(pid = self.pid, "hypervisor did not exit in time, sending SIGKILL");
                unsafe {
                    libc::kill(self.pid as i32, libc::SIGKILL);
                }
                let _ = tokio::time::timeout(Duration::from_secs(5), wait_for_exit(self.pid)).await;
            }
        }

        let _ = std::fs::remove_file(&self.api_socket_path);
        Ok(())
    }
}

async fn wait_for_exit(pid: u32) {
    loop {
        let alive = unsafe { libc::kill(pid as i32, 0) } == 0;
        if !alive {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_removes_stale_socket_and_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("web.sock");
        std::fs::write(&socket_path, "stale").unwrap();
        let log_path = dir.path().join("web.log");

        let mut process = SupervisedProcess::spawn(
            "web",
            Path::new("/bin/sleep"),
            &["5".to_string()],
            &log_path,
            &socket_path,
        )
        .await
        .unwrap();

        assert!(!socket_path.exists());
        assert!(process.pid() > 0);

        process.stop(Duration::from_millis(200)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_safe_on_already_exited_process() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("web.sock");
        let log_path = dir.path().join("web.log");

        let mut process =
            SupervisedProcess::spawn("web", Path::new("/bin/true"), &[], &log_path, &socket_path)
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        process.stop(Duration::from_millis(200)).await.unwrap();
    }
}
