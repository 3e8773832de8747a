//! Workload supervision. `spec.md` §4.10: spawn the workload entrypoint,
//! apply `env`/`workdir`, reap zombies continuously, forward SIGTERM/SIGINT
//! by initiating a clean power-off. On workload exit: reap, do not
//! auto-restart — the host supervisor decides that.
//!
//! Grounded on the teacher's `wait_for_children` (`guest/init/src/main.rs`)
//! and the fork/exec half of `namespace::spawn_isolated`, minus the
//! namespace isolation itself: kestrel's one workload process runs directly
//! under PID 1, it doesn't need a second namespace layer the way the
//! teacher's co-resident agent/business split does.

use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{error, info, warn};

use volant_manifest::Workload;

use crate::error::{GuestInitError, Result};

static SHUTDOWN_REQUESTED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

extern "C" fn on_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, std::sync::atomic::Ordering::SeqCst);
}

/// Install SIGTERM/SIGINT handlers that flip a flag the reap loop checks,
/// rather than acting inside the signal handler itself.
pub fn install_signal_forwarding() -> Result<()> {
    let handler = SigHandler::Handler(on_shutdown_signal);
    unsafe {
        signal::sigaction(Signal::SIGTERM, &nix::sys::signal::SigAction::new(handler, nix::sys::signal::SaFlags::empty(), nix::sys::signal::SigSet::empty()))
            .map_err(GuestInitError::Signal)?;
        signal::sigaction(Signal::SIGINT, &nix::sys::signal::SigAction::new(handler, nix::sys::signal::SaFlags::empty(), nix::sys::signal::SigSet::empty()))
            .map_err(GuestInitError::Signal)?;
    }
    Ok(())
}

/// Fork and exec the workload entrypoint with the manifest's `env`/`workdir`
/// applied. Returns the child's pid in the parent.
pub fn spawn_workload(workload: &Workload) -> Result<Pid> {
    info!(entrypoint = %workload.entrypoint, "spawning workload");

    match unsafe { fork() }.map_err(GuestInitError::Fork)? {
        ForkResult::Child => {
            let mut cmd = Command::new(&workload.entrypoint);
            if let Some(workdir) = &workload.workdir {
                cmd.current_dir(workdir);
            }
            for (k, v) in &workload.env {
                cmd.env(k, v);
            }
            let err = cmd.exec();
            error!(error = %err, "workload exec failed");
            std::process::exit(127);
        }
        ForkResult::Parent { child } => {
            info!(pid = child.as_raw(), "workload started");
            Ok(child)
        }
    }
}

/// Reap every exited child continuously. Returns once `workload_pid`
/// itself has exited (the condition the caller waits on to decide whether
/// to power off), reaping any other zombies along the way. If a shutdown
/// signal was forwarded, sends SIGTERM to the workload and keeps reaping
/// until it's gone.
pub fn supervise_workload(workload_pid: Pid) {
    let mut workload_exited = false;
    let mut term_sent = false;

    loop {
        if SHUTDOWN_REQUESTED.load(std::sync::atomic::Ordering::SeqCst) && !term_sent {
            info!("shutdown requested, forwarding SIGTERM to workload");
            let _ = signal::kill(workload_pid, Signal::SIGTERM);
            term_sent = true;
        }

        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(pid, status)) => {
                info!(pid = pid.as_raw(), status, "child exited");
                if pid == workload_pid {
                    workload_exited = true;
                }
            }
            Ok(WaitStatus::Signaled(pid, sig, _)) => {
                warn!(pid = pid.as_raw(), signal = ?sig, "child killed by signal");
                if pid == workload_pid {
                    workload_exited = true;
                }
            }
            Ok(WaitStatus::StillAlive) | Ok(_) => {
                if workload_exited {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }
            Err(nix::errno::Errno::ECHILD) => {
                break;
            }
            Err(e) => {
                error!(error = %e, "waitpid failed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_supervise_true_exits_cleanly() {
        let workload = Workload {
            kind: volant_manifest::WorkloadType::Http,
            base_url: String::new(),
            entrypoint: "/bin/true".into(),
            env: Default::default(),
            workdir: None,
        };
        let pid = spawn_workload(&workload).unwrap();
        supervise_workload(pid);
    }
}
