//! `kestrel` binary entry point. `spec.md` §4.10.

use std::process;

use tracing::{error, info, warn};

use volant_guest_init::cmdline::{self, BootMode, GuestCmdline};
use volant_guest_init::error::{GuestInitError, Result};
use volant_guest_init::{mount, proxy, supervise};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    info!(pid = process::id(), "kestrel starting");

    let stage2 = std::env::args().nth(1).as_deref() == Some("stage2");
    if let Err(e) = run(stage2) {
        error!(error = %e, "kestrel failed");
        process::exit(1);
    }
}

fn run(stage2: bool) -> Result<()> {
    mount::mount_essential()?;
    let parsed = cmdline::read_from_proc()?;

    if stage2 {
        return run_stage2(parsed);
    }

    match parsed.boot_mode {
        BootMode::Initramfs => run_stage2(parsed),
        BootMode::Rootfs => dispatch_rootfs(&parsed),
        BootMode::Auto => match mount::probe_rootfs_device(parsed.rootfs_device.as_deref()) {
            Some(device) => {
                mount::mount_rootfs_and_switch_root(&device, &parsed.rootfs_fstype)?;
                unreachable!("switch_root re-execs into stage2")
            }
            None => {
                info!("auto boot mode: no rootfs device found, falling back to initramfs");
                run_stage2(parsed)
            }
        },
    }
}

fn dispatch_rootfs(parsed: &GuestCmdline) -> Result<()> {
    let device = mount::probe_rootfs_device(parsed.rootfs_device.as_deref()).ok_or(GuestInitError::NoRootfsDevice)?;
    mount::mount_rootfs_and_switch_root(&device, &parsed.rootfs_fstype)?;
    unreachable!("switch_root re-execs into stage2")
}

fn run_stage2(parsed: GuestCmdline) -> Result<()> {
    mount::mount_stage2_extras()?;
    supervise::install_signal_forwarding()?;

    if parsed.manifest.workload.kind == volant_manifest::WorkloadType::Http {
        match parse_base_url(&parsed.manifest.workload.base_url) {
            Some((host, port)) => {
                let guest_port = parsed.api_port;
                std::thread::spawn(move || {
                    if let Err(e) = proxy::run(guest_port, host, port) {
                        warn!(error = %e, "http proxy exited");
                    }
                });
            }
            None => warn!(base_url = %parsed.manifest.workload.base_url, "workload base_url is not host:port, skipping proxy"),
        }
    }

    let pid = supervise::spawn_workload(&parsed.manifest.workload)?;
    supervise::supervise_workload(pid);
    Ok(())
}

/// `http://host:port[/...]` -> `(host, port)`. No URL crate: the contract
/// only needs scheme-stripped host/port, and `volant_manifest::Workload`
/// doesn't promise anything richer than that.
fn parse_base_url(base_url: &str) -> Option<(String, u16)> {
    let without_scheme = base_url.split("://").nth(1).unwrap_or(base_url);
    let host_port = without_scheme.split('/').next().unwrap_or(without_scheme);
    let (host, port) = host_port.split_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port_from_http_base_url() {
        assert_eq!(parse_base_url("http://127.0.0.1:8080"), Some(("127.0.0.1".to_string(), 8080)));
    }

    #[test]
    fn ignores_path_suffix() {
        assert_eq!(parse_base_url("http://127.0.0.1:8080/healthz"), Some(("127.0.0.1".to_string(), 8080)));
    }

    #[test]
    fn rejects_missing_port() {
        assert_eq!(parse_base_url("http://127.0.0.1"), None);
    }
}
