//! `BootPlan`: the materialized, validated inputs to one hypervisor
//! invocation. Generalizes the teacher's `InstanceSpec` (a flat struct
//! handed to the shim subprocess) to the richer per-boot-mode shape
//! `spec.md` §4.1 specifies.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cmdline::assemble_cmdline;
use crate::error::{ManifestError, Result};
use crate::manifest::{BootMode, Manifest};

/// Per-VM values that override or extend the manifest at boot-plan assembly
/// time: resource overrides, network placement, device overrides, and the
/// config document version in effect.
#[derive(Debug, Clone, Default)]
pub struct BootOverrides {
    pub cpu_cores: Option<u32>,
    pub memory_mb: Option<u32>,
    pub kernel_cmdline_extra: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub ip_address: Option<std::net::Ipv4Addr>,
    pub gateway: Option<std::net::Ipv4Addr>,
    pub subnet_mask: Option<std::net::Ipv4Addr>,
    pub tap_name: Option<String>,
    pub vfio_groups: Vec<PathBuf>,
    pub cloud_init_seed_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPlan {
    Bridged,
    Dhcp,
    Vsock,
    None,
}

#[derive(Debug, Clone)]
pub struct BootPlan {
    pub vm_name: String,
    pub runtime: String,
    pub cpu: u32,
    pub memory_mb: u32,
    pub kernel_image_path: PathBuf,
    pub initramfs_path: Option<PathBuf>,
    pub rootfs_image_path: Option<PathBuf>,
    pub disks: Vec<PathBuf>,
    pub kernel_cmdline: String,
    pub network_plan: NetworkPlan,
    pub vfio_groups: Vec<PathBuf>,
    pub cloud_init_seed_path: Option<PathBuf>,
    pub api_socket_path: PathBuf,
    pub log_path: PathBuf,
    pub serial_socket_path: PathBuf,
}

/// Where the boot-mode-specific local files live, resolved by the stager
/// ahead of boot-plan assembly.
pub struct ResolvedMedia {
    pub kernel_bzimage_path: PathBuf,
    pub kernel_vmlinux_path: PathBuf,
    pub rootfs_local_path: Option<PathBuf>,
    pub initramfs_local_path: Option<PathBuf>,
    pub disk_local_paths: Vec<PathBuf>,
}

/// Assemble a `BootPlan` from a normalized manifest, per-VM overrides, the
/// stager's resolved local file paths, and the runtime directory layout.
pub fn assemble(
    manifest: &Manifest,
    overrides: &BootOverrides,
    media: &ResolvedMedia,
    runtime_dir: &std::path::Path,
    log_dir: &std::path::Path,
) -> Result<BootPlan> {
    manifest.validate()?;

    let kernel_image_path = match manifest.boot_mode() {
        BootMode::Rootfs => media.kernel_bzimage_path.clone(),
        BootMode::Initramfs => media.kernel_vmlinux_path.clone(),
    };
    if !kernel_image_path.exists() {
        return Err(ManifestError::MissingKernel(
            kernel_image_path.display().to_string(),
        ));
    }

    let network_plan = match manifest.network.as_ref().map(|n| n.mode) {
        Some(crate::manifest::NetworkMode::Bridged) => NetworkPlan::Bridged,
        Some(crate::manifest::NetworkMode::Dhcp) => NetworkPlan::Dhcp,
        Some(crate::manifest::NetworkMode::Vsock) => NetworkPlan::Vsock,
        None => NetworkPlan::None,
    };

    let kernel_cmdline = assemble_cmdline(manifest, overrides, network_plan)?;

    Ok(BootPlan {
        vm_name: manifest.name.clone(),
        runtime: manifest.runtime.clone(),
        cpu: overrides.cpu_cores.unwrap_or(manifest.resources.cpu_cores),
        memory_mb: overrides.memory_mb.unwrap_or(manifest.resources.memory_mb),
        kernel_image_path,
        initramfs_path: media.initramfs_local_path.clone(),
        rootfs_image_path: media.rootfs_local_path.clone(),
        disks: media.disk_local_paths.clone(),
        kernel_cmdline,
        network_plan,
        vfio_groups: overrides.vfio_groups.clone(),
        cloud_init_seed_path: overrides.cloud_init_seed_path.clone(),
        api_socket_path: runtime_dir.join(format!("{}.sock", manifest.name)),
        log_path: log_dir.join(format!("{}.log", manifest.name)),
        serial_socket_path: runtime_dir.join(format!("{}.serial", manifest.name)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DiskFormat, HealthCheck, Resources, RootfsSpec, Workload, WorkloadType};
    use std::collections::HashMap;

    fn manifest_with_rootfs(path: &std::path::Path) -> Manifest {
        Manifest {
            schema_version: 1,
            name: "web".into(),
            version: "1.0.0".into(),
            runtime: "nginx".into(),
            resources: Resources { cpu_cores: 1, memory_mb: 512 },
            workload: Workload {
                kind: WorkloadType::Http,
                base_url: "http://127.0.0.1:8080".into(),
                entrypoint: "/usr/sbin/nginx".into(),
                env: HashMap::new(),
                workdir: None,
            },
            rootfs: Some(RootfsSpec {
                url: format!("file://{}", path.display()),
                checksum: None,
                format: DiskFormat::Raw,
            }),
            initramfs: None,
            disks: vec![],
            cloud_init: None,
            network: None,
            devices: None,
            actions: HashMap::new(),
            health_check: HealthCheck { endpoint: "/healthz".into(), timeout_ms: 5000 },
            openapi: None,
            labels: HashMap::new(),
        }
    }

    #[test]
    fn assemble_fails_when_kernel_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest_with_rootfs(&dir.path().join("rootfs.img"));
        let overrides = BootOverrides { api_host: "127.0.0.1".into(), api_port: 7777, ..Default::default() };
        let media = ResolvedMedia {
            kernel_bzimage_path: dir.path().join("missing-bzimage"),
            kernel_vmlinux_path: dir.path().join("missing-vmlinux"),
            rootfs_local_path: Some(dir.path().join("rootfs.img")),
            initramfs_local_path: None,
            disk_local_paths: vec![],
        };
        let err = assemble(&manifest, &overrides, &media, dir.path(), dir.path()).unwrap_err();
        assert!(matches!(err, ManifestError::MissingKernel(_)));
    }

    #[test]
    fn assemble_succeeds_and_derives_paths() {
        let dir = tempfile::tempdir().unwrap();
        let bz = dir.path().join("bzImage");
        std::fs::write(&bz, b"fake").unwrap();
        let manifest = manifest_with_rootfs(&dir.path().join("rootfs.img"));
        let overrides = BootOverrides { api_host: "127.0.0.1".into(), api_port: 7777, ..Default::default() };
        let media = ResolvedMedia {
            kernel_bzimage_path: bz,
            kernel_vmlinux_path: dir.path().join("vmlinux"),
            rootfs_local_path: Some(dir.path().join("rootfs.img")),
            initramfs_local_path: None,
            disk_local_paths: vec![],
        };
        let plan = assemble(&manifest, &overrides, &media, dir.path(), dir.path()).unwrap();
        assert_eq!(plan.vm_name, "web");
        assert_eq!(plan.api_socket_path, dir.path().join("web.sock"));
        assert!(plan.kernel_cmdline.contains("volant.boot=rootfs"));
    }
}
