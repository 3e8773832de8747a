//! The plugin manifest: a declarative description of a workload, normalized
//! and validated before it becomes a `BootPlan`. Mirrors the teacher's
//! `InstanceSpec` value-object style (plain serde structs, a `Default` impl,
//! validation as a free method) generalized from one VM shape to the
//! manifest's richer, partly-optional structure `spec.md` §3 describes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub cpu_cores: u32,
    pub memory_mb: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadType {
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workload {
    #[serde(rename = "type")]
    pub kind: WorkloadType,
    pub base_url: String,
    pub entrypoint: String,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub workdir: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Raw,
    Qcow2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootfsSpec {
    pub url: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default = "default_disk_format")]
    pub format: DiskFormat,
}

fn default_disk_format() -> DiskFormat {
    DiskFormat::Raw
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitramfsSpec {
    pub url: String,
    #[serde(default)]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub checksum: Option<String>,
    pub format: DiskFormat,
    #[serde(default)]
    pub readonly: bool,
    #[serde(default)]
    pub target: Option<String>,
}

/// Inline content or a path reference; exactly one of the two. Used for each
/// of the three cloud-init documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudInitDocument {
    #[serde(default)]
    pub inline: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl CloudInitDocument {
    fn is_valid(&self) -> bool {
        self.inline.is_some() ^ self.path.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedMode {
    Vfat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudInit {
    pub datasource: String,
    #[serde(default = "default_seed_mode")]
    pub seed_mode: SeedMode,
    #[serde(default)]
    pub user_data: Option<CloudInitDocument>,
    #[serde(default)]
    pub meta_data: Option<CloudInitDocument>,
    #[serde(default)]
    pub network_config: Option<CloudInitDocument>,
}

fn default_seed_mode() -> SeedMode {
    SeedMode::Vfat
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Vsock,
    Bridged,
    Dhcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mode: NetworkMode,
    #[serde(default)]
    pub subnet: Option<String>,
    #[serde(default)]
    pub gateway: Option<String>,
    #[serde(default)]
    pub auto_assign: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub pci_passthrough: Vec<String>,
    #[serde(default)]
    pub allowlist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub method: String,
    pub path: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

/// A normalized, validated manifest. `spec.md` §3 invariant: exactly one of
/// `rootfs` or `initramfs` is set; invariant 5 requires
/// `normalize(normalize(m)) == normalize(m)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub name: String,
    pub version: String,
    pub runtime: String,
    pub resources: Resources,
    pub workload: Workload,
    #[serde(default)]
    pub rootfs: Option<RootfsSpec>,
    #[serde(default)]
    pub initramfs: Option<InitramfsSpec>,
    #[serde(default)]
    pub disks: Vec<DiskSpec>,
    #[serde(default)]
    pub cloud_init: Option<CloudInit>,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    #[serde(default)]
    pub devices: Option<Devices>,
    #[serde(default)]
    pub actions: HashMap<String, Action>,
    pub health_check: HealthCheck,
    #[serde(default)]
    pub openapi: Option<serde_json::Value>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Manifest {
    /// Trim whitespace, default absent optional collections, and lowercase
    /// the runtime name. Idempotent by construction: every step is either a
    /// no-op on already-normal input or replaces a field with its own
    /// canonical form.
    pub fn normalize(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.version = self.version.trim().to_string();
        self.runtime = self.runtime.trim().to_lowercase();
        self.workload.entrypoint = self.workload.entrypoint.trim().to_string();
        self.workload.base_url = self.workload.base_url.trim().to_string();
        if let Some(rootfs) = &mut self.rootfs {
            rootfs.url = rootfs.url.trim().to_string();
            rootfs.checksum = rootfs.checksum.take().map(|c| strip_sha256_prefix(&c));
        }
        if let Some(initramfs) = &mut self.initramfs {
            initramfs.url = initramfs.url.trim().to_string();
            initramfs.checksum = initramfs.checksum.take().map(|c| strip_sha256_prefix(&c));
        }
        for disk in &mut self.disks {
            disk.checksum = disk.checksum.take().map(|c| strip_sha256_prefix(&c));
        }
        self
    }

    /// Validate invariants that must hold for a manifest to be usable.
    /// Called on already-normalized input; `validate(normalize(m))` must
    /// agree with `validate(m)` up to trimming/defaulting (`spec.md` §8).
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ManifestError::InvalidManifest("name must not be empty".into()));
        }
        if self.resources.cpu_cores == 0 {
            return Err(ManifestError::InvalidManifest("resources.cpu_cores must be > 0".into()));
        }
        if self.resources.memory_mb == 0 {
            return Err(ManifestError::InvalidManifest("resources.memory_mb must be > 0".into()));
        }
        if !is_valid_base_url(&self.workload.base_url) {
            return Err(ManifestError::InvalidManifest(format!(
                "workload.base_url is not a valid URL: {}",
                self.workload.base_url
            )));
        }
        if self.workload.entrypoint.is_empty() {
            return Err(ManifestError::InvalidManifest("workload.entrypoint must not be empty".into()));
        }

        match (&self.rootfs, &self.initramfs) {
            (Some(_), Some(_)) | (None, None) => return Err(ManifestError::AmbiguousBootMedia),
            _ => {}
        }

        if let Some(ci) = &self.cloud_init {
            if ci.seed_mode != SeedMode::Vfat {
                return Err(ManifestError::InvalidManifest("cloud_init.seed_mode must be vfat".into()));
            }
            for (field, doc) in [
                ("user_data", &ci.user_data),
                ("meta_data", &ci.meta_data),
                ("network_config", &ci.network_config),
            ] {
                if let Some(doc) = doc {
                    if !doc.is_valid() {
                        return Err(ManifestError::InvalidManifest(format!(
                            "cloud_init.{field} must set exactly one of inline or path"
                        )));
                    }
                }
            }
        }

        if let Some(net) = &self.network {
            if net.mode == NetworkMode::Vsock && self.rootfs.is_some() {
                // Vsock-only VMs are not required to be initramfs-only by
                // the spec; this is intentionally not an error.
            }
        }

        Ok(())
    }

    pub fn boot_mode(&self) -> BootMode {
        if self.rootfs.is_some() {
            BootMode::Rootfs
        } else {
            BootMode::Initramfs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Rootfs,
    Initramfs,
}

fn strip_sha256_prefix(checksum: &str) -> String {
    checksum.strip_prefix("sha256:").unwrap_or(checksum).to_lowercase()
}

/// Cheap structural check (scheme + non-empty authority); full RFC 3986
/// parsing is unnecessary for a field that is only ever used as an HTTP
/// proxy target.
fn is_valid_base_url(url: &str) -> bool {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = url.strip_prefix(scheme) {
            return !rest.is_empty();
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_manifest() -> Manifest {
        Manifest {
            schema_version: 1,
            name: "  nginx  ".into(),
            version: "1.0.0".into(),
            runtime: "NGINX".into(),
            resources: Resources { cpu_cores: 1, memory_mb: 512 },
            workload: Workload {
                kind: WorkloadType::Http,
                base_url: "http://127.0.0.1:8080".into(),
                entrypoint: "/usr/sbin/nginx".into(),
                env: HashMap::new(),
                workdir: None,
            },
            rootfs: Some(RootfsSpec {
                url: "file:///tmp/nginx.img".into(),
                checksum: Some("sha256:AAA".into()),
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
    fn normalize_is_idempotent() {
        let m = base_manifest();
        let once = m.clone().normalize();
        let twice = once.clone().normalize();
        assert_eq!(once.name, twice.name);
        assert_eq!(once.runtime, twice.runtime);
        assert_eq!(
            once.rootfs.as_ref().unwrap().checksum,
            twice.rootfs.as_ref().unwrap().checksum
        );
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        let m = base_manifest().normalize();
        assert_eq!(m.name, "nginx");
        assert_eq!(m.runtime, "nginx");
        assert_eq!(m.rootfs.unwrap().checksum.unwrap(), "aaa");
    }

    #[test]
    fn validate_rejects_both_rootfs_and_initramfs() {
        let mut m = base_manifest().normalize();
        m.initramfs = Some(InitramfsSpec { url: "http://x/y".into(), checksum: None });
        assert!(matches!(m.validate(), Err(ManifestError::AmbiguousBootMedia)));
    }

    #[test]
    fn validate_rejects_neither_rootfs_nor_initramfs() {
        let mut m = base_manifest().normalize();
        m.rootfs = None;
        assert!(matches!(m.validate(), Err(ManifestError::AmbiguousBootMedia)));
    }

    #[test]
    fn validate_rejects_zero_resources() {
        let mut m = base_manifest().normalize();
        m.resources.cpu_cores = 0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_manifest() {
        let m = base_manifest().normalize();
        assert!(m.validate().is_ok());
    }
}
