//! Kernel command line assembly and the guest manifest handoff encoding.
//!
//! `spec.md` §6: `volant.manifest=base64url_no_pad(gzip(utf8(json(manifest))))`,
//! decoder must also accept the legacy uncompressed `base64url(json(manifest))`
//! form.

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

use crate::boot_plan::{BootOverrides, NetworkPlan};
use crate::error::{ManifestError, Result};
use crate::manifest::{BootMode, Manifest};

fn engine() -> base64::engine::GeneralPurpose {
    let config = base64::engine::general_purpose::GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(base64::engine::DecodePaddingMode::Indifferent);
    base64::engine::GeneralPurpose::new(&base64::alphabet::URL_SAFE, config)
}

/// `base64url_no_pad(gzip(utf8(json(manifest))))`.
pub fn encode_manifest(manifest: &Manifest) -> Result<String> {
    let json = serde_json::to_vec(manifest).map_err(|e| ManifestError::InvalidManifest(e.to_string()))?;
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    gz.write_all(&json)
        .map_err(|e| ManifestError::InvalidManifest(e.to_string()))?;
    let compressed = gz
        .finish()
        .map_err(|e| ManifestError::InvalidManifest(e.to_string()))?;
    Ok(engine().encode(compressed))
}

/// Accepts the gzip-compressed form, and the legacy uncompressed
/// `base64url(json(manifest))` fallback.
pub fn decode_manifest(encoded: &str) -> Result<Manifest> {
    let raw = engine()
        .decode(encoded)
        .map_err(|e| ManifestError::DecodeFailed(e.to_string()))?;

    let json = match decompress_gzip(&raw) {
        Ok(json) => json,
        Err(_) => {
            tracing::debug!("volant.manifest was not gzip-compressed; falling back to legacy raw JSON");
            raw
        }
    };

    serde_json::from_slice(&json).map_err(|e| ManifestError::DecodeFailed(e.to_string()))
}

fn decompress_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Deterministic, space-separated, stably-ordered kernel command line.
pub fn assemble_cmdline(manifest: &Manifest, overrides: &BootOverrides, network_plan: NetworkPlan) -> Result<String> {
    let mut parts = Vec::new();

    parts.push(format!("volant.runtime={}", manifest.runtime));
    parts.push(format!("volant.plugin={}", manifest.name));
    parts.push(format!("volant.api_host={}", overrides.api_host));
    parts.push(format!("volant.api_port={}", overrides.api_port));
    parts.push(format!("volant.manifest={}", encode_manifest(manifest)?));

    match manifest.boot_mode() {
        BootMode::Rootfs => {
            let rootfs = manifest.rootfs.as_ref().expect("boot_mode() guarantees rootfs is set");
            parts.push(format!("volant.rootfs={}", rootfs.url));
            if let Some(checksum) = &rootfs.checksum {
                parts.push(format!("volant.rootfs_checksum={checksum}"));
            }
            parts.push("volant.rootfs_device=/dev/vda".to_string());
            parts.push("volant.rootfs_fstype=ext4".to_string());
            parts.push("volant.boot=rootfs".to_string());
        }
        BootMode::Initramfs => {
            parts.push("volant.boot=initramfs".to_string());
        }
    }

    if network_plan == NetworkPlan::Bridged {
        if let (Some(ip), Some(gw), Some(mask)) = (overrides.ip_address, overrides.gateway, overrides.subnet_mask) {
            parts.push(format!("ip={ip}::{gw}:{mask}::eth0:off"));
        }
    }

    if let Some(extra) = &overrides.kernel_cmdline_extra {
        if !extra.is_empty() {
            parts.push(extra.clone());
        }
    }

    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DiskFormat, HealthCheck, Resources, RootfsSpec, Workload, WorkloadType};
    use std::collections::HashMap;

    fn sample_manifest() -> Manifest {
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
                url: "file:///tmp/nginx.img".into(),
                checksum: Some("aaa".into()),
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
    fn encode_decode_roundtrip_preserves_manifest() {
        let m = sample_manifest();
        let encoded = encode_manifest(&m).unwrap();
        let decoded = decode_manifest(&encoded).unwrap();
        assert_eq!(decoded.name, m.name);
        assert_eq!(decoded.rootfs.unwrap().url, "file:///tmp/nginx.img");
    }

    #[test]
    fn decode_accepts_legacy_uncompressed_form() {
        let m = sample_manifest();
        let json = serde_json::to_vec(&m).unwrap();
        let legacy = engine().encode(json);
        let decoded = decode_manifest(&legacy).unwrap();
        assert_eq!(decoded.name, m.name);
    }

    #[test]
    fn cmdline_contains_required_keys_for_rootfs_mode() {
        let m = sample_manifest();
        let overrides = BootOverrides { api_host: "127.0.0.1".into(), api_port: 7777, ..Default::default() };
        let cmdline = assemble_cmdline(&m, &overrides, NetworkPlan::Bridged).unwrap();
        assert!(cmdline.contains("volant.boot=rootfs"));
        assert!(cmdline.contains("volant.rootfs=file:///tmp/nginx.img"));
        assert!(cmdline.contains("volant.rootfs_checksum=aaa"));
        assert!(cmdline.contains("volant.runtime=nginx"));
        assert!(!cmdline.contains("volant.rootfs_checksum=aaa volant.rootfs_checksum"));
    }

    #[test]
    fn cmdline_omits_rootfs_keys_for_initramfs_mode() {
        let mut m = sample_manifest();
        m.rootfs = None;
        m.initramfs = Some(crate::manifest::InitramfsSpec { url: "http://x/y".into(), checksum: None });
        let overrides = BootOverrides { api_host: "127.0.0.1".into(), api_port: 7777, ..Default::default() };
        let cmdline = assemble_cmdline(&m, &overrides, NetworkPlan::Vsock).unwrap();
        assert!(cmdline.contains("volant.boot=initramfs"));
        assert!(!cmdline.contains("volant.rootfs"));
    }
}
