//! Reads `/proc/cmdline` and pulls out the `volant.*` keys described in
//! `spec.md` §6. Manifest decoding itself is `volant_manifest::decode_manifest`
//! — kept in one place so the host (assembling `volant.manifest=`) and the
//! guest (decoding it) never drift.

use std::collections::HashMap;

use volant_manifest::Manifest;

use crate::error::{GuestInitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    Rootfs,
    Initramfs,
    Auto,
}

#[derive(Debug, Clone)]
pub struct GuestCmdline {
    pub manifest: Manifest,
    pub boot_mode: BootMode,
    pub rootfs_device: Option<String>,
    pub rootfs_fstype: String,
    pub api_host: String,
    pub api_port: u32,
}

/// Parse a raw `/proc/cmdline` string into a key→value map. Bare flags
/// (no `=`) map to an empty string; values are not further unescaped,
/// matching the simple space-separated contract in §6.
fn parse_kv(raw: &str) -> HashMap<String, String> {
    raw.split_whitespace()
        .map(|tok| match tok.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (tok.to_string(), String::new()),
        })
        .collect()
}

pub fn read_from_proc() -> Result<GuestCmdline> {
    let raw = std::fs::read_to_string("/proc/cmdline")?;
    parse(&raw)
}

pub fn parse(raw: &str) -> Result<GuestCmdline> {
    let kv = parse_kv(raw);

    let manifest_encoded = kv
        .get("volant.manifest")
        .ok_or_else(|| GuestInitError::MissingCmdlineKey("volant.manifest".into()))?;
    let manifest = volant_manifest::decode_manifest(manifest_encoded)?;

    let boot_mode = match kv.get("volant.boot").map(String::as_str) {
        Some("rootfs") => BootMode::Rootfs,
        Some("initramfs") => BootMode::Initramfs,
        _ => BootMode::Auto,
    };

    Ok(GuestCmdline {
        manifest,
        boot_mode,
        rootfs_device: kv.get("volant.rootfs_device").cloned(),
        rootfs_fstype: kv.get("volant.rootfs_fstype").cloned().unwrap_or_else(|| "ext4".to_string()),
        api_host: kv.get("volant.api_host").cloned().unwrap_or_else(|| "127.0.0.1".to_string()),
        api_port: kv.get("volant.api_port").and_then(|p| p.parse().ok()).unwrap_or(8080),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_cmdline() -> String {
        let manifest = volant_manifest::Manifest {
            schema_version: 1,
            name: "web".into(),
            version: "1.0.0".into(),
            runtime: "nginx".into(),
            resources: volant_manifest::Resources { cpu_cores: 1, memory_mb: 512 },
            workload: volant_manifest::Workload {
                kind: volant_manifest::WorkloadType::Http,
                base_url: "http://127.0.0.1:8080".into(),
                entrypoint: "/usr/sbin/nginx".into(),
                env: Default::default(),
                workdir: None,
            },
            rootfs: Some(volant_manifest::RootfsSpec {
                url: "file:///tmp/x.img".into(),
                checksum: None,
                format: volant_manifest::DiskFormat::Raw,
            }),
            initramfs: None,
            disks: vec![],
            cloud_init: None,
            network: None,
            devices: None,
            actions: Default::default(),
            health_check: volant_manifest::HealthCheck { endpoint: "/healthz".into(), timeout_ms: 5000 },
            openapi: None,
            labels: Default::default(),
        };
        let encoded = volant_manifest::encode_manifest(&manifest).unwrap();
        format!("volant.boot=rootfs volant.rootfs_device=/dev/vda volant.api_host=127.0.0.1 volant.api_port=9009 volant.manifest={encoded}")
    }

    #[test]
    fn parses_required_keys_and_decodes_manifest() {
        let raw = sample_manifest_cmdline();
        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.boot_mode, BootMode::Rootfs);
        assert_eq!(parsed.rootfs_device.as_deref(), Some("/dev/vda"));
        assert_eq!(parsed.api_port, 9009);
        assert_eq!(parsed.manifest.name, "web");
    }

    #[test]
    fn missing_manifest_key_is_an_error() {
        let err = parse("volant.boot=initramfs").unwrap_err();
        assert!(matches!(err, GuestInitError::MissingCmdlineKey(_)));
    }

    #[test]
    fn defaults_boot_mode_to_auto_when_absent() {
        let raw = sample_manifest_cmdline().replace("volant.boot=rootfs ", "");
        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.boot_mode, BootMode::Auto);
    }
}
