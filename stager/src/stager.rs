//! Top-level staging facade. `spec.md` §4.3: fetch-verify-cache artifacts
//! (kernels, rootfs images, initramfs images, extra disks) and build
//! cloud-init seeds, all content-addressed by `(source_url, checksum)` so
//! repeated stages of the same artifact converge on one cached file.

use std::path::{Path, PathBuf};

use rusqlite::Transaction;
use tracing::debug;

use crate::checksum::{sha256_hex, strip_prefix};
use crate::cloud_init::{build_seed, CloudInitDocuments};
use crate::error::{Result, StagerError};
use crate::source::{artifact_name, fetch_to};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    KernelBzimage,
    KernelVmlinux,
    Rootfs,
    Initramfs,
    Disk,
}

impl ArtifactKind {
    fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::KernelBzimage => "kernel_bzimage",
            ArtifactKind::KernelVmlinux => "kernel_vmlinux",
            ArtifactKind::Rootfs => "rootfs",
            ArtifactKind::Initramfs => "initramfs",
            ArtifactKind::Disk => "disk",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub artifact_id: i64,
}

pub struct Stager {
    artifacts_dir: PathBuf,
}

impl Stager {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self { artifacts_dir: artifacts_dir.into() }
    }

    /// Fetch `url`, verify `checksum` if given, and publish it into the
    /// content-addressed artifact cache. Reuses an existing file when the
    /// same `(url, checksum)` was already staged, bumping its ref count
    /// instead of re-downloading.
    pub fn stage(
        &self,
        tx: &Transaction,
        kind: ArtifactKind,
        url: &str,
        checksum: Option<&str>,
        format: &str,
    ) -> Result<LocalFile> {
        if let Some(existing) = volant_db::artifacts::find_by_source(tx, url, checksum)? {
            volant_db::artifacts::increment_ref(tx, existing.id)?;
            debug!(url, path = %existing.local_path, "reusing cached artifact");
            return Ok(LocalFile { path: PathBuf::from(existing.local_path), artifact_id: existing.id });
        }

        std::fs::create_dir_all(&self.artifacts_dir)?;
        let name = artifact_name(url);
        let tmp_path = self.artifacts_dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        let runtime = tokio::runtime::Handle::try_current();
        match runtime {
            Ok(handle) => handle.block_on(fetch_to(url, &tmp_path))?,
            Err(_) => {
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
                rt.block_on(fetch_to(url, &tmp_path))?;
            }
        }

        if let Some(expected) = checksum {
            let expected = strip_prefix(expected);
            let actual = sha256_hex(&tmp_path)?;
            if actual != expected {
                let _ = std::fs::remove_file(&tmp_path);
                return Err(StagerError::ChecksumMismatch {
                    url: url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let size_bytes = std::fs::metadata(&tmp_path)?.len() as i64;
        let final_path = self.artifacts_dir.join(format!(
            "{}-{}",
            uuid::Uuid::new_v4(),
            name.to_string_lossy()
        ));
        std::fs::rename(&tmp_path, &final_path)?;

        let id = volant_db::artifacts::insert(
            tx,
            "vm",
            "1",
            &name.to_string_lossy(),
            kind.as_str(),
            url,
            checksum,
            format,
            &final_path.to_string_lossy(),
            size_bytes,
        )?;

        Ok(LocalFile { path: final_path, artifact_id: id })
    }

    /// Release a reference to a staged artifact, deleting the backing file
    /// once no VM references it anymore.
    pub fn release(&self, tx: &Transaction, artifact_id: i64, local_path: &Path) -> Result<()> {
        let remaining = volant_db::artifacts::decrement_ref(tx, artifact_id)?;
        if remaining == 0 {
            volant_db::artifacts::delete(tx, artifact_id)?;
            let _ = std::fs::remove_file(local_path);
        }
        Ok(())
    }

    pub fn build_cloud_init_seed(
        &self,
        docs: &CloudInitDocuments,
        seed_mode: &str,
        vm_name: &str,
    ) -> Result<PathBuf> {
        let seed_path = self.artifacts_dir.join(format!("{vm_name}-seed.img"));
        build_seed(docs, seed_mode, &seed_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_local_file_and_caches_on_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("rootfs.img");
        std::fs::write(&src, b"rootfs-bytes").unwrap();
        let checksum = sha256_hex(&src).unwrap();

        let db = volant_db::Database::open_in_memory().unwrap();
        let stager = Stager::new(dir.path().join("artifacts"));

        let url = format!("file://{}", src.display());
        let first = db
            .with_tx(|tx| Ok(stager.stage(tx, ArtifactKind::Rootfs, &url, Some(&checksum), "raw").unwrap()))
            .unwrap();
        assert!(first.path.exists());

        let second = db
            .with_tx(|tx| Ok(stager.stage(tx, ArtifactKind::Rootfs, &url, Some(&checksum), "raw").unwrap()))
            .unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.artifact_id, second.artifact_id);
    }

    #[test]
    fn rejects_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("rootfs.img");
        std::fs::write(&src, b"rootfs-bytes").unwrap();

        let db = volant_db::Database::open_in_memory().unwrap();
        let stager = Stager::new(dir.path().join("artifacts"));
        let url = format!("file://{}", src.display());
        let err = db
            .with_tx(|tx| {
                match stager.stage(tx, ArtifactKind::Rootfs, &url, Some("sha256:deadbeef"), "raw") {
                    Err(StagerError::ChecksumMismatch { url, expected, actual }) => {
                        Ok(StagerError::ChecksumMismatch { url, expected, actual })
                    }
                    other => panic!("expected checksum mismatch, got {other:?}"),
                }
            })
            .unwrap();
        assert!(matches!(err, StagerError::ChecksumMismatch { .. }));
    }
}
