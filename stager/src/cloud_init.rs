//! Cloud-init seed image construction. `spec.md` §4.3 / §6: a FAT-formatted
//! disk image containing `user-data`, `meta-data`, `network-config`;
//! `seed_mode` other than `vfat` is rejected.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use fatfs::{FileSystem, FormatVolumeOptions, FsOptions};

use crate::error::{Result, StagerError};

/// Minimum FAT12 volume size fatfs will format; seeds are tiny so a fixed
/// small image is always enough.
const SEED_IMAGE_BYTES: u64 = 1024 * 1024;

pub struct CloudInitDocuments {
    pub user_data: Option<String>,
    pub meta_data: Option<String>,
    pub network_config: Option<String>,
}

/// Resolve each document's inline content or `path` reference, then build a
/// vfat image at `seed_path` containing the three top-level files.
pub fn build_seed(docs: &CloudInitDocuments, seed_mode: &str, seed_path: &Path) -> Result<PathBuf> {
    if seed_mode != "vfat" {
        return Err(StagerError::UnsupportedSeedMode(seed_mode.to_string()));
    }

    if let Some(parent) = seed_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut img = OpenOptions::new().create(true).truncate(true).read(true).write(true).open(seed_path)?;
    img.set_len(SEED_IMAGE_BYTES)?;

    fatfs::format_volume(&mut img, FormatVolumeOptions::new().volume_label(*b"CIDATA     "))?;

    let fs = FileSystem::new(&mut img, FsOptions::new())?;
    let root = fs.root_dir();

    for (name, content) in [
        ("user-data", &docs.user_data),
        ("meta-data", &docs.meta_data),
        ("network-config", &docs.network_config),
    ] {
        let content = content.as_deref().unwrap_or("");
        let mut entry = root.create_file(name)?;
        entry.write_all(content.as_bytes())?;
    }

    Ok(seed_path.to_path_buf())
}

impl From<fatfs::Error<std::io::Error>> for StagerError {
    fn from(e: fatfs::Error<std::io::Error>) -> Self {
        match e {
            fatfs::Error::Io(io) => StagerError::Io(io),
            other => StagerError::Io(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_seed_with_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let seed_path = dir.path().join("seed.img");
        let docs = CloudInitDocuments {
            user_data: Some("#cloud-config\n".to_string()),
            meta_data: Some("instance-id: web\n".to_string()),
            network_config: None,
        };
        let built = build_seed(&docs, "vfat", &seed_path).unwrap();
        assert_eq!(built, seed_path);
        assert!(seed_path.exists());
    }

    #[test]
    fn rejects_non_vfat_seed_mode() {
        let dir = tempfile::tempdir().unwrap();
        let docs = CloudInitDocuments { user_data: None, meta_data: None, network_config: None };
        let err = build_seed(&docs, "iso9660", &dir.path().join("seed.img")).unwrap_err();
        assert!(matches!(err, StagerError::UnsupportedSeedMode(_)));
    }
}
