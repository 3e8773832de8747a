//! Runtime file path derivation. `spec.md` §4.2: `{runtime_dir}/{name}.sock`,
//! `{runtime_dir}/{name}.serial`, `{log_dir}/{name}.log`; stale files are
//! removed before reuse.

use std::path::{Path, PathBuf};

pub struct RuntimePaths {
    pub api_socket_path: PathBuf,
    pub serial_socket_path: PathBuf,
    pub log_path: PathBuf,
}

pub fn runtime_paths(vm_name: &str, runtime_dir: &Path, log_dir: &Path) -> RuntimePaths {
    RuntimePaths {
        api_socket_path: runtime_dir.join(format!("{vm_name}.sock")),
        serial_socket_path: runtime_dir.join(format!("{vm_name}.serial")),
        log_path: log_dir.join(format!("{vm_name}.log")),
    }
}

/// Remove any stale socket files left behind by a previous, uncleanly
/// stopped instance of this VM. The log file is intentionally left alone —
/// the supervisor opens it in append mode.
pub fn clear_stale(paths: &RuntimePaths) -> std::io::Result<()> {
    for path in [&paths.api_socket_path, &paths.serial_socket_path] {
        match std::fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_expected_paths() {
        let paths = runtime_paths("web", Path::new("/run/volant"), Path::new("/var/log/volant"));
        assert_eq!(paths.api_socket_path, PathBuf::from("/run/volant/web.sock"));
        assert_eq!(paths.serial_socket_path, PathBuf::from("/run/volant/web.serial"));
        assert_eq!(paths.log_path, PathBuf::from("/var/log/volant/web.log"));
    }

    #[test]
    fn clear_stale_is_idempotent_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let paths = runtime_paths("web", dir.path(), dir.path());
        clear_stale(&paths).unwrap();
        clear_stale(&paths).unwrap();
    }

    #[test]
    fn clear_stale_removes_existing_socket_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = runtime_paths("web", dir.path(), dir.path());
        std::fs::write(&paths.api_socket_path, b"").unwrap();
        clear_stale(&paths).unwrap();
        assert!(!paths.api_socket_path.exists());
    }
}
