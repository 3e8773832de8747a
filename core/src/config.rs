//! Process-wide orchestrator configuration, loaded from the environment.
//!
//! Mirrors the teacher's `BoxConfig`: a plain struct with a `Default` impl
//! plus an environment-driven constructor, rather than a config-file parser
//! — `spec.md` §6 specifies environment variables as the configuration
//! surface.

use std::path::PathBuf;

/// Configuration for one orchestrator process.
///
/// Every field corresponds 1:1 to an environment variable named in
/// `spec.md` §6. `~` is expanded against the user's home directory for any
/// path-valued field.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_listen_addr: String,
    pub bridge_name: String,
    pub subnet_cidr: String,
    pub host_ip: std::net::Ipv4Addr,
    pub hypervisor_binary: PathBuf,
    pub runtime_dir: PathBuf,
    pub log_dir: PathBuf,
    pub kernel_bzimage_path: PathBuf,
    pub kernel_vmlinux_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("~/.volant/volant.db"),
            api_listen_addr: "127.0.0.1:7777".to_string(),
            bridge_name: "vbr0".to_string(),
            subnet_cidr: "192.168.127.0/24".to_string(),
            host_ip: std::net::Ipv4Addr::new(192, 168, 127, 1),
            hypervisor_binary: PathBuf::from("cloud-hypervisor"),
            runtime_dir: PathBuf::from("~/.volant/run"),
            log_dir: PathBuf::from("~/.volant/logs"),
            kernel_bzimage_path: PathBuf::from("~/.volant/kernel/bzImage"),
            kernel_vmlinux_path: PathBuf::from("~/.volant/kernel/vmlinux"),
        }
    }
}

impl Config {
    /// Build configuration by overlaying environment variables onto
    /// defaults. Absent kernel image files are rejected immediately so a
    /// misconfigured host fails before any VM create is attempted.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("VOLANT_DB_PATH") {
            config.db_path = expand_home(&v);
        }
        if let Ok(v) = std::env::var("VOLANT_API_LISTEN_ADDR") {
            config.api_listen_addr = v;
        }
        if let Ok(v) = std::env::var("VOLANT_BRIDGE_NAME") {
            config.bridge_name = v;
        }
        if let Ok(v) = std::env::var("VOLANT_SUBNET_CIDR") {
            config.subnet_cidr = v;
        }
        if let Ok(v) = std::env::var("VOLANT_HOST_IP") {
            config.host_ip = v
                .parse()
                .map_err(|e| crate::CoreError::Validation(format!("invalid VOLANT_HOST_IP: {e}")))?;
        }
        if let Ok(v) = std::env::var("VOLANT_HYPERVISOR_BINARY") {
            config.hypervisor_binary = expand_home(&v);
        }
        if let Ok(v) = std::env::var("VOLANT_RUNTIME_DIR") {
            config.runtime_dir = expand_home(&v);
        }
        if let Ok(v) = std::env::var("VOLANT_LOG_DIR") {
            config.log_dir = expand_home(&v);
        }
        if let Ok(v) = std::env::var("VOLANT_KERNEL_BZIMAGE_PATH") {
            config.kernel_bzimage_path = expand_home(&v);
        }
        if let Ok(v) = std::env::var("VOLANT_KERNEL_VMLINUX_PATH") {
            config.kernel_vmlinux_path = expand_home(&v);
        }

        config.db_path = expand_home_path(&config.db_path);
        config.hypervisor_binary = expand_home_path(&config.hypervisor_binary);
        config.runtime_dir = expand_home_path(&config.runtime_dir);
        config.log_dir = expand_home_path(&config.log_dir);
        config.kernel_bzimage_path = expand_home_path(&config.kernel_bzimage_path);
        config.kernel_vmlinux_path = expand_home_path(&config.kernel_vmlinux_path);

        Ok(config)
    }

    /// Fail fast if a boot mode's required kernel image is absent. Called
    /// once at orchestrator bootstrap, not per-VM-create.
    pub fn validate_kernels_present(&self) -> crate::Result<()> {
        if !self.kernel_bzimage_path.exists() {
            return Err(crate::CoreError::Validation(format!(
                "kernel_bzimage_path does not exist: {}",
                self.kernel_bzimage_path.display()
            )));
        }
        if !self.kernel_vmlinux_path.exists() {
            return Err(crate::CoreError::Validation(format!(
                "kernel_vmlinux_path does not exist: {}",
                self.kernel_vmlinux_path.display()
            )));
        }
        Ok(())
    }
}

fn expand_home(s: &str) -> PathBuf {
    expand_home_path(&PathBuf::from(s))
}

fn expand_home_path(path: &std::path::Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subnet_matches_spec() {
        let config = Config::default();
        assert_eq!(config.subnet_cidr, "192.168.127.0/24");
        assert_eq!(config.host_ip, std::net::Ipv4Addr::new(192, 168, 127, 1));
        assert_eq!(config.bridge_name, "vbr0");
    }

    #[test]
    fn expands_tilde_paths() {
        let expanded = expand_home("~/.volant/run");
        assert!(!expanded.starts_with("~"));
    }

    #[test]
    fn leaves_absolute_paths_untouched() {
        let expanded = expand_home("/etc/volant/run");
        assert_eq!(expanded, PathBuf::from("/etc/volant/run"));
    }

    #[test]
    fn validate_kernels_present_fails_fast_on_missing_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.kernel_bzimage_path = dir.path().join("missing-bzimage");
        config.kernel_vmlinux_path = dir.path().join("missing-vmlinux");
        assert!(config.validate_kernels_present().is_err());
    }

    #[test]
    fn validate_kernels_present_succeeds_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let bz = dir.path().join("bzImage");
        let vm = dir.path().join("vmlinux");
        std::fs::write(&bz, b"fake").unwrap();
        std::fs::write(&vm, b"fake").unwrap();

        let mut config = Config::default();
        config.kernel_bzimage_path = bz;
        config.kernel_vmlinux_path = vm;
        assert!(config.validate_kernels_present().is_ok());
    }
}
