//! Row types persisted by the database. Plain data, no behavior — stores own
//! the SQL, these are just the shapes that cross the boundary.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmStatus {
    Pending,
    Starting,
    Running,
    Stopped,
    Crashed,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmStatus::Pending => "pending",
            VmStatus::Starting => "starting",
            VmStatus::Running => "running",
            VmStatus::Stopped => "stopped",
            VmStatus::Crashed => "crashed",
        }
    }
}

impl std::str::FromStr for VmStatus {
    type Err = crate::error::DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VmStatus::Pending),
            "starting" => Ok(VmStatus::Starting),
            "running" => Ok(VmStatus::Running),
            "stopped" => Ok(VmStatus::Stopped),
            "crashed" => Ok(VmStatus::Crashed),
            other => Err(crate::error::DbError::Conflict(format!(
                "unknown vm status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Plugin {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub manifest_blob: String,
    pub installed_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct Vm {
    pub id: i64,
    pub name: String,
    pub status: VmStatus,
    pub runtime: String,
    pub pid: Option<i64>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub vsock_cid: Option<u32>,
    pub cpu_cores: i64,
    pub memory_mb: i64,
    pub kernel_cmdline: String,
    pub serial_socket: String,
    pub group_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpStatus {
    Available,
    Leased,
}

#[derive(Debug, Clone)]
pub struct IpAllocation {
    pub ip: String,
    pub vm_id: Option<i64>,
    pub status: IpStatus,
    pub leased_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub vm_id: i64,
    pub version: i64,
    pub config_json: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct VmCloudInit {
    pub vm_id: i64,
    pub user_data: Option<String>,
    pub meta_data: Option<String>,
    pub network_config: Option<String>,
    pub seed_path: String,
}

#[derive(Debug, Clone)]
pub struct PluginArtifact {
    pub id: i64,
    pub plugin: String,
    pub version: String,
    pub artifact_name: String,
    pub kind: String,
    pub source_url: String,
    pub checksum: Option<String>,
    pub format: String,
    pub local_path: String,
    pub size_bytes: i64,
    pub ref_count: i64,
}

#[derive(Debug, Clone)]
pub struct VmGroup {
    pub id: i64,
    pub name: String,
    pub config_json: String,
    pub replicas: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }

    /// IANA protocol number, as used by the portmap table's key.
    pub fn as_ip_proto(&self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = crate::error::DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(crate::error::DbError::Conflict(format!(
                "unknown protocol: {other}"
            ))),
        }
    }
}

/// Route backend, persisted as JSON in `routes.backend_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RouteBackend {
    Bridge { ipv4: String, port: u16 },
    Vsock { cid: u32, port: u32 },
}

#[derive(Debug, Clone)]
pub struct Route {
    pub host_port: u16,
    pub protocol: Protocol,
    pub backend: RouteBackend,
}
