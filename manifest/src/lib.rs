//! Manifest normalization/validation and BootPlan assembly.

pub mod boot_plan;
pub mod cmdline;
pub mod error;
pub mod manifest;

pub use boot_plan::{assemble, BootOverrides, BootPlan, NetworkPlan, ResolvedMedia};
pub use cmdline::{decode_manifest, encode_manifest};
pub use error::{ManifestError, Result};
pub use manifest::{
    Action, BootMode, CloudInit, CloudInitDocument, Devices, DiskFormat, DiskSpec, HealthCheck, InitramfsSpec,
    Manifest, NetworkConfig, NetworkMode, Resources, RootfsSpec, SeedMode, Workload, WorkloadType,
};
