//! Top-level orchestrator: bootstraps every subsystem, serializes per-VM
//! lifecycle operations, and wires the allocator / stager / netprog / vfio /
//! supervisor / routes crates into `create_vm`/`destroy_vm`. `spec.md` §4.1
//! through §4.11 describe the components this crate composes; §9 pins the
//! bootstrap/shutdown ordering.

pub mod deploy;
pub mod error;
mod orchestrator;
mod subnet;
pub(crate) mod tx;

pub use deploy::DeployController;
pub use error::{OrchestratorError, Result};
pub use orchestrator::{CreateOptions, Orchestrator};
