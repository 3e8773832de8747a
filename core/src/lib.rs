//! Volant core — foundational types shared across the orchestrator crates.
//!
//! This crate carries the ambient stack every other `volant-*` crate builds
//! on: the error taxonomy, the lifecycle event bus, process-wide
//! configuration, and tracing setup. It intentionally has no knowledge of
//! VMs, manifests, or hypervisors — those live in their own crates.

pub mod config;
pub mod error;
pub mod event;
pub mod log;

pub use config::Config;
pub use error::{CoreError, Result};
pub use event::{EventBus, VmEvent, VmEventKind};

/// Orchestrator version, re-exported for inclusion in logs and error reports.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
