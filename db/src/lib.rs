//! Volant persistence — SQLite-backed storage for VMs, IP leases, plugins,
//! config history, cloud-init seeds, artifact cache, and routes.
//!
//! Each entity gets its own module of free functions operating on
//! `&rusqlite::Connection`; `Database::with_tx` is how callers (mainly
//! `volant-allocator` and `volant-orchestrator`) group several of these
//! into one atomic multi-table update.

pub mod artifacts;
pub mod cloud_init;
mod db;
pub mod configs;
pub mod error;
pub mod groups;
pub mod ip_pool;
pub mod models;
pub mod plugins;
pub mod routes;
mod schema;
pub mod vms;

pub use db::Database;
pub use error::{DbError, Result};
pub use schema::SCHEMA_VERSION;
