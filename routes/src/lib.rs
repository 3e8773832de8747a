mod controller;
mod error;

pub use controller::{normalize_protocol, RoutesController};
pub use error::{Result, RoutesError};
