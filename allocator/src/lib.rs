//! Transactional resource allocation: IP leases, vsock CIDs, tap device
//! names, runtime paths, and PCI device claims.

mod allocator;
pub mod error;
mod mac;
mod paths;
mod tap;

pub use allocator::{Allocator, NetworkNeeds, Reservation, ReservationRequest};
pub use error::{AllocatorError, Result};
pub use mac::derive_mac;
pub use paths::{clear_stale, runtime_paths, RuntimePaths};
pub use tap::tap_name;
