mod error;
pub mod portmap;
pub mod vsock_bridge;

pub use error::{DataplaneError, Result};
pub use portmap::{PortmapKey, PortmapTable, PortmapTarget, MIN_CAPACITY, PROTO_TCP, PROTO_UDP};
pub use vsock_bridge::VsockBridge;
