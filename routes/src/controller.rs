//! Routes Controller. `spec.md` §4.9: single source of truth for route
//! definitions, applying to the relevant runtime (dataplane portmap or vsock
//! bridge) before persisting, with rollback on persistence failure and
//! restore-on-start replay.
//!
//! The vsock bridge's listener setup is async (binding a `TcpListener`); the
//! public API here stays synchronous like the rest of this workspace's
//! transactional operations (`volant-allocator`, `volant-stager`), resolving
//! a tokio handle internally the same way `volant-stager::Stager::stage`
//! does.

use std::net::Ipv4Addr;

use parking_lot::Mutex;
use tracing::warn;
use volant_db::models::{Protocol, Route, RouteBackend};

use crate::error::{Result, RoutesError};

/// Normalize a raw protocol string per `spec.md` §4.9 ("lowercase protocol").
pub fn normalize_protocol(raw: &str) -> std::result::Result<Protocol, RoutesError> {
    raw.to_lowercase()
        .parse()
        .map_err(|_| RoutesError::InvalidIpv4(raw.to_string()))
}

fn validate(route: &Route) -> Result<()> {
    if route.host_port == 0 {
        return Err(RoutesError::InvalidPort);
    }
    match &route.backend {
        RouteBackend::Bridge { ipv4, port } => {
            if *port == 0 {
                return Err(RoutesError::InvalidPort);
            }
            ipv4.parse::<Ipv4Addr>()
                .map_err(|_| RoutesError::InvalidIpv4(ipv4.clone()))?;
        }
        RouteBackend::Vsock { cid, port } => {
            if *cid == 0 {
                return Err(RoutesError::InvalidCid);
            }
            if *port == 0 {
                return Err(RoutesError::InvalidPort);
            }
            if route.protocol != Protocol::Tcp {
                return Err(RoutesError::VsockRequiresTcp);
            }
        }
    }
    Ok(())
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.block_on(fut),
        Err(_) => {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to start a current-thread runtime");
            rt.block_on(fut)
        }
    }
}

/// Owns the live dataplane portmap and vsock bridge, and keeps them in sync
/// with the persisted `routes` table.
pub struct RoutesController {
    portmap: Mutex<volant_dataplane::PortmapTable>,
    vsock: volant_dataplane::VsockBridge,
}

impl Default for RoutesController {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutesController {
    pub fn new() -> Self {
        Self {
            portmap: Mutex::new(volant_dataplane::PortmapTable::new()),
            vsock: volant_dataplane::VsockBridge::new(),
        }
    }

    fn apply(&self, route: &Route) -> Result<()> {
        match &route.backend {
            RouteBackend::Bridge { ipv4, port } => {
                let dst_ipv4: Ipv4Addr = ipv4.parse().map_err(|_| RoutesError::InvalidIpv4(ipv4.clone()))?;
                self.portmap.lock().apply_bridge(
                    route.protocol.as_ip_proto(),
                    route.host_port,
                    u32::from(dst_ipv4),
                    *port,
                );
                Ok(())
            }
            RouteBackend::Vsock { cid, port } => Ok(block_on(self.vsock.upsert(
                volant_dataplane::PROTO_TCP,
                route.host_port,
                *cid,
                *port,
            ))?),
        }
    }

    fn unapply(&self, route: &Route) {
        match &route.backend {
            RouteBackend::Bridge { .. } => {
                self.portmap.lock().remove(route.protocol.as_ip_proto(), route.host_port);
            }
            RouteBackend::Vsock { .. } => {
                self.vsock.remove(volant_dataplane::PROTO_TCP, route.host_port);
            }
        }
    }

    /// Apply then persist. If persistence fails, the runtime change is
    /// rolled back so the live state never diverges from the store.
    pub fn upsert(&self, tx: &rusqlite::Transaction<'_>, route: Route) -> Result<()> {
        validate(&route)?;
        self.apply(&route)?;
        if let Err(e) = volant_db::routes::upsert(tx, &route) {
            self.unapply(&route);
            return Err(e.into());
        }
        Ok(())
    }

    /// Load the persisted record, remove it from the runtime, then persist
    /// the deletion. On persistence failure the runtime entry is restored.
    pub fn delete(&self, tx: &rusqlite::Transaction<'_>, host_port: u16, protocol: Protocol) -> Result<()> {
        let route = volant_db::routes::get(tx, host_port, protocol)?;
        self.unapply(&route);
        if let Err(e) = volant_db::routes::delete(tx, host_port, protocol) {
            let _ = self.apply(&route);
            return Err(e.into());
        }
        Ok(())
    }

    /// Reapply every persisted route. A route whose runtime is unavailable
    /// is skipped with a warning rather than failing startup.
    pub fn restore(&self, conn: &rusqlite::Connection) -> Result<()> {
        for route in volant_db::routes::list(conn)? {
            if let Err(e) = self.apply(&route) {
                warn!(host_port = route.host_port, error = %e, "route runtime unavailable on restore, skipping");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volant_db::Database;

    fn bridge_route(host_port: u16) -> Route {
        Route {
            host_port,
            protocol: Protocol::Tcp,
            backend: RouteBackend::Bridge {
                ipv4: "192.168.127.2".into(),
                port: 80,
            },
        }
    }

    #[test]
    fn upsert_applies_and_persists() {
        let db = Database::open_in_memory().unwrap();
        let controller = RoutesController::new();
        let route = bridge_route(8080);

        db.with_tx(|tx| controller.upsert(tx, route.clone()).map_err(db_err)).unwrap();

        assert_eq!(
            controller.portmap.lock().lookup(Protocol::Tcp.as_ip_proto(), 8080),
            Some(volant_dataplane::PortmapTarget {
                dst_ipv4: u32::from(std::net::Ipv4Addr::new(192, 168, 127, 2)),
                dst_port: 80
            })
        );
    }

    #[test]
    fn upsert_then_delete_clears_runtime_and_store() {
        let db = Database::open_in_memory().unwrap();
        let controller = RoutesController::new();
        let route = bridge_route(8081);

        db.with_tx(|tx| controller.upsert(tx, route.clone()).map_err(db_err)).unwrap();
        db.with_tx(|tx| controller.delete(tx, 8081, Protocol::Tcp).map_err(db_err)).unwrap();

        assert_eq!(controller.portmap.lock().lookup(Protocol::Tcp.as_ip_proto(), 8081), None);
    }

    #[test]
    fn vsock_backend_rejects_udp() {
        let route = Route {
            host_port: 9090,
            protocol: Protocol::Udp,
            backend: RouteBackend::Vsock { cid: 3, port: 9000 },
        };
        assert!(validate(&route).is_err());
    }

    #[test]
    fn bridge_backend_rejects_malformed_ipv4() {
        let route = Route {
            host_port: 9090,
            protocol: Protocol::Tcp,
            backend: RouteBackend::Bridge {
                ipv4: "not-an-ip".into(),
                port: 80,
            },
        };
        assert!(validate(&route).is_err());
    }

    #[test]
    fn delete_missing_route_surfaces_not_found() {
        let db = Database::open_in_memory().unwrap();
        let controller = RoutesController::new();
        let result = db.with_tx(|tx| controller.delete(tx, 1234, Protocol::Tcp).map_err(db_err));
        assert!(result.is_err());
    }

    /// `with_tx`'s closure must return `Result<T, DbError>`; route-level
    /// errors are surfaced by converting DB failures back out and letting
    /// everything else propagate as a generic conflict, mirroring the
    /// allocator/stager tests' approach to this same signature mismatch.
    fn db_err(e: RoutesError) -> volant_db::DbError {
        match e {
            RoutesError::Db(inner) => inner,
            other => volant_db::DbError::Conflict(other.to_string()),
        }
    }
}
