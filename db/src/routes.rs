//! `routes` table: persisted L4 and vsock route definitions. The runtime
//! application of these rows (dataplane/vsock proxy) lives in
//! `volant-routes`; this module only persists them.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::models::{Protocol, Route, RouteBackend};

fn row_to_route(row: &rusqlite::Row) -> rusqlite::Result<Route> {
    let host_port: i64 = row.get(0)?;
    let protocol: String = row.get(1)?;
    let backend_json: String = row.get(2)?;
    let backend: RouteBackend = serde_json::from_str(&backend_json).unwrap_or_else(|_| RouteBackend::Bridge {
        ipv4: "0.0.0.0".into(),
        port: 0,
    });
    Ok(Route {
        host_port: host_port as u16,
        protocol: protocol.parse().unwrap_or(Protocol::Tcp),
        backend,
    })
}

pub fn upsert(conn: &Connection, route: &Route) -> Result<()> {
    let backend_json = serde_json::to_string(&route.backend)?;
    conn.execute(
        "INSERT INTO routes (host_port, protocol, backend_json) VALUES (?1, ?2, ?3)
         ON CONFLICT(host_port, protocol) DO UPDATE SET backend_json = excluded.backend_json",
        rusqlite::params![route.host_port, route.protocol.as_str(), backend_json],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, host_port: u16, protocol: Protocol) -> Result<Route> {
    conn.query_row(
        "SELECT host_port, protocol, backend_json FROM routes WHERE host_port = ?1 AND protocol = ?2",
        rusqlite::params![host_port, protocol.as_str()],
        row_to_route,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("route {}/{}", protocol.as_str(), host_port)))
}

pub fn list(conn: &Connection) -> Result<Vec<Route>> {
    let mut stmt = conn.prepare("SELECT host_port, protocol, backend_json FROM routes ORDER BY host_port")?;
    let rows = stmt.query_map([], row_to_route)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// Deleting a nonexistent route is a no-op success (`spec.md` §8).
pub fn delete(conn: &Connection, host_port: u16, protocol: Protocol) -> Result<()> {
    conn.execute(
        "DELETE FROM routes WHERE host_port = ?1 AND protocol = ?2",
        rusqlite::params![host_port, protocol.as_str()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn upsert_is_idempotent_and_delete_missing_is_ok() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let route = Route {
            host_port: 8080,
            protocol: Protocol::Tcp,
            backend: RouteBackend::Bridge {
                ipv4: "192.168.127.2".into(),
                port: 80,
            },
        };
        upsert(&conn, &route).unwrap();
        upsert(&conn, &route).unwrap();
        assert_eq!(list(&conn).unwrap().len(), 1);

        delete(&conn, 8080, Protocol::Tcp).unwrap();
        delete(&conn, 8080, Protocol::Tcp).unwrap();
        assert!(list(&conn).unwrap().is_empty());
    }
}
