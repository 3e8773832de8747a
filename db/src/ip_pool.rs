//! `ip_allocations` table: the pool an allocator draws static IPs from.

use rusqlite::{Connection, OptionalExtension};
use std::net::Ipv4Addr;

use crate::error::Result;
use crate::models::{IpAllocation, IpStatus};

fn row_to_allocation(row: &rusqlite::Row) -> rusqlite::Result<IpAllocation> {
    let status: String = row.get(2)?;
    Ok(IpAllocation {
        ip: row.get(0)?,
        vm_id: row.get(1)?,
        status: if status == "leased" {
            IpStatus::Leased
        } else {
            IpStatus::Available
        },
        leased_at: row.get(3)?,
    })
}

/// Seed the pool from a CIDR, skipping `exclude` (host address, network,
/// broadcast). Idempotent: addresses already present are left untouched.
pub fn seed_pool(conn: &Connection, addresses: &[Ipv4Addr], exclude: &[Ipv4Addr]) -> Result<()> {
    for ip in addresses {
        if exclude.contains(ip) {
            continue;
        }
        conn.execute(
            "INSERT OR IGNORE INTO ip_allocations (ip, vm_id, status, leased_at) VALUES (?1, NULL, 'available', NULL)",
            [ip.to_string()],
        )?;
    }
    Ok(())
}

/// The lowest-numbered available address, without reserving it.
pub fn lowest_available(conn: &Connection) -> Result<Option<Ipv4Addr>> {
    let ip: Option<String> = conn
        .query_row(
            "SELECT ip FROM ip_allocations WHERE status = 'available' ORDER BY ip",
            [],
            |r| r.get(0),
        )
        .optional()?;
    Ok(ip.and_then(|s| s.parse().ok()))
}

/// Mark `ip` leased to `vm_id`. Fails (returns `Ok(false)`) if the address is
/// not currently available — callers decide whether that's an error.
pub fn lease(conn: &Connection, ip: Ipv4Addr, vm_id: i64, leased_at: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE ip_allocations SET vm_id = ?1, status = 'leased', leased_at = ?2
         WHERE ip = ?3 AND status = 'available'",
        rusqlite::params![vm_id, leased_at, ip.to_string()],
    )?;
    Ok(updated == 1)
}

/// Return an address to the available pool. Idempotent: releasing an
/// already-available address is a no-op success.
pub fn release(conn: &Connection, ip: Ipv4Addr) -> Result<()> {
    conn.execute(
        "UPDATE ip_allocations SET vm_id = NULL, status = 'available', leased_at = NULL WHERE ip = ?1",
        [ip.to_string()],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, ip: Ipv4Addr) -> Result<Option<IpAllocation>> {
    conn.query_row(
        "SELECT ip, vm_id, status, leased_at FROM ip_allocations WHERE ip = ?1",
        [ip.to_string()],
        row_to_allocation,
    )
    .optional()
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn lowest_available_then_exhaustion() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let pool: Vec<Ipv4Addr> = (2..=3).map(|n| Ipv4Addr::new(192, 168, 127, n)).collect();
        seed_pool(&conn, &pool, &[]).unwrap();

        let first = lowest_available(&conn).unwrap().unwrap();
        assert_eq!(first, Ipv4Addr::new(192, 168, 127, 2));
        assert!(lease(&conn, first, 1, "2024-01-01T00:00:00Z").unwrap());

        let second = lowest_available(&conn).unwrap().unwrap();
        assert_eq!(second, Ipv4Addr::new(192, 168, 127, 3));
        assert!(lease(&conn, second, 2, "2024-01-01T00:00:00Z").unwrap());

        assert_eq!(lowest_available(&conn).unwrap(), None);
    }

    #[test]
    fn release_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let ip = Ipv4Addr::new(192, 168, 127, 2);
        seed_pool(&conn, &[ip], &[]).unwrap();
        release(&conn, ip).unwrap();
        release(&conn, ip).unwrap();
        assert_eq!(lowest_available(&conn).unwrap(), Some(ip));
    }
}
