//! `vms` table.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::models::{Vm, VmStatus};

/// Fields needed to insert a new VM row. IP/CID/tap/paths are expected to
/// already be reserved by the allocator within the same transaction.
pub struct NewVm<'a> {
    pub name: &'a str,
    pub runtime: &'a str,
    pub ip_address: Option<&'a str>,
    pub mac_address: Option<&'a str>,
    pub vsock_cid: Option<u32>,
    pub cpu_cores: i64,
    pub memory_mb: i64,
    pub kernel_cmdline: &'a str,
    pub serial_socket: &'a str,
    pub group_id: Option<i64>,
}

fn row_to_vm(row: &rusqlite::Row) -> rusqlite::Result<Vm> {
    let status: String = row.get(2)?;
    Ok(Vm {
        id: row.get(0)?,
        name: row.get(1)?,
        status: status.parse().unwrap_or(VmStatus::Crashed),
        runtime: row.get(3)?,
        pid: row.get(4)?,
        ip_address: row.get(5)?,
        mac_address: row.get(6)?,
        vsock_cid: row.get::<_, Option<i64>>(7)?.map(|v| v as u32),
        cpu_cores: row.get(8)?,
        memory_mb: row.get(9)?,
        kernel_cmdline: row.get(10)?,
        serial_socket: row.get(11)?,
        group_id: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

const SELECT_COLUMNS: &str = "id, name, status, runtime, pid, ip_address, mac_address, \
     vsock_cid, cpu_cores, memory_mb, kernel_cmdline, serial_socket, group_id, created_at, updated_at";

pub fn insert(conn: &Connection, new: NewVm<'_>, now: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO vms (name, status, runtime, pid, ip_address, mac_address, vsock_cid, \
         cpu_cores, memory_mb, kernel_cmdline, serial_socket, group_id, created_at, updated_at) \
         VALUES (?1, 'pending', ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        rusqlite::params![
            new.name,
            new.runtime,
            new.ip_address,
            new.mac_address,
            new.vsock_cid,
            new.cpu_cores,
            new.memory_mb,
            new.kernel_cmdline,
            new.serial_socket,
            new.group_id,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_by_name(conn: &Connection, name: &str) -> Result<Vm> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM vms WHERE name = ?1"),
        [name],
        row_to_vm,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("vm {name}")))
}

pub fn get(conn: &Connection, id: i64) -> Result<Vm> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM vms WHERE id = ?1"),
        [id],
        row_to_vm,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("vm id {id}")))
}

pub fn list(conn: &Connection) -> Result<Vec<Vm>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM vms ORDER BY id"))?;
    let rows = stmt.query_map([], row_to_vm)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn list_by_group(conn: &Connection, group_id: i64) -> Result<Vec<Vm>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM vms WHERE group_id = ?1 ORDER BY id"
    ))?;
    let rows = stmt.query_map([group_id], row_to_vm)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

/// All vsock CIDs currently assigned to a VM, ascending. Used by the
/// allocator to pick the lowest free CID `>= 3`.
pub fn used_cids(conn: &Connection) -> Result<Vec<u32>> {
    let mut stmt = conn.prepare("SELECT vsock_cid FROM vms WHERE vsock_cid IS NOT NULL ORDER BY vsock_cid")?;
    let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    rows.map(|r| r.map(|v| v as u32).map_err(Into::into)).collect()
}

pub fn set_status(conn: &Connection, id: i64, status: VmStatus, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE vms SET status = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![status.as_str(), now, id],
    )?;
    Ok(())
}

pub fn set_pid(conn: &Connection, id: i64, pid: Option<i64>, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE vms SET pid = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![pid, now, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM vm_config_history WHERE vm_id = ?1", [id])?;
    conn.execute("DELETE FROM vm_configs WHERE vm_id = ?1", [id])?;
    conn.execute("DELETE FROM vm_cloud_init WHERE vm_id = ?1", [id])?;
    conn.execute("DELETE FROM vms WHERE id = ?1", [id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn sample(name: &'static str) -> NewVm<'static> {
        NewVm {
            name,
            runtime: "nginx",
            ip_address: Some("192.168.127.2"),
            mac_address: Some("06:00:c0:a8:7f:02"),
            vsock_cid: Some(3),
            cpu_cores: 1,
            memory_mb: 512,
            kernel_cmdline: "volant.boot=rootfs",
            serial_socket: "/run/volant/web.serial",
            group_id: None,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let id = insert(&conn, sample("web"), "2024-01-01T00:00:00Z").unwrap();
        let vm = get(&conn, id).unwrap();
        assert_eq!(vm.name, "web");
        assert_eq!(vm.status, VmStatus::Pending);
        assert_eq!(vm.vsock_cid, Some(3));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        insert(&conn, sample("web"), "2024-01-01T00:00:00Z").unwrap();
        let err = insert(&conn, sample("web"), "2024-01-01T00:00:00Z");
        assert!(err.is_err());
    }

    #[test]
    fn set_status_then_set_pid() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let id = insert(&conn, sample("web"), "2024-01-01T00:00:00Z").unwrap();
        set_status(&conn, id, VmStatus::Running, "2024-01-01T00:00:01Z").unwrap();
        set_pid(&conn, id, Some(1234), "2024-01-01T00:00:01Z").unwrap();
        let vm = get(&conn, id).unwrap();
        assert_eq!(vm.status, VmStatus::Running);
        assert_eq!(vm.pid, Some(1234));
    }

    #[test]
    fn get_by_name_not_found() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let err = get_by_name(&conn, "missing").unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }
}
