//! `vm_configs` (current version per VM) and `vm_config_history`
//! (append-only log of every version ever accepted).

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::models::VmConfig;

fn row_to_config(row: &rusqlite::Row) -> rusqlite::Result<VmConfig> {
    Ok(VmConfig {
        vm_id: row.get(0)?,
        version: row.get(1)?,
        config_json: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Current config version for a VM, or `None` if it has never been
/// configured.
pub fn current(conn: &Connection, vm_id: i64) -> Result<Option<VmConfig>> {
    conn.query_row(
        "SELECT vm_id, version, config_json, updated_at FROM vm_configs WHERE vm_id = ?1",
        [vm_id],
        row_to_config,
    )
    .optional()
    .map_err(Into::into)
}

/// Insert the next config version for a VM (current + 1, or 1 if none
/// exists yet), writing both the current-pointer row and a history row.
/// `spec.md` §3 invariant 4: version increases by exactly 1.
pub fn insert_next_version(conn: &Connection, vm_id: i64, config_json: &str, now: &str) -> Result<i64> {
    let next_version = match current(conn, vm_id)? {
        Some(c) => c.version + 1,
        None => 1,
    };

    conn.execute(
        "INSERT INTO vm_config_history (vm_id, version, config_json, updated_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![vm_id, next_version, config_json, now],
    )?;

    conn.execute(
        "INSERT INTO vm_configs (vm_id, version, config_json, updated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(vm_id, version) DO NOTHING",
        rusqlite::params![vm_id, next_version, config_json, now],
    )?;

    // vm_configs has a composite PK (vm_id, version); move the pointer by
    // deleting any older row for this VM.
    conn.execute(
        "DELETE FROM vm_configs WHERE vm_id = ?1 AND version < ?2",
        rusqlite::params![vm_id, next_version],
    )?;

    Ok(next_version)
}

pub fn history(conn: &Connection, vm_id: i64) -> Result<Vec<VmConfig>> {
    let mut stmt = conn.prepare(
        "SELECT vm_id, version, config_json, updated_at FROM vm_config_history WHERE vm_id = ?1 ORDER BY version",
    )?;
    let rows = stmt.query_map([vm_id], row_to_config)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn get_version(conn: &Connection, vm_id: i64, version: i64) -> Result<VmConfig> {
    conn.query_row(
        "SELECT vm_id, version, config_json, updated_at FROM vm_config_history WHERE vm_id = ?1 AND version = ?2",
        rusqlite::params![vm_id, version],
        row_to_config,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("vm {vm_id} config version {version}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn versions_increase_by_one_and_history_is_kept() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        conn.execute(
            "INSERT INTO vms (name, status, runtime, cpu_cores, memory_mb, kernel_cmdline, serial_socket, created_at, updated_at) \
             VALUES ('web', 'pending', 'nginx', 1, 512, '', '', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let vm_id = conn.last_insert_rowid();

        let v1 = insert_next_version(&conn, vm_id, "{\"a\":1}", "2024-01-01T00:00:00Z").unwrap();
        let v2 = insert_next_version(&conn, vm_id, "{\"a\":2}", "2024-01-01T00:00:01Z").unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);

        assert_eq!(current(&conn, vm_id).unwrap().unwrap().version, 2);
        assert_eq!(history(&conn, vm_id).unwrap().len(), 2);
    }
}
