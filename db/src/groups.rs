//! `vm_groups`: deployment records consumed by the scaling reconciler.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::models::VmGroup;

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<VmGroup> {
    Ok(VmGroup {
        id: row.get(0)?,
        name: row.get(1)?,
        config_json: row.get(2)?,
        replicas: row.get(3)?,
    })
}

pub fn insert(conn: &Connection, name: &str, config_json: &str, replicas: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO vm_groups (name, config_json, replicas) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, config_json, replicas],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_by_name(conn: &Connection, name: &str) -> Result<VmGroup> {
    conn.query_row(
        "SELECT id, name, config_json, replicas FROM vm_groups WHERE name = ?1",
        [name],
        row_to_group,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("group {name}")))
}

pub fn list(conn: &Connection) -> Result<Vec<VmGroup>> {
    let mut stmt = conn.prepare("SELECT id, name, config_json, replicas FROM vm_groups ORDER BY id")?;
    let rows = stmt.query_map([], row_to_group)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn update_template(conn: &Connection, id: i64, config_json: &str, replicas: i64) -> Result<()> {
    conn.execute(
        "UPDATE vm_groups SET config_json = ?1, replicas = ?2 WHERE id = ?3",
        rusqlite::params![config_json, replicas, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM vm_groups WHERE id = ?1", [id])?;
    Ok(())
}
