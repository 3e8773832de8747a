//! `plugins` table: installed plugin records, keyed by unique name.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{DbError, Result};
use crate::models::Plugin;

fn row_to_plugin(row: &rusqlite::Row) -> rusqlite::Result<Plugin> {
    Ok(Plugin {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        enabled: row.get::<_, i64>(3)? != 0,
        manifest_blob: row.get(4)?,
        installed_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const SELECT_COLUMNS: &str = "id, name, version, enabled, manifest_blob, installed_at, updated_at";

pub fn upsert(conn: &Connection, name: &str, version: &str, manifest_blob: &str, now: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO plugins (name, version, enabled, manifest_blob, installed_at, updated_at) \
         VALUES (?1, ?2, 1, ?3, ?4, ?4)
         ON CONFLICT(name) DO UPDATE SET
            version = excluded.version,
            manifest_blob = excluded.manifest_blob,
            updated_at = excluded.updated_at",
        rusqlite::params![name, version, manifest_blob, now],
    )?;
    conn.query_row("SELECT id FROM plugins WHERE name = ?1", [name], |r| r.get(0))
        .map_err(Into::into)
}

pub fn get_by_name(conn: &Connection, name: &str) -> Result<Plugin> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM plugins WHERE name = ?1"),
        [name],
        row_to_plugin,
    )
    .optional()?
    .ok_or_else(|| DbError::NotFound(format!("plugin {name}")))
}

pub fn list(conn: &Connection) -> Result<Vec<Plugin>> {
    let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM plugins ORDER BY name"))?;
    let rows = stmt.query_map([], row_to_plugin)?;
    rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
}

pub fn set_enabled(conn: &Connection, name: &str, enabled: bool, now: &str) -> Result<()> {
    conn.execute(
        "UPDATE plugins SET enabled = ?1, updated_at = ?2 WHERE name = ?3",
        rusqlite::params![enabled as i64, now, name],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, name: &str) -> Result<()> {
    conn.execute("DELETE FROM plugins WHERE name = ?1", [name])?;
    Ok(())
}
