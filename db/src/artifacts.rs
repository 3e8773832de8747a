//! `plugin_artifacts`: the staged-file cache index. Identical
//! `(source_url, checksum)` is shared across VMs and reference counted, so
//! concurrent creates referencing the same artifact converge on one file.

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::PluginArtifact;

fn row_to_artifact(row: &rusqlite::Row) -> rusqlite::Result<PluginArtifact> {
    Ok(PluginArtifact {
        id: row.get(0)?,
        plugin: row.get(1)?,
        version: row.get(2)?,
        artifact_name: row.get(3)?,
        kind: row.get(4)?,
        source_url: row.get(5)?,
        checksum: row.get(6)?,
        format: row.get(7)?,
        local_path: row.get(8)?,
        size_bytes: row.get(9)?,
        ref_count: row.get(10)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, plugin, version, artifact_name, kind, source_url, checksum, format, local_path, size_bytes, ref_count";

pub fn find_by_source(conn: &Connection, source_url: &str, checksum: Option<&str>) -> Result<Option<PluginArtifact>> {
    conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM plugin_artifacts WHERE source_url = ?1 AND checksum IS ?2"
        ),
        rusqlite::params![source_url, checksum],
        row_to_artifact,
    )
    .optional()
    .map_err(Into::into)
}

/// Record a newly staged artifact with an initial reference count of 1.
#[allow(clippy::too_many_arguments)]
pub fn insert(
    conn: &Connection,
    plugin: &str,
    version: &str,
    artifact_name: &str,
    kind: &str,
    source_url: &str,
    checksum: Option<&str>,
    format: &str,
    local_path: &str,
    size_bytes: i64,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO plugin_artifacts (plugin, version, artifact_name, kind, source_url, checksum, format, local_path, size_bytes, ref_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)",
        rusqlite::params![plugin, version, artifact_name, kind, source_url, checksum, format, local_path, size_bytes],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Another consumer now references this artifact.
pub fn increment_ref(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE plugin_artifacts SET ref_count = ref_count + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(())
}

/// A consumer released this artifact. Returns the remaining reference count
/// so the caller can delete the backing file once it reaches zero.
pub fn decrement_ref(conn: &Connection, id: i64) -> Result<i64> {
    conn.execute(
        "UPDATE plugin_artifacts SET ref_count = MAX(ref_count - 1, 0) WHERE id = ?1",
        [id],
    )?;
    conn.query_row("SELECT ref_count FROM plugin_artifacts WHERE id = ?1", [id], |r| {
        r.get(0)
    })
    .map_err(Into::into)
}

pub fn delete(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM plugin_artifacts WHERE id = ?1", [id])?;
    Ok(())
}
