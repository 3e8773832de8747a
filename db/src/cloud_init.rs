//! `vm_cloud_init`: materialized cloud-init documents and the seed image
//! path built from them.

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;
use crate::models::VmCloudInit;

fn row_to_cloud_init(row: &rusqlite::Row) -> rusqlite::Result<VmCloudInit> {
    Ok(VmCloudInit {
        vm_id: row.get(0)?,
        user_data: row.get(1)?,
        meta_data: row.get(2)?,
        network_config: row.get(3)?,
        seed_path: row.get(4)?,
    })
}

pub fn upsert(conn: &Connection, ci: &VmCloudInit) -> Result<()> {
    conn.execute(
        "INSERT INTO vm_cloud_init (vm_id, user_data, meta_data, network_config, seed_path) \
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(vm_id) DO UPDATE SET
            user_data = excluded.user_data,
            meta_data = excluded.meta_data,
            network_config = excluded.network_config,
            seed_path = excluded.seed_path",
        rusqlite::params![
            ci.vm_id,
            ci.user_data,
            ci.meta_data,
            ci.network_config,
            ci.seed_path
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, vm_id: i64) -> Result<Option<VmCloudInit>> {
    conn.query_row(
        "SELECT vm_id, user_data, meta_data, network_config, seed_path FROM vm_cloud_init WHERE vm_id = ?1",
        [vm_id],
        row_to_cloud_init,
    )
    .optional()
    .map_err(Into::into)
}
