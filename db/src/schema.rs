//! Ordered schema migrations, applied in sequence and recorded in
//! `schema_migrations`. Mirrors the teacher's single-version schema check,
//! generalized to the ordered-migration-runner `spec.md` §6 requires.

/// One migration: a monotonically increasing version and the DDL it applies.
pub struct Migration {
    pub version: i32,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plugins (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            version         TEXT NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            manifest_blob   TEXT NOT NULL,
            installed_at    TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vm_groups (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL UNIQUE,
            config_json TEXT NOT NULL,
            replicas    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS vms (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT NOT NULL UNIQUE,
            status          TEXT NOT NULL,
            runtime         TEXT NOT NULL,
            pid             INTEGER,
            ip_address      TEXT,
            mac_address     TEXT,
            vsock_cid       INTEGER UNIQUE,
            cpu_cores       INTEGER NOT NULL,
            memory_mb       INTEGER NOT NULL,
            kernel_cmdline  TEXT NOT NULL,
            serial_socket   TEXT NOT NULL,
            group_id        INTEGER REFERENCES vm_groups(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ip_allocations (
            ip          TEXT PRIMARY KEY,
            vm_id       INTEGER REFERENCES vms(id),
            status      TEXT NOT NULL,
            leased_at   TEXT
        );

        CREATE TABLE IF NOT EXISTS vm_configs (
            vm_id       INTEGER NOT NULL REFERENCES vms(id),
            version     INTEGER NOT NULL,
            config_json TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (vm_id, version)
        );

        CREATE TABLE IF NOT EXISTS vm_config_history (
            vm_id       INTEGER NOT NULL REFERENCES vms(id),
            version     INTEGER NOT NULL,
            config_json TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (vm_id, version)
        );

        CREATE TABLE IF NOT EXISTS vm_cloud_init (
            vm_id           INTEGER PRIMARY KEY REFERENCES vms(id),
            user_data       TEXT,
            meta_data       TEXT,
            network_config  TEXT,
            seed_path       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plugin_artifacts (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            plugin          TEXT NOT NULL,
            version         TEXT NOT NULL,
            artifact_name   TEXT NOT NULL,
            kind            TEXT NOT NULL,
            source_url      TEXT NOT NULL,
            checksum        TEXT,
            format          TEXT NOT NULL,
            local_path      TEXT NOT NULL UNIQUE,
            size_bytes      INTEGER NOT NULL,
            ref_count       INTEGER NOT NULL DEFAULT 1,
            UNIQUE (source_url, checksum)
        );

        CREATE TABLE IF NOT EXISTS routes (
            host_port   INTEGER NOT NULL,
            protocol    TEXT NOT NULL,
            backend_json TEXT NOT NULL,
            PRIMARY KEY (host_port, protocol)
        );
        "#,
    },
];

pub const SCHEMA_VERSION: i32 = MIGRATIONS[MIGRATIONS.len() - 1].version;
