use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    // Small ledger; checkpoint every ~400KB so the WAL never grows large
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // In-memory databases refuse this; only log when it actually ran
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::debug!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hosted_anchors (
            name            TEXT PRIMARY KEY,
            cloud_anchor_id TEXT NOT NULL,
            ttl_seconds     INTEGER,
            hosted_at       INTEGER NOT NULL,
            expires_at      INTEGER NOT NULL,
            pos_x           REAL NOT NULL,
            pos_y           REAL NOT NULL,
            pos_z           REAL NOT NULL,
            rot_w           REAL NOT NULL,
            rot_x           REAL NOT NULL,
            rot_y           REAL NOT NULL,
            rot_z           REAL NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_hosted_expiry ON hosted_anchors(expires_at);
        CREATE INDEX IF NOT EXISTS idx_hosted_cloud_id ON hosted_anchors(cloud_anchor_id);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
