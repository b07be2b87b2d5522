use std::path::Path;

use rusqlite::{Connection, Row, params};

use arb_core::{Pose, Quaternion, Timestamp};

use crate::error::{Result, StoreError};
use crate::schema;

/// One anchor this bridge uploaded, as the remote service knows it.
#[derive(Clone, Debug, PartialEq)]
pub struct HostedAnchor {
    pub name: String,
    pub cloud_anchor_id: String,
    pub ttl_seconds: Option<u32>,
    pub hosted_at: Timestamp,
    pub expires_at: Timestamp,
    pub pose: Pose,
}

impl HostedAnchor {
    /// Ledger entry for an upload that just finished at `hosted_at`.
    pub fn new(
        name: &str,
        cloud_anchor_id: &str,
        ttl_seconds: Option<u32>,
        pose: Pose,
        hosted_at: Timestamp,
    ) -> Self {
        Self {
            name: name.to_string(),
            cloud_anchor_id: cloud_anchor_id.to_string(),
            ttl_seconds,
            hosted_at,
            expires_at: hosted_at.expiry(ttl_seconds),
            pose,
        }
    }

    pub fn is_live(&self, now: Timestamp) -> bool {
        now.is_before(self.expires_at)
    }
}

const HOSTED_COLUMNS: &str = "name, cloud_anchor_id, ttl_seconds, hosted_at, expires_at,
     pos_x, pos_y, pos_z, rot_w, rot_x, rot_y, rot_z";

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::debug!(path = %path.display(), "ledger opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Hosted anchors ---

    /// Record an upload. A later upload under the same name replaces it.
    pub fn record_hosted(&self, anchor: &HostedAnchor) -> Result<()> {
        let q = anchor.pose.rotation;
        let p = anchor.pose.position;
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO hosted_anchors ({HOSTED_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                anchor.name,
                anchor.cloud_anchor_id,
                anchor.ttl_seconds,
                to_sql_secs(anchor.hosted_at)?,
                to_sql_secs(anchor.expires_at)?,
                p[0],
                p[1],
                p[2],
                q.w,
                q.x,
                q.y,
                q.z,
            ],
        )?;
        tracing::info!(
            name = %anchor.name,
            cloud_anchor_id = %anchor.cloud_anchor_id,
            expires_at = %anchor.expires_at,
            "hosted anchor recorded"
        );
        Ok(())
    }

    /// Entries that have not expired at `now`, oldest first.
    pub fn list_hosted(&self, now: Timestamp) -> Result<Vec<HostedAnchor>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HOSTED_COLUMNS} FROM hosted_anchors
             WHERE expires_at > ?1 ORDER BY hosted_at, name"
        ))?;
        stmt.query_map([to_sql_secs(now)?], row_to_hosted)?
            .collect::<std::result::Result<_, _>>()
            .map_err(StoreError::from)
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<HostedAnchor>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HOSTED_COLUMNS} FROM hosted_anchors WHERE name = ?1"
        ))?;
        let mut rows = stmt.query_map([name], row_to_hosted)?;
        rows.next().transpose().map_err(StoreError::from)
    }

    /// Delete one entry. Returns whether it existed.
    pub fn forget(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM hosted_anchors WHERE name = ?1", [name])?;
        Ok(rows > 0)
    }

    /// Drop every entry that expired at or before `now`.
    pub fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM hosted_anchors WHERE expires_at <= ?1",
            [to_sql_secs(now)?],
        )?;
        if rows > 0 {
            tracing::info!(rows, "expired hosted anchors purged");
        }
        Ok(rows)
    }

    /// Fold the WAL back into the main database file.
    pub fn checkpoint_truncate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn to_sql_secs(ts: Timestamp) -> Result<i64> {
    i64::try_from(ts.0)
        .map_err(|_| StoreError::InvalidData(format!("timestamp out of range: {}", ts.0)))
}

fn row_to_hosted(row: &Row<'_>) -> rusqlite::Result<HostedAnchor> {
    let hosted_at: i64 = row.get(3)?;
    let expires_at: i64 = row.get(4)?;
    Ok(HostedAnchor {
        name: row.get(0)?,
        cloud_anchor_id: row.get(1)?,
        ttl_seconds: row.get(2)?,
        hosted_at: Timestamp(hosted_at.max(0) as u64),
        expires_at: Timestamp(expires_at.max(0) as u64),
        pose: Pose::new(
            [row.get(5)?, row.get(6)?, row.get(7)?],
            Quaternion::new(row.get(8)?, row.get(9)?, row.get(10)?, row.get(11)?),
        ),
    })
}
