use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::models::{BlockEdge, BlockStatus};
use rusqlite::params;
use uuid::Uuid;

use crate::Database;
use crate::models::{fmt_ts, parse_ts, parse_uuid};

impl Database {
    // -- Blocks --

    /// Insert a block edge. Returns false if it already existed.
    pub fn insert_block(&self, blocker: Uuid, blocked: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)",
                params![blocker.to_string(), blocked.to_string(), fmt_ts(now)],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove a block edge. Returns false if there was none.
    pub fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2",
                params![blocker.to_string(), blocked.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    /// Both directions of the block relationship in one round trip.
    pub fn block_status(&self, viewer: Uuid, other: Uuid) -> Result<BlockStatus> {
        self.with_conn(|conn| {
            let (by_me, me): (bool, bool) = conn.query_row(
                "SELECT
                    EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2),
                    EXISTS(SELECT 1 FROM blocks WHERE blocker_id = ?2 AND blocked_id = ?1)",
                params![viewer.to_string(), other.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(BlockStatus {
                blocked_by_me: by_me,
                blocked_me: me,
            })
        })
    }

    pub fn list_blocks_by(&self, blocker: Uuid) -> Result<Vec<BlockEdge>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT blocker_id, blocked_id, created_at FROM blocks
                 WHERE blocker_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([blocker.to_string()], |row| {
                    let blocker: String = row.get(0)?;
                    let blocked: String = row.get(1)?;
                    let created: String = row.get(2)?;
                    Ok(BlockEdge {
                        blocker_id: parse_uuid(&blocker, 0)?,
                        blocked_id: parse_uuid(&blocked, 1)?,
                        created_at: parse_ts(&created, 2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
