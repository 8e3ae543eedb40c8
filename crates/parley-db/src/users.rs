use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::models::Profile;
use rusqlite::params;
use uuid::Uuid;

use crate::Database;
use crate::models::{OptionalExt, fmt_ts, parse_uuid};

impl Database {
    // -- Users --

    /// Mirror a profile issued by the identity provider. Later calls overwrite.
    pub fn upsert_user(&self, profile: &Profile, now: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, display_name, avatar_url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    display_name = excluded.display_name,
                    avatar_url = excluded.avatar_url,
                    updated_at = excluded.updated_at",
                params![
                    profile.id.to_string(),
                    profile.username,
                    profile.display_name,
                    profile.avatar_url,
                    fmt_ts(now),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, username, display_name, avatar_url FROM users WHERE id = ?1",
                [id.to_string()],
                |row| {
                    let id: String = row.get(0)?;
                    Ok(Profile {
                        id: parse_uuid(&id, 0)?,
                        username: row.get(1)?,
                        display_name: row.get(2)?,
                        avatar_url: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }
}
