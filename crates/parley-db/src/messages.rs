use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use parley_types::models::{MediaType, Message};
use rusqlite::params;
use rusqlite::types::Type;
use uuid::Uuid;

use crate::Database;
use crate::models::{OptionalExt, fmt_ts, parse_opt_ts, parse_ts, parse_uuid, truncate_ms};

pub(crate) const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, content, media_urls, media_type, \
     created_at, edited_at, is_edited, deleted_at, deleted_by, is_read";

/// Fields the caller supplies for a new message; timestamps are assigned on write.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub media_urls: Vec<String>,
    pub media_type: MediaType,
}

impl Database {
    // -- Messages --

    /// Insert a message and bump the conversation's `updated_at`.
    ///
    /// `created_at` is `now`, pushed forward to 1ms past the newest row of the
    /// conversation when needed, so rows of one conversation are strictly
    /// ordered even when the clock stalls or steps back.
    pub fn insert_message(&self, new: &NewMessage, now: DateTime<Utc>) -> Result<Message> {
        let media_json = serde_json::to_string(&new.media_urls)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = new.conversation_id.to_string();

            let newest: Option<String> = tx.query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [&cid],
                |row| row.get(0),
            )?;

            let mut created_at = truncate_ms(now);
            if let Some(newest) = newest {
                let newest = parse_ts(&newest, 0)?;
                if created_at <= newest {
                    created_at = newest + Duration::milliseconds(1);
                }
            }
            let ts = fmt_ts(created_at);

            tx.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, content, media_urls, media_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    new.id.to_string(),
                    cid,
                    new.sender_id.to_string(),
                    new.content,
                    media_json,
                    new.media_type.as_str(),
                    ts,
                ],
            )?;

            let touched = tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![ts, cid],
            )?;
            if touched == 0 {
                return Err(anyhow!("Conversation not found: {}", new.conversation_id));
            }

            tx.commit()?;

            Ok(Message {
                id: new.id,
                conversation_id: new.conversation_id,
                sender_id: new.sender_id,
                content: new.content.clone(),
                media_urls: new.media_urls.clone(),
                media_type: new.media_type,
                created_at,
                edited_at: None,
                is_edited: false,
                deleted_at: None,
                deleted_by: None,
                is_read: false,
            })
        })
    }

    /// Fetch one message, soft-deleted or not.
    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
            conn.query_row(&sql, [id.to_string()], row_to_message).optional()
        })
    }

    /// Visible (not soft-deleted) messages of a conversation, oldest first.
    /// Returns the newest `limit` rows older than `before`, when given.
    pub fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut rows = match before {
                Some(before) => {
                    let sql = format!(
                        "SELECT {} FROM messages
                         WHERE conversation_id = ?1 AND deleted_at IS NULL AND created_at < ?2
                         ORDER BY created_at DESC LIMIT ?3",
                        MESSAGE_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(
                        params![conversation_id.to_string(), fmt_ts(before), limit],
                        row_to_message,
                    )?
                    .collect::<std::result::Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!(
                        "SELECT {} FROM messages
                         WHERE conversation_id = ?1 AND deleted_at IS NULL
                         ORDER BY created_at DESC LIMIT ?2",
                        MESSAGE_COLUMNS
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![conversation_id.to_string(), limit], row_to_message)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };

            rows.reverse();
            Ok(rows)
        })
    }

    /// Replace the content of a live message. Returns false if the message is
    /// missing or already soft-deleted.
    pub fn update_message_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET content = ?1, is_edited = 1, edited_at = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![content, fmt_ts(edited_at), id.to_string()],
            )?;
            Ok(updated > 0)
        })
    }

    /// Stamp `deleted_at`/`deleted_by`. Returns false if already deleted.
    pub fn soft_delete_message(&self, id: Uuid, deleted_by: Uuid, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET deleted_at = ?1, deleted_by = ?2
                 WHERE id = ?3 AND deleted_at IS NULL",
                params![fmt_ts(at), deleted_by.to_string(), id.to_string()],
            )?;
            Ok(updated > 0)
        })
    }

    /// Flag every message of the conversation not sent by `reader` as read.
    pub fn mark_read(&self, conversation_id: Uuid, reader: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                params![conversation_id.to_string(), reader.to_string()],
            )?;
            Ok(updated)
        })
    }
}

pub(crate) fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let sender_id: String = row.get(2)?;
    let media_urls: String = row.get(4)?;
    let media_type: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let deleted_by: Option<String> = row.get(10)?;

    let media_urls: Vec<String> = serde_json::from_str(&media_urls)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let media_type: MediaType = media_type
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(Message {
        id: parse_uuid(&id, 0)?,
        conversation_id: parse_uuid(&conversation_id, 1)?,
        sender_id: parse_uuid(&sender_id, 2)?,
        content: row.get(3)?,
        media_urls,
        media_type,
        created_at: parse_ts(&created_at, 6)?,
        edited_at: parse_opt_ts(row.get(7)?, 7)?,
        is_edited: row.get(8)?,
        deleted_at: parse_opt_ts(row.get(9)?, 9)?,
        deleted_by: deleted_by.map(|s| parse_uuid(&s, 10)).transpose()?,
        is_read: row.get(11)?,
    })
}
