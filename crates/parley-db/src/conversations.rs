use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::models::{Conversation, Message};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::Database;
use crate::messages::{MESSAGE_COLUMNS, row_to_message};
use crate::models::{OptionalExt, fmt_ts, pair_key, parse_ts, parse_uuid};

/// One inbox line: a conversation seen from one participant.
#[derive(Debug, Clone)]
pub struct InboxEntry {
    pub conversation: Conversation,
    pub other_id: Uuid,
    pub last_message: Option<Message>,
    pub unread_count: u32,
}

impl Database {
    // -- Conversations --

    /// Conversation whose participants include both `a` and `b`, oldest first.
    pub fn find_conversation_between(&self, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
        self.with_conn(|conn| query_conversation_between(conn, a, b))
    }

    /// Return the conversation shared by `a` and `b`, inserting it (with both
    /// participant links) under `new_id` when none exists.
    /// Returns `(conversation_id, created)`.
    pub fn get_or_create_conversation(
        &self,
        new_id: Uuid,
        a: Uuid,
        b: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Uuid, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if let Some(existing) = query_conversation_between(&tx, a, b)? {
                return Ok((existing, false));
            }

            let ts = fmt_ts(now);
            let key = pair_key(a, b);
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations (id, pair_key, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![new_id.to_string(), key, ts],
            )?;

            if inserted == 0 {
                // Pair row exists without both participant links; reuse it.
                let id: String = tx.query_row(
                    "SELECT id FROM conversations WHERE pair_key = ?1",
                    [&key],
                    |row| row.get(0),
                )?;
                let id = parse_uuid(&id, 0)?;
                for user in [a, b] {
                    tx.execute(
                        "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id, joined_at)
                         VALUES (?1, ?2, ?3)",
                        params![id.to_string(), user.to_string(), ts],
                    )?;
                }
                tx.commit()?;
                return Ok((id, false));
            }

            for user in [a, b] {
                tx.execute(
                    "INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
                     VALUES (?1, ?2, ?3)",
                    params![new_id.to_string(), user.to_string(), ts],
                )?;
            }

            tx.commit()?;
            Ok((new_id, true))
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Every conversation `user_id` participates in, most recently active first.
    pub fn list_inbox(&self, user_id: Uuid) -> Result<Vec<InboxEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC, c.id ASC",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    parse_uuid(&id, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut entries = Vec::with_capacity(ids.len());
            for id in ids {
                let Some(conversation) = query_conversation(conn, id)? else {
                    continue;
                };
                let Some(other_id) = conversation.others(user_id).next() else {
                    continue;
                };
                let last_message = query_last_visible_message(conn, id)?;
                let unread_count = query_unread_count(conn, id, user_id)?;
                entries.push(InboxEntry {
                    conversation,
                    other_id,
                    last_message,
                    unread_count,
                });
            }
            Ok(entries)
        })
    }

    /// Remove a conversation with its participant links, messages and the
    /// reactions on those messages, in one transaction.
    pub fn delete_conversation_cascade(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let cid = id.to_string();

            tx.execute(
                "DELETE FROM reactions WHERE message_id IN
                    (SELECT id FROM messages WHERE conversation_id = ?1)",
                [&cid],
            )?;
            tx.execute("DELETE FROM messages WHERE conversation_id = ?1", [&cid])?;
            tx.execute(
                "DELETE FROM conversation_participants WHERE conversation_id = ?1",
                [&cid],
            )?;
            let removed = tx.execute("DELETE FROM conversations WHERE id = ?1", [&cid])?;

            tx.commit()?;
            Ok(removed > 0)
        })
    }
}

fn query_conversation_between(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Uuid>> {
    let id: Option<String> = conn
        .query_row(
            "SELECT p1.conversation_id FROM conversation_participants p1
             JOIN conversation_participants p2 ON p2.conversation_id = p1.conversation_id
             JOIN conversations c ON c.id = p1.conversation_id
             WHERE p1.user_id = ?1 AND p2.user_id = ?2
             ORDER BY c.created_at ASC
             LIMIT 1",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(id.map(|s| parse_uuid(&s, 0)).transpose()?)
}

fn query_conversation(conn: &Connection, id: Uuid) -> Result<Option<Conversation>> {
    let header: Option<(String, String)> = conn
        .query_row(
            "SELECT created_at, updated_at FROM conversations WHERE id = ?1",
            [id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((created_at, updated_at)) = header else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants
         WHERE conversation_id = ?1 ORDER BY joined_at ASC, user_id ASC",
    )?;
    let participant_ids = stmt
        .query_map([id.to_string()], |row| {
            let uid: String = row.get(0)?;
            parse_uuid(&uid, 0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(Conversation {
        id,
        created_at: parse_ts(&created_at, 0)?,
        updated_at: parse_ts(&updated_at, 1)?,
        participant_ids,
    }))
}

fn query_last_visible_message(conn: &Connection, conversation_id: Uuid) -> Result<Option<Message>> {
    let sql = format!(
        "SELECT {} FROM messages
         WHERE conversation_id = ?1 AND deleted_at IS NULL
         ORDER BY created_at DESC LIMIT 1",
        MESSAGE_COLUMNS
    );
    conn.query_row(&sql, [conversation_id.to_string()], row_to_message)
        .optional()
}

fn query_unread_count(conn: &Connection, conversation_id: Uuid, reader: Uuid) -> Result<u32> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM messages
         WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0 AND deleted_at IS NULL",
        params![conversation_id.to_string(), reader.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::NewMessage;
    use parley_types::models::MediaType;

    fn text(conversation_id: Uuid, sender_id: Uuid, content: &str) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.to_string(),
            media_urls: vec![],
            media_type: MediaType::None,
        }
    }

    #[test]
    fn get_or_create_is_idempotent_in_both_orders() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (first, created) = db.get_or_create_conversation(Uuid::new_v4(), a, b, Utc::now()).unwrap();
        assert!(created);
        let (second, created) = db.get_or_create_conversation(Uuid::new_v4(), b, a, Utc::now()).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);

        let conversation = db.get_conversation(first).unwrap().unwrap();
        assert!(conversation.has_participant(a) && conversation.has_participant(b));
        assert_eq!(conversation.participant_ids.len(), 2);
    }

    #[test]
    fn inbox_shows_last_visible_message_and_unread() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (cid, _) = db.get_or_create_conversation(Uuid::new_v4(), a, b, Utc::now()).unwrap();

        db.insert_message(&text(cid, a, "first"), Utc::now()).unwrap();
        let second = db.insert_message(&text(cid, a, "second"), Utc::now()).unwrap();
        db.soft_delete_message(second.id, a, Utc::now()).unwrap();

        let inbox = db.list_inbox(b).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].other_id, a);
        assert_eq!(inbox[0].last_message.as_ref().unwrap().content, "first");
        assert_eq!(inbox[0].unread_count, 1);

        // The sender has nothing unread.
        assert_eq!(db.list_inbox(a).unwrap()[0].unread_count, 0);
    }

    #[test]
    fn cascade_delete_removes_everything() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (cid, _) = db.get_or_create_conversation(Uuid::new_v4(), a, b, Utc::now()).unwrap();
        let msg = db.insert_message(&text(cid, a, "hi"), Utc::now()).unwrap();
        db.add_reaction_capped(Uuid::new_v4(), msg.id, b, "👍", Utc::now(), 2).unwrap();

        assert!(db.delete_conversation_cascade(cid).unwrap());
        assert!(db.get_conversation(cid).unwrap().is_none());
        assert!(db.get_message(msg.id).unwrap().is_none());
        assert!(db.reactions_for_message(msg.id).unwrap().is_empty());
        assert!(db.find_conversation_between(a, b).unwrap().is_none());
        assert!(!db.delete_conversation_cascade(cid).unwrap());
    }
}
