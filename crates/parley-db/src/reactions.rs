use anyhow::Result;
use chrono::{DateTime, Utc};
use parley_types::models::Reaction;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::Database;
use crate::models::{OptionalExt, fmt_ts, parse_ts, parse_uuid, truncate_ms};

// rowid breaks ties between reactions stamped in the same millisecond.
const REACTION_SELECT: &str = "SELECT id, message_id, user_id, emoji, created_at FROM reactions";
const REACTION_ORDER: &str = "ORDER BY created_at ASC, rowid ASC";

impl Database {
    // -- Reactions --

    /// Insert a reaction, first evicting the oldest reactions of the same
    /// (message, user) pair so that at most `cap` remain afterwards.
    /// Returns the inserted reaction and whatever was evicted.
    pub fn add_reaction_capped(
        &self,
        id: Uuid,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        now: DateTime<Utc>,
        cap: usize,
    ) -> Result<(Reaction, Vec<Reaction>)> {
        anyhow::ensure!(cap > 0, "reaction cap must be at least 1");
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing = query_pair(&tx, message_id, user_id)?;

            let overflow = (existing.len() + 1).saturating_sub(cap);
            let evicted: Vec<Reaction> = existing.into_iter().take(overflow).collect();
            for old in &evicted {
                tx.execute("DELETE FROM reactions WHERE id = ?1", [old.id.to_string()])?;
            }

            let reaction = Reaction {
                id,
                message_id,
                user_id,
                emoji: emoji.to_string(),
                created_at: truncate_ms(now),
            };
            tx.execute(
                "INSERT INTO reactions (id, message_id, user_id, emoji, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    message_id.to_string(),
                    user_id.to_string(),
                    emoji,
                    fmt_ts(reaction.created_at),
                ],
            )?;
            tx.commit()?;

            Ok((reaction, evicted))
        })
    }

    /// Delete the newest reaction matching (message, user, emoji), if any.
    pub fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM reactions
                     WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3
                     ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    params![message_id.to_string(), user_id.to_string(), emoji],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = id else {
                return Ok(None);
            };
            conn.execute("DELETE FROM reactions WHERE id = ?1", [&id])?;
            Ok(Some(parse_uuid(&id, 0)?))
        })
    }

    /// Reactions of one user on one message, oldest first.
    pub fn reactions_for_pair(&self, message_id: Uuid, user_id: Uuid) -> Result<Vec<Reaction>> {
        self.with_conn(|conn| query_pair(conn, message_id, user_id))
    }

    /// All reactions on a message, oldest first.
    pub fn reactions_for_message(&self, message_id: Uuid) -> Result<Vec<Reaction>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE message_id = ?1 {}", REACTION_SELECT, REACTION_ORDER);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([message_id.to_string()], row_to_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch reactions for a set of message IDs.
    pub fn get_reactions_for_messages(&self, message_ids: &[Uuid]) -> Result<Vec<Reaction>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "{} WHERE message_id IN ({}) {}",
                REACTION_SELECT,
                placeholders.join(", "),
                REACTION_ORDER
            );

            let ids: Vec<String> = message_ids.iter().map(|id| id.to_string()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(ids.iter()), row_to_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn delete_reactions(&self, ids: &[Uuid]) -> Result<usize> {
        self.with_conn(|conn| {
            let mut removed = 0;
            for id in ids {
                removed += conn.execute("DELETE FROM reactions WHERE id = ?1", [id.to_string()])?;
            }
            Ok(removed)
        })
    }
}

fn query_pair(conn: &Connection, message_id: Uuid, user_id: Uuid) -> Result<Vec<Reaction>> {
    let sql = format!(
        "{} WHERE message_id = ?1 AND user_id = ?2 {}",
        REACTION_SELECT, REACTION_ORDER
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![message_id.to_string(), user_id.to_string()], row_to_reaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reaction> {
    let id: String = row.get(0)?;
    let message_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let created_at: String = row.get(4)?;

    Ok(Reaction {
        id: parse_uuid(&id, 0)?,
        message_id: parse_uuid(&message_id, 1)?,
        user_id: parse_uuid(&user_id, 2)?,
        emoji: row.get(3)?,
        created_at: parse_ts(&created_at, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::NewMessage;
    use parley_types::models::MediaType;

    fn setup() -> (Database, Uuid, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (cid, _) = db.get_or_create_conversation(Uuid::new_v4(), a, b, Utc::now()).unwrap();
        let msg = db
            .insert_message(
                &NewMessage {
                    id: Uuid::new_v4(),
                    conversation_id: cid,
                    sender_id: a,
                    content: "hi".into(),
                    media_urls: vec![],
                    media_type: MediaType::None,
                },
                Utc::now(),
            )
            .unwrap();
        (db, msg.id, b)
    }

    fn emojis(reactions: &[Reaction]) -> Vec<&str> {
        reactions.iter().map(|r| r.emoji.as_str()).collect()
    }

    #[test]
    fn third_reaction_evicts_oldest() {
        let (db, mid, user) = setup();
        let now = Utc::now();
        for emoji in ["👍", "❤️"] {
            let (_, evicted) = db.add_reaction_capped(Uuid::new_v4(), mid, user, emoji, now, 2).unwrap();
            assert!(evicted.is_empty());
        }
        // Same timestamp on purpose: insertion order decides.
        let (_, evicted) = db.add_reaction_capped(Uuid::new_v4(), mid, user, "😂", now, 2).unwrap();
        assert_eq!(emojis(&evicted), vec!["👍"]);

        let left = db.reactions_for_pair(mid, user).unwrap();
        assert_eq!(emojis(&left), vec!["❤️", "😂"]);
    }

    #[test]
    fn overfull_pair_is_trimmed_on_next_add() {
        let (db, mid, user) = setup();
        for emoji in ["a", "b", "c"] {
            db.add_reaction_capped(Uuid::new_v4(), mid, user, emoji, Utc::now(), 10).unwrap();
        }
        let (_, evicted) = db.add_reaction_capped(Uuid::new_v4(), mid, user, "d", Utc::now(), 2).unwrap();
        assert_eq!(emojis(&evicted), vec!["a", "b"]);
        assert_eq!(emojis(&db.reactions_for_pair(mid, user).unwrap()), vec!["c", "d"]);
    }

    #[test]
    fn zero_cap_writes_nothing() {
        let (db, mid, user) = setup();
        assert!(db.add_reaction_capped(Uuid::new_v4(), mid, user, "👍", Utc::now(), 0).is_err());
        assert!(db.reactions_for_pair(mid, user).unwrap().is_empty());
    }

    #[test]
    fn remove_takes_newest_match_only() {
        let (db, mid, user) = setup();
        let (first, _) = db.add_reaction_capped(Uuid::new_v4(), mid, user, "👍", Utc::now(), 2).unwrap();
        let (second, _) = db.add_reaction_capped(Uuid::new_v4(), mid, user, "👍", Utc::now(), 2).unwrap();

        assert_eq!(db.remove_reaction(mid, user, "👍").unwrap(), Some(second.id));
        assert_eq!(db.reactions_for_pair(mid, user).unwrap(), vec![first]);
        assert_eq!(db.remove_reaction(mid, user, "🎉").unwrap(), None);
    }

    #[test]
    fn batch_fetch_covers_all_messages() {
        let (db, mid, user) = setup();
        db.add_reaction_capped(Uuid::new_v4(), mid, user, "👍", Utc::now(), 2).unwrap();
        assert!(db.get_reactions_for_messages(&[]).unwrap().is_empty());
        assert_eq!(db.get_reactions_for_messages(&[mid, Uuid::new_v4()]).unwrap().len(), 1);
    }
}
