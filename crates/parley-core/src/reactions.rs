use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parley_db::Database;
use parley_types::api::ReactionGroup;
use parley_types::models::Reaction;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::MessagingConfig;
use crate::conversations::load_participating;
use crate::error::{MessagingError, Result};
use crate::storage::blocking;

/// Per-user emoji reactions, at most `reaction_cap` live per (message, user).
/// Going over the cap evicts the oldest reaction instead of failing.
///
/// Eviction and insert share one storage transaction. A backend without
/// serialized writers could still let two concurrent adds by the same user
/// leave the pair above the cap; reads trim the overflow with
/// [`compact_reactions`] and [`ReactionEngine::reconcile`] deletes it.
#[derive(Clone)]
pub struct ReactionEngine {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: MessagingConfig,
}

impl ReactionEngine {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, config: MessagingConfig) -> Self {
        Self { db, clock, config }
    }

    /// Add a reaction. The same emoji may be added more than once; only the
    /// count per user is capped. Blocks do not gate reactions.
    pub async fn add_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<Reaction> {
        let emoji = emoji.trim().to_string();
        if emoji.is_empty() || emoji.len() > self.config.max_emoji_bytes {
            return Err(MessagingError::InvalidInput(format!(
                "emoji must be 1 to {} bytes",
                self.config.max_emoji_bytes
            )));
        }

        if self.config.reaction_cap == 0 {
            return Err(MessagingError::InvalidInput("reactions are disabled".into()));
        }

        let message = blocking(&self.db, move |db| db.get_message(message_id))
            .await?
            .ok_or(MessagingError::not_found("Message", message_id))?;
        load_participating(&self.db, message.conversation_id, user_id).await?;
        if message.is_deleted() {
            return Err(MessagingError::MessageDeleted);
        }

        let now = self.clock.now();
        let cap = self.config.reaction_cap;
        let (reaction, evicted) = blocking(&self.db, move |db| {
            db.add_reaction_capped(Uuid::new_v4(), message_id, user_id, &emoji, now, cap)
        })
        .await?;

        for old in &evicted {
            debug!(
                "Reaction {} ({}) by {} on {} evicted",
                old.id, old.emoji, user_id, message_id
            );
        }
        Ok(reaction)
    }

    /// Remove one matching reaction; no-op when there is none.
    pub async fn remove_reaction(&self, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<()> {
        let emoji = emoji.trim().to_string();
        let removed = blocking(&self.db, move |db| db.remove_reaction(message_id, user_id, &emoji)).await?;
        if let Some(id) = removed {
            debug!("Reaction {} by {} on {} removed", id, user_id, message_id);
        }
        Ok(())
    }

    /// Live reactions on a message, oldest first, as seen by a participant.
    pub async fn list_reactions(&self, message_id: Uuid, actor: Uuid) -> Result<Vec<Reaction>> {
        let message = blocking(&self.db, move |db| db.get_message(message_id))
            .await?
            .ok_or(MessagingError::not_found("Message", message_id))?;
        load_participating(&self.db, message.conversation_id, actor).await?;

        let mut reactions = blocking(&self.db, move |db| db.reactions_for_message(message_id)).await?;
        trim_view(&mut reactions, self.config.reaction_cap);
        Ok(reactions)
    }

    /// Grouped reactions for a page of messages, keyed by message id.
    pub async fn groups_for(&self, message_ids: Vec<Uuid>) -> Result<HashMap<Uuid, Vec<ReactionGroup>>> {
        let mut reactions = blocking(&self.db, move |db| db.get_reactions_for_messages(&message_ids)).await?;
        trim_view(&mut reactions, self.config.reaction_cap);

        let mut by_message: HashMap<Uuid, Vec<Reaction>> = HashMap::new();
        for r in reactions {
            by_message.entry(r.message_id).or_default().push(r);
        }
        Ok(by_message
            .into_iter()
            .map(|(id, list)| (id, group_reactions(&list)))
            .collect())
    }

    /// Delete any reactions on `message_id` above the per-user cap, oldest
    /// first. Returns how many rows were removed.
    pub async fn reconcile(&self, message_id: Uuid) -> Result<usize> {
        let reactions = blocking(&self.db, move |db| db.reactions_for_message(message_id)).await?;

        let mut pairs = by_pair(reactions);
        let evicted: Vec<Uuid> = compact_reactions(&mut pairs, self.config.reaction_cap)
            .into_iter()
            .map(|r| r.id)
            .collect();
        if evicted.is_empty() {
            return Ok(0);
        }

        let removed = blocking(&self.db, move |db| db.delete_reactions(&evicted)).await?;
        info!("Reconciled {} overflowing reactions on {}", removed, message_id);
        Ok(removed)
    }
}

/// Reactions keyed by (message_id, user_id), in the order given.
pub fn by_pair(reactions: Vec<Reaction>) -> HashMap<(Uuid, Uuid), Vec<Reaction>> {
    let mut pairs: HashMap<(Uuid, Uuid), Vec<Reaction>> = HashMap::new();
    for r in reactions {
        pairs.entry((r.message_id, r.user_id)).or_default().push(r);
    }
    pairs
}

/// Trim every (message, user) list to its newest `cap` reactions, returning
/// the removed ones. Lists are ordered by `created_at`; ties keep their
/// existing order.
pub fn compact_reactions(pairs: &mut HashMap<(Uuid, Uuid), Vec<Reaction>>, cap: usize) -> Vec<Reaction> {
    let mut evicted = Vec::new();
    for list in pairs.values_mut() {
        list.sort_by_key(|r| r.created_at);
        if list.len() > cap {
            let overflow = list.len() - cap;
            evicted.extend(list.drain(..overflow));
        }
    }
    evicted
}

/// Drop over-cap reactions from a read result without touching storage.
fn trim_view(reactions: &mut Vec<Reaction>, cap: usize) {
    let mut pairs = by_pair(reactions.clone());
    let evicted: HashSet<Uuid> = compact_reactions(&mut pairs, cap)
        .into_iter()
        .map(|r| r.id)
        .collect();
    if !evicted.is_empty() {
        debug!("Hiding {} over-cap reactions pending reconcile", evicted.len());
        reactions.retain(|r| !evicted.contains(&r.id));
    }
}

/// Group reactions by emoji, in order of each emoji's first appearance.
pub fn group_reactions(reactions: &[Reaction]) -> Vec<ReactionGroup> {
    let mut groups: Vec<ReactionGroup> = Vec::new();
    for r in reactions {
        match groups.iter_mut().find(|g| g.emoji == r.emoji) {
            Some(group) => {
                group.count += 1;
                group.user_ids.push(r.user_id);
            }
            None => groups.push(ReactionGroup {
                emoji: r.emoji.clone(),
                count: 1,
                user_ids: vec![r.user_id],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};

    fn reaction(message_id: Uuid, user_id: Uuid, emoji: &str, at: DateTime<Utc>) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            emoji: emoji.to_string(),
            created_at: at,
        }
    }

    #[test]
    fn compaction_keeps_newest_per_pair() {
        let mid = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let t0 = Utc::now();

        let mut pairs = by_pair(vec![
            reaction(mid, alice, "c", t0 + Duration::seconds(2)),
            reaction(mid, alice, "a", t0),
            reaction(mid, alice, "b", t0 + Duration::seconds(1)),
            reaction(mid, bob, "x", t0),
        ]);

        let evicted = compact_reactions(&mut pairs, 2);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].emoji, "a");

        let kept: Vec<&str> = pairs[&(mid, alice)].iter().map(|r| r.emoji.as_str()).collect();
        assert_eq!(kept, vec!["b", "c"]);
        assert_eq!(pairs[&(mid, bob)].len(), 1);
    }

    #[test]
    fn compaction_is_a_no_op_under_cap() {
        let mid = Uuid::new_v4();
        let mut pairs = by_pair(vec![reaction(mid, Uuid::new_v4(), "👍", Utc::now())]);
        assert!(compact_reactions(&mut pairs, 2).is_empty());
    }

    #[tokio::test]
    async fn zero_cap_refuses_reactions() {
        use crate::clock::SystemClock;

        let engine = ReactionEngine::new(
            Arc::new(parley_db::Database::open_in_memory().unwrap()),
            Arc::new(SystemClock),
            MessagingConfig {
                reaction_cap: 0,
                ..MessagingConfig::default()
            },
        );
        let result = engine.add_reaction(Uuid::new_v4(), Uuid::new_v4(), "👍").await;
        assert!(matches!(result, Err(MessagingError::InvalidInput(_))));
    }

    #[test]
    fn groups_follow_first_appearance() {
        let mid = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let now = Utc::now();
        let groups = group_reactions(&[
            reaction(mid, alice, "👍", now),
            reaction(mid, bob, "❤️", now),
            reaction(mid, bob, "👍", now),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].emoji, "👍");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].user_ids, vec![alice, bob]);
        assert_eq!(groups[1].emoji, "❤️");
    }
}
