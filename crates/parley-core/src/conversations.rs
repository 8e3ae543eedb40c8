use std::sync::Arc;

use parley_db::Database;
use parley_db::conversations::InboxEntry;
use parley_types::models::{Conversation, ConversationSummary, Profile};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MessagingError, Result};
use crate::identity::IdentityProvider;
use crate::storage::blocking;

/// Creates, deduplicates, lists and deletes two-party conversations.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: Arc<Database>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
}

impl ConversationDirectory {
    pub fn new(db: Arc<Database>, identity: Arc<dyn IdentityProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { db, identity, clock }
    }

    /// Id of the conversation between `actor` and `other`, created on first use.
    /// Repeated calls, in either argument order, return the same id.
    pub async fn get_or_create_conversation(&self, actor: Uuid, other: Uuid) -> Result<Uuid> {
        if actor == other {
            return Err(MessagingError::SelfConversation);
        }

        if let Some(existing) = blocking(&self.db, move |db| db.find_conversation_between(actor, other)).await? {
            return Ok(existing);
        }

        let now = self.clock.now();
        let (id, created) = blocking(&self.db, move |db| {
            db.get_or_create_conversation(Uuid::new_v4(), actor, other, now)
        })
        .await?;

        if created {
            info!("Conversation {} created between {} and {}", id, actor, other);
        }
        Ok(id)
    }

    /// The actor's conversations, most recently active first, each with the
    /// other participant's profile and the latest visible message.
    pub async fn list_conversations(&self, actor: Uuid) -> Result<Vec<ConversationSummary>> {
        let entries = blocking(&self.db, move |db| db.list_inbox(actor)).await?;

        let mut summaries = Vec::with_capacity(entries.len());
        for entry in entries {
            summaries.push(self.summarize(entry).await?);
        }
        Ok(summaries)
    }

    pub async fn get_conversation(&self, conversation_id: Uuid, actor: Uuid) -> Result<ConversationSummary> {
        // Participation is checked first so outsiders learn nothing beyond existence.
        load_participating(&self.db, conversation_id, actor).await?;

        let entries = blocking(&self.db, move |db| db.list_inbox(actor)).await?;
        let entry = entries
            .into_iter()
            .find(|e| e.conversation.id == conversation_id)
            .ok_or(MessagingError::not_found("Conversation", conversation_id))?;
        self.summarize(entry).await
    }

    /// Delete the conversation with all of its messages and their reactions.
    /// Any participant may do this.
    pub async fn delete_conversation(&self, conversation_id: Uuid, actor: Uuid) -> Result<()> {
        load_participating(&self.db, conversation_id, actor).await?;

        let removed = blocking(&self.db, move |db| db.delete_conversation_cascade(conversation_id)).await?;
        if removed {
            info!("Conversation {} deleted by {}", conversation_id, actor);
        }
        Ok(())
    }

    /// Fails with `NotFound` or `NotParticipant` unless `actor` is in the
    /// conversation.
    pub async fn ensure_participant(&self, conversation_id: Uuid, actor: Uuid) -> Result<()> {
        load_participating(&self.db, conversation_id, actor).await.map(|_| ())
    }

    async fn summarize(&self, entry: InboxEntry) -> Result<ConversationSummary> {
        let other_participant = match self.identity.profile(entry.other_id).await {
            Ok(profile) => profile,
            Err(MessagingError::NotFound { .. }) => {
                warn!("No profile for user {}, using placeholder", entry.other_id);
                placeholder_profile(entry.other_id)
            }
            Err(e) => return Err(e),
        };

        Ok(ConversationSummary {
            id: entry.conversation.id,
            created_at: entry.conversation.created_at,
            updated_at: entry.conversation.updated_at,
            other_participant,
            last_message: entry.last_message,
            unread_count: entry.unread_count,
        })
    }
}

fn placeholder_profile(id: Uuid) -> Profile {
    Profile {
        id,
        username: "unknown".to_string(),
        display_name: "Unknown user".to_string(),
        avatar_url: None,
    }
}

/// Load a conversation, failing with `NotFound` or `NotParticipant`.
pub(crate) async fn load_participating(
    db: &Arc<Database>,
    conversation_id: Uuid,
    actor: Uuid,
) -> Result<Conversation> {
    let conversation = blocking(db, move |db| db.get_conversation(conversation_id))
        .await?
        .ok_or(MessagingError::not_found("Conversation", conversation_id))?;

    if !conversation.has_participant(actor) {
        return Err(MessagingError::NotParticipant);
    }
    Ok(conversation)
}
