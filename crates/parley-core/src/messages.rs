use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_db::Database;
use parley_db::messages::NewMessage;
use parley_types::models::{MediaType, Message};
use tracing::{debug, info};
use uuid::Uuid;

use crate::blocks::BlockRegistry;
use crate::clock::Clock;
use crate::config::MessagingConfig;
use crate::conversations::load_participating;
use crate::error::{MessagingError, Result};
use crate::live::LiveUpdateChannel;
use crate::notify::NotificationDispatcher;
use crate::storage::blocking;

const DEFAULT_PAGE: u32 = 50;
const MAX_PAGE: u32 = 200;

/// Paging for [`MessageStore::list_messages`].
#[derive(Debug, Clone, Copy)]
pub struct ListMessages {
    pub limit: u32,
    /// Only messages created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
}

impl Default for ListMessages {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE,
            before: None,
        }
    }
}

/// Owns the message lifecycle: `Created -> Edited* -> Deleted`, where
/// `Deleted` is terminal.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: MessagingConfig,
    blocks: BlockRegistry,
    live: LiveUpdateChannel,
    notifier: NotificationDispatcher,
}

impl MessageStore {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        config: MessagingConfig,
        blocks: BlockRegistry,
        live: LiveUpdateChannel,
        notifier: NotificationDispatcher,
    ) -> Self {
        Self {
            db,
            clock,
            config,
            blocks,
            live,
            notifier,
        }
    }

    /// Send a message. All checks run before the write; once the row is
    /// stored, live subscribers are signalled and the other participants are
    /// notified, and neither can fail the send.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
        media_urls: Vec<String>,
        media_type: Option<MediaType>,
    ) -> Result<Message> {
        let content = content.into();
        if content.trim().is_empty() && media_urls.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }
        self.check_content(&content)?;
        if media_urls.len() > self.config.max_media_urls {
            return Err(MessagingError::InvalidInput(format!(
                "at most {} media attachments per message",
                self.config.max_media_urls
            )));
        }
        if media_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(MessagingError::InvalidInput("media URL cannot be empty".into()));
        }

        let conversation = load_participating(&self.db, conversation_id, sender_id).await?;
        let recipients: Vec<Uuid> = conversation.others(sender_id).collect();

        for &other in &recipients {
            if self.blocks.is_blocked(sender_id, other).await?.any() {
                debug!("Send from {} to {} refused: blocked", sender_id, other);
                return Err(MessagingError::Blocked);
            }
        }

        let new = NewMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            media_type: normalize_media_type(&media_urls, media_type),
            media_urls,
        };
        let now = self.clock.now();
        let message = blocking(&self.db, move |db| db.insert_message(&new, now)).await?;

        info!("Message {} sent in {} by {}", message.id, conversation_id, sender_id);

        self.live.publish(&message);
        self.notifier.notify_new_message(&message, recipients);

        Ok(message)
    }

    /// Replace the content of one's own message within the edit window.
    pub async fn edit_message(&self, message_id: Uuid, actor: Uuid, new_content: impl Into<String>) -> Result<Message> {
        let new_content = new_content.into();
        let message = self.load(message_id).await?;

        if message.sender_id != actor {
            return Err(MessagingError::NotOwner);
        }
        if message.is_deleted() {
            return Err(MessagingError::MessageDeleted);
        }

        let now = self.clock.now();
        let window = Duration::seconds(self.config.edit_window_secs);
        if now - message.created_at > window {
            return Err(MessagingError::EditWindowExpired {
                window_secs: self.config.edit_window_secs,
            });
        }

        if new_content.trim().is_empty() && message.media_urls.is_empty() {
            return Err(MessagingError::EmptyMessage);
        }
        self.check_content(&new_content)?;

        let content = new_content.clone();
        let updated = blocking(&self.db, move |db| db.update_message_content(message_id, &content, now)).await?;
        if !updated {
            // Deleted between the read and the write.
            return Err(MessagingError::MessageDeleted);
        }

        debug!("Message {} edited by {}", message_id, actor);
        Ok(Message {
            content: new_content,
            is_edited: true,
            edited_at: Some(parley_db::models::truncate_ms(now)),
            ..message
        })
    }

    /// Soft-delete one's own message. Deleting twice is a no-op.
    pub async fn delete_message(&self, message_id: Uuid, actor: Uuid) -> Result<()> {
        let message = self.load(message_id).await?;

        if message.sender_id != actor {
            return Err(MessagingError::NotOwner);
        }
        if message.is_deleted() {
            return Ok(());
        }

        let now = self.clock.now();
        if blocking(&self.db, move |db| db.soft_delete_message(message_id, actor, now)).await? {
            info!("Message {} deleted by {}", message_id, actor);
        }
        Ok(())
    }

    /// Visible messages of a conversation, oldest first.
    pub async fn list_messages(&self, conversation_id: Uuid, actor: Uuid, query: ListMessages) -> Result<Vec<Message>> {
        load_participating(&self.db, conversation_id, actor).await?;

        let limit = query.limit.clamp(1, MAX_PAGE);
        let before = query.before;
        blocking(&self.db, move |db| db.list_messages(conversation_id, limit, before)).await
    }

    /// A single visible message; soft-deleted ones read as not found.
    pub async fn get_message(&self, message_id: Uuid, actor: Uuid) -> Result<Message> {
        let message = self.load(message_id).await?;
        load_participating(&self.db, message.conversation_id, actor).await?;

        if message.is_deleted() {
            return Err(MessagingError::not_found("Message", message_id));
        }
        Ok(message)
    }

    /// Mark every message the actor received in this conversation as read.
    pub async fn mark_read(&self, conversation_id: Uuid, actor: Uuid) -> Result<usize> {
        load_participating(&self.db, conversation_id, actor).await?;
        blocking(&self.db, move |db| db.mark_read(conversation_id, actor)).await
    }

    async fn load(&self, message_id: Uuid) -> Result<Message> {
        blocking(&self.db, move |db| db.get_message(message_id))
            .await?
            .ok_or(MessagingError::not_found("Message", message_id))
    }

    fn check_content(&self, content: &str) -> Result<()> {
        if content.chars().count() > self.config.max_content_chars {
            return Err(MessagingError::InvalidInput(format!(
                "message longer than {} characters",
                self.config.max_content_chars
            )));
        }
        Ok(())
    }
}

/// No media means `none`; media without an explicit type defaults to `image`.
fn normalize_media_type(media_urls: &[String], requested: Option<MediaType>) -> MediaType {
    if media_urls.is_empty() {
        return MediaType::None;
    }
    match requested {
        None | Some(MediaType::None) => MediaType::Image,
        Some(kind) => kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::identity::DbIdentity;
    use crate::notify::LogSink;

    struct Fixture {
        store: MessageStore,
        clock: Arc<ManualClock>,
        live: LiveUpdateChannel,
        db: Arc<Database>,
        conversation_id: Uuid,
        alice: Uuid,
        bob: Uuid,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let identity = Arc::new(DbIdentity::new(db.clone()));
        let blocks = BlockRegistry::new(db.clone(), clock.clone());
        let live = LiveUpdateChannel::new();
        let notifier = NotificationDispatcher::new(Arc::new(LogSink), identity, 80);
        let store = MessageStore::new(
            db.clone(),
            clock.clone(),
            MessagingConfig::default(),
            blocks,
            live.clone(),
            notifier,
        );

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let (conversation_id, _) = db
            .get_or_create_conversation(Uuid::new_v4(), alice, bob, clock.now())
            .unwrap();

        Fixture {
            store,
            clock,
            live,
            db,
            conversation_id,
            alice,
            bob,
        }
    }

    #[test]
    fn media_type_normalization() {
        let urls = vec!["https://cdn.example/v.mp4".to_string()];
        assert_eq!(normalize_media_type(&[], Some(MediaType::Video)), MediaType::None);
        assert_eq!(normalize_media_type(&urls, None), MediaType::Image);
        assert_eq!(normalize_media_type(&urls, Some(MediaType::Video)), MediaType::Video);
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_write() {
        let f = fixture();
        let result = f.store.send_message(f.conversation_id, f.alice, "   ", vec![], None).await;
        assert!(matches!(result, Err(MessagingError::EmptyMessage)));
        assert!(f.db.list_messages(f.conversation_id, 50, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn media_only_message_is_accepted() {
        let f = fixture();
        let msg = f
            .store
            .send_message(f.conversation_id, f.alice, "", vec!["https://cdn.example/a.gif".into()], Some(MediaType::Gif))
            .await
            .unwrap();
        assert_eq!(msg.media_type, MediaType::Gif);
        assert!(msg.content.is_empty());
    }

    #[tokio::test]
    async fn outsiders_cannot_send_or_list() {
        let f = fixture();
        let stranger = Uuid::new_v4();
        assert!(matches!(
            f.store.send_message(f.conversation_id, stranger, "hi", vec![], None).await,
            Err(MessagingError::NotParticipant)
        ));
        assert!(matches!(
            f.store.list_messages(f.conversation_id, stranger, ListMessages::default()).await,
            Err(MessagingError::NotParticipant)
        ));
        assert!(matches!(
            f.store.send_message(Uuid::new_v4(), f.alice, "hi", vec![], None).await,
            Err(MessagingError::NotFound { entity: "Conversation", .. })
        ));
    }

    #[tokio::test]
    async fn overlong_content_is_rejected() {
        let f = fixture();
        let long = "x".repeat(MessagingConfig::default().max_content_chars + 1);
        assert!(matches!(
            f.store.send_message(f.conversation_id, f.alice, long, vec![], None).await,
            Err(MessagingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn only_sender_may_edit_or_delete() {
        let f = fixture();
        let msg = f.store.send_message(f.conversation_id, f.alice, "hi", vec![], None).await.unwrap();

        assert!(matches!(
            f.store.edit_message(msg.id, f.bob, "hijacked").await,
            Err(MessagingError::NotOwner)
        ));
        assert!(matches!(
            f.store.delete_message(msg.id, f.bob).await,
            Err(MessagingError::NotOwner)
        ));
        assert_eq!(f.db.get_message(msg.id).unwrap().unwrap().content, "hi");
    }

    #[tokio::test]
    async fn edit_after_delete_is_refused() {
        let f = fixture();
        let msg = f.store.send_message(f.conversation_id, f.alice, "hi", vec![], None).await.unwrap();
        f.store.delete_message(msg.id, f.alice).await.unwrap();
        f.store.delete_message(msg.id, f.alice).await.unwrap();

        assert!(matches!(
            f.store.edit_message(msg.id, f.alice, "again").await,
            Err(MessagingError::MessageDeleted)
        ));
        assert!(matches!(
            f.store.get_message(msg.id, f.bob).await,
            Err(MessagingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn edit_sets_flags() {
        let f = fixture();
        let msg = f.store.send_message(f.conversation_id, f.alice, "helo", vec![], None).await.unwrap();
        f.clock.advance(Duration::seconds(5));

        let edited = f.store.edit_message(msg.id, f.alice, "hello").await.unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.edited_at, Some(parley_db::models::truncate_ms(f.clock.now())));

        let stored = f.store.get_message(msg.id, f.bob).await.unwrap();
        assert_eq!(stored, edited);
    }

    #[tokio::test]
    async fn send_publishes_to_live_subscribers() {
        let f = fixture();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = f.live.subscribe(f.conversation_id, move |m: &Message| {
            let _ = tx.send(m.id);
        });

        let msg = f.store.send_message(f.conversation_id, f.alice, "ping", vec![], None).await.unwrap();
        assert_eq!(rx.recv().await, Some(msg.id));

        // Edits and deletes are not pushed.
        f.store.edit_message(msg.id, f.alice, "pong").await.unwrap();
        f.store.delete_message(msg.id, f.alice).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn mark_read_only_touches_received_messages() {
        let f = fixture();
        f.store.send_message(f.conversation_id, f.alice, "one", vec![], None).await.unwrap();
        f.store.send_message(f.conversation_id, f.bob, "two", vec![], None).await.unwrap();

        assert_eq!(f.store.mark_read(f.conversation_id, f.bob).await.unwrap(), 1);
        let listed = f
            .store
            .list_messages(f.conversation_id, f.alice, ListMessages::default())
            .await
            .unwrap();
        assert!(listed[0].is_read);
        assert!(!listed[1].is_read);
    }
}
