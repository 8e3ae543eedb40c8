//! # parley-core
//!
//! The direct-messaging core: two-party conversation discovery, the message
//! lifecycle (send, edit within a window, soft delete, read state), capped
//! per-user reactions, bidirectional block enforcement, and fan-out of new
//! messages to live subscribers and to a notification sink.
//!
//! Every component takes its collaborators (storage handle, identity
//! provider, clock, sink) through its constructor. [`Messaging`] wires a full
//! set together.

pub mod blocks;
pub mod clock;
pub mod config;
pub mod conversations;
pub mod error;
pub mod identity;
pub mod live;
pub mod messages;
pub mod notify;
pub mod reactions;

mod storage;

use std::sync::Arc;

use parley_db::Database;

pub use blocks::BlockRegistry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MessagingConfig;
pub use conversations::ConversationDirectory;
pub use error::{MessagingError, Result};
pub use identity::{DbIdentity, IdentityProvider};
pub use live::{LiveUpdateChannel, Subscription};
pub use messages::{ListMessages, MessageStore};
pub use notify::{DeliveryError, LogSink, NotificationDispatcher, NotificationSink, WebhookSink};
pub use reactions::ReactionEngine;

/// A fully wired set of messaging components sharing one storage handle.
#[derive(Clone)]
pub struct Messaging {
    pub blocks: BlockRegistry,
    pub conversations: ConversationDirectory,
    pub messages: MessageStore,
    pub reactions: ReactionEngine,
    pub live: LiveUpdateChannel,
    pub notifier: NotificationDispatcher,
}

impl Messaging {
    pub fn new(
        db: Arc<Database>,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: MessagingConfig,
    ) -> Self {
        let blocks = BlockRegistry::new(db.clone(), clock.clone());
        let conversations = ConversationDirectory::new(db.clone(), identity.clone(), clock.clone());
        let live = LiveUpdateChannel::new();
        let notifier = NotificationDispatcher::new(sink, identity, config.preview_chars);
        let messages = MessageStore::new(
            db.clone(),
            clock.clone(),
            config.clone(),
            blocks.clone(),
            live.clone(),
            notifier.clone(),
        );
        let reactions = ReactionEngine::new(db, clock, config);

        Self {
            blocks,
            conversations,
            messages,
            reactions,
            live,
            notifier,
        }
    }
}
