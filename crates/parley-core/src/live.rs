use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use parley_types::models::Message;
use tracing::{debug, warn};
use uuid::Uuid;

type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Pushes newly inserted messages to everyone currently viewing the
/// conversation. Only inserts are published; edits and deletes are picked up
/// when the viewer re-lists.
#[derive(Clone, Default)]
pub struct LiveUpdateChannel {
    inner: Arc<LiveInner>,
}

#[derive(Default)]
struct LiveInner {
    next_id: AtomicU64,
    /// conversation_id -> (subscription id -> callback)
    subscribers: RwLock<HashMap<Uuid, HashMap<u64, Callback>>>,
}

impl LiveInner {
    fn remove(&self, conversation_id: Uuid, id: u64) {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(conversation) = subs.get_mut(&conversation_id) {
            conversation.remove(&id);
            if conversation.is_empty() {
                subs.remove(&conversation_id);
            }
        }
    }
}

impl LiveUpdateChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `on_new_message` for inserts into `conversation_id`. The
    /// callback stays registered until the returned handle is unsubscribed
    /// or dropped.
    pub fn subscribe<F>(&self, conversation_id: Uuid, on_new_message: F) -> Subscription
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(conversation_id)
            .or_default()
            .insert(id, Arc::new(on_new_message));

        debug!("Live subscription {} on conversation {}", id, conversation_id);
        Subscription {
            channel: Arc::downgrade(&self.inner),
            conversation_id,
            id,
        }
    }

    /// Invoke every callback subscribed to the message's conversation.
    /// A panicking callback is logged and skipped; the others still run.
    /// Returns how many completed.
    pub fn publish(&self, message: &Message) -> usize {
        // Callbacks run outside the lock so they may subscribe or unsubscribe.
        let callbacks: Vec<Callback> = {
            let subs = self.inner.subscribers.read().unwrap_or_else(|e| e.into_inner());
            match subs.get(&message.conversation_id) {
                Some(conversation) => conversation.values().cloned().collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for callback in &callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    "Live subscriber panicked on message {} in {}",
                    message.id, message.conversation_id
                ),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&conversation_id)
            .map_or(0, HashMap::len)
    }
}

/// Handle for one live subscription. Dropping it unsubscribes.
pub struct Subscription {
    channel: Weak<LiveInner>,
    conversation_id: Uuid,
    id: u64,
}

impl Subscription {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    /// Deregister exactly this subscription.
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.remove(self.conversation_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parley_types::models::MediaType;
    use std::sync::atomic::AtomicUsize;

    fn message(conversation_id: Uuid) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: Uuid::new_v4(),
            content: "hi".into(),
            media_urls: vec![],
            media_type: MediaType::None,
            created_at: Utc::now(),
            edited_at: None,
            is_edited: false,
            deleted_at: None,
            deleted_by: None,
            is_read: false,
        }
    }

    fn counter(channel: &LiveUpdateChannel, cid: Uuid) -> (Subscription, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let sub = channel.subscribe(cid, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (sub, hits)
    }

    #[test]
    fn subscribers_are_independent() {
        let channel = LiveUpdateChannel::new();
        let cid = Uuid::new_v4();
        let (first, first_hits) = counter(&channel, cid);
        let (_second, second_hits) = counter(&channel, cid);

        assert_eq!(channel.publish(&message(cid)), 2);
        first.unsubscribe();
        assert_eq!(channel.subscriber_count(cid), 1);
        assert_eq!(channel.publish(&message(cid)), 1);

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_starve_others() {
        let channel = LiveUpdateChannel::new();
        let cid = Uuid::new_v4();
        let (_before, before_hits) = counter(&channel, cid);
        let _broken = channel.subscribe(cid, |_| panic!("viewer crashed"));
        let (_after, after_hits) = counter(&channel, cid);

        assert_eq!(channel.publish(&message(cid)), 2);
        assert_eq!(before_hits.load(Ordering::SeqCst), 1);
        assert_eq!(after_hits.load(Ordering::SeqCst), 1);
        // The broken subscriber stays registered and keeps being isolated.
        assert_eq!(channel.publish(&message(cid)), 2);
        assert_eq!(channel.subscriber_count(cid), 3);
    }

    #[test]
    fn publish_is_scoped_to_conversation() {
        let channel = LiveUpdateChannel::new();
        let watched = Uuid::new_v4();
        let (_sub, hits) = counter(&channel, watched);

        assert_eq!(channel.publish(&message(Uuid::new_v4())), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropping_handle_unsubscribes() {
        let channel = LiveUpdateChannel::new();
        let cid = Uuid::new_v4();
        {
            let (_sub, _) = counter(&channel, cid);
            assert_eq!(channel.subscriber_count(cid), 1);
        }
        assert_eq!(channel.subscriber_count(cid), 0);
    }
}
