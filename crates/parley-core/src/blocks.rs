use std::sync::Arc;

use parley_db::Database;
use parley_types::models::{BlockEdge, BlockStatus};
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{MessagingError, Result};
use crate::storage::blocking;

/// Directional block edges between users. Blocks only gate future sends;
/// existing conversations and messages are left alone.
#[derive(Clone)]
pub struct BlockRegistry {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl BlockRegistry {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Block edges between `viewer` and `other`, in both directions.
    pub async fn is_blocked(&self, viewer: Uuid, other: Uuid) -> Result<BlockStatus> {
        blocking(&self.db, move |db| db.block_status(viewer, other)).await
    }

    /// Idempotent: blocking twice is not an error.
    pub async fn block(&self, blocker: Uuid, blocked: Uuid) -> Result<()> {
        if blocker == blocked {
            return Err(MessagingError::InvalidInput("cannot block yourself".into()));
        }
        let now = self.clock.now();
        let inserted = blocking(&self.db, move |db| db.insert_block(blocker, blocked, now)).await?;
        if inserted {
            info!("{} blocked {}", blocker, blocked);
        }
        Ok(())
    }

    /// Idempotent: unblocking without an edge is not an error.
    pub async fn unblock(&self, blocker: Uuid, blocked: Uuid) -> Result<()> {
        let removed = blocking(&self.db, move |db| db.delete_block(blocker, blocked)).await?;
        if removed {
            info!("{} unblocked {}", blocker, blocked);
        }
        Ok(())
    }

    pub async fn list_blocked(&self, blocker: Uuid) -> Result<Vec<BlockEdge>> {
        blocking(&self.db, move |db| db.list_blocks_by(blocker)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn registry() -> BlockRegistry {
        BlockRegistry::new(Arc::new(Database::open_in_memory().unwrap()), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn block_and_unblock_are_idempotent() {
        let blocks = registry();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        blocks.block(a, b).await.unwrap();
        blocks.block(a, b).await.unwrap();
        assert_eq!(
            blocks.is_blocked(b, a).await.unwrap(),
            BlockStatus { blocked_by_me: false, blocked_me: true }
        );
        assert_eq!(blocks.list_blocked(a).await.unwrap().len(), 1);

        blocks.unblock(a, b).await.unwrap();
        blocks.unblock(a, b).await.unwrap();
        assert!(!blocks.is_blocked(a, b).await.unwrap().any());
    }

    #[tokio::test]
    async fn self_block_is_rejected() {
        let blocks = registry();
        let a = Uuid::new_v4();
        assert!(matches!(blocks.block(a, a).await, Err(MessagingError::InvalidInput(_))));
    }
}
