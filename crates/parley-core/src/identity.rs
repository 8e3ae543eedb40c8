use std::sync::Arc;

use async_trait::async_trait;
use parley_db::Database;
use parley_types::models::Profile;
use uuid::Uuid;

use crate::error::{MessagingError, Result};
use crate::storage::blocking;

/// Resolves user records. Who the current actor is gets decided by the
/// caller (the API resolves it from the bearer token) and is passed into
/// each operation explicitly.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Profile of `user_id`, or `NotFound`.
    async fn profile(&self, user_id: Uuid) -> Result<Profile>;
}

/// Identity provider backed by the local `users` mirror table.
pub struct DbIdentity {
    db: Arc<Database>,
}

impl DbIdentity {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record (or refresh) a profile handed to us by the platform.
    pub async fn remember(&self, profile: Profile) -> Result<()> {
        blocking(&self.db, move |db| db.upsert_user(&profile, chrono::Utc::now())).await
    }
}

#[async_trait]
impl IdentityProvider for DbIdentity {
    async fn profile(&self, user_id: Uuid) -> Result<Profile> {
        blocking(&self.db, move |db| db.get_user(user_id))
            .await?
            .ok_or(MessagingError::not_found("User", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remembered_profiles_resolve() {
        let identity = DbIdentity::new(Arc::new(Database::open_in_memory().unwrap()));
        let profile = Profile {
            id: Uuid::new_v4(),
            username: "bob".into(),
            display_name: "Bob".into(),
            avatar_url: None,
        };
        identity.remember(profile.clone()).await.unwrap();
        assert_eq!(identity.profile(profile.id).await.unwrap(), profile);

        let missing = identity.profile(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(MessagingError::NotFound { entity: "User", .. })));
    }
}
