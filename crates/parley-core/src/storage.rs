use std::sync::Arc;

use parley_db::Database;
use tracing::error;

use crate::error::{MessagingError, Result};

/// Run a blocking storage call off the async runtime and map its failure to
/// `BackendUnavailable`. No retry is attempted.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            MessagingError::BackendUnavailable(e.to_string())
        })?
        .map_err(MessagingError::backend)
}
