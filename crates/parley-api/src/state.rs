use std::sync::Arc;

use parley_core::{DbIdentity, Messaging};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub messaging: Messaging,
    /// Local profile mirror, refreshed from token claims on every request.
    pub identity: Arc<DbIdentity>,
    pub jwt_secret: String,
}
