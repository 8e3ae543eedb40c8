//! REST handlers for the messaging core. Every route runs behind
//! [`middleware::require_auth`]; the decoded token claims are the acting user.

pub mod blocks;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

pub use state::{AppState, AppStateInner};

/// All authenticated messaging routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/conversations",
            post(conversations::create_conversation).get(conversations::list_conversations),
        )
        .route(
            "/conversations/{conversation_id}",
            get(conversations::get_conversation).delete(conversations::delete_conversation),
        )
        .route(
            "/conversations/{conversation_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route("/conversations/{conversation_id}/read", post(messages::mark_read))
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route(
            "/messages/{message_id}/reactions",
            get(reactions::list_reactions).post(reactions::add_reaction),
        )
        .route(
            "/messages/{message_id}/reactions/{emoji}",
            delete(reactions::remove_reaction),
        )
        .route("/blocks", get(blocks::list_blocked))
        .route(
            "/blocks/{user_id}",
            get(blocks::block_status).put(blocks::block).delete(blocks::unblock),
        )
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state)
}
