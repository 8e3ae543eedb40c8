use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use parley_core::ListMessages;
use parley_types::api::{Claims, EditMessageRequest, MessageResponse, SendMessageRequest};
use parley_types::models::Message;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    /// Cursor: `created_at` of the oldest message from the previous page.
    pub before: Option<DateTime<Utc>>,
}

impl From<MessageQuery> for ListMessages {
    fn from(q: MessageQuery) -> Self {
        let defaults = ListMessages::default();
        ListMessages {
            limit: q.limit.unwrap_or(defaults.limit),
            before: q.before,
        }
    }
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = state
        .messaging
        .messages
        .list_messages(conversation_id, claims.sub, query.into())
        .await?;
    Ok(Json(with_reactions(&state, messages).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state
        .messaging
        .messages
        .send_message(conversation_id, claims.sub, req.content, req.media_urls, req.media_type)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message,
            reactions: Vec::new(),
        }),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let marked = state.messaging.messages.mark_read(conversation_id, claims.sub).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.messaging.messages.get_message(message_id, claims.sub).await?;
    Ok(Json(single_with_reactions(&state, message).await?))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state
        .messaging
        .messages
        .edit_message(message_id, claims.sub, req.content)
        .await?;
    Ok(Json(single_with_reactions(&state, message).await?))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.messaging.messages.delete_message(message_id, claims.sub).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Attach grouped reactions to a page of messages, preserving its order.
async fn with_reactions(state: &AppState, messages: Vec<Message>) -> Result<Vec<MessageResponse>, ApiError> {
    let ids = messages.iter().map(|m| m.id).collect();
    let mut groups = state.messaging.reactions.groups_for(ids).await?;

    Ok(messages
        .into_iter()
        .map(|message| MessageResponse {
            reactions: groups.remove(&message.id).unwrap_or_default(),
            message,
        })
        .collect())
}

async fn single_with_reactions(state: &AppState, message: Message) -> Result<MessageResponse, ApiError> {
    let mut groups = state.messaging.reactions.groups_for(vec![message.id]).await?;
    Ok(MessageResponse {
        reactions: groups.remove(&message.id).unwrap_or_default(),
        message,
    })
}
