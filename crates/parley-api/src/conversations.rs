use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use parley_types::api::{Claims, CreateConversationRequest, CreateConversationResponse};
use parley_types::models::ConversationSummary;

use crate::error::ApiError;
use crate::state::AppState;

/// Idempotent: returns the existing conversation with the other user if any.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<CreateConversationResponse>, ApiError> {
    let conversation_id = state
        .messaging
        .conversations
        .get_or_create_conversation(claims.sub, req.other_user_id)
        .await?;
    Ok(Json(CreateConversationResponse { conversation_id }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let summaries = state.messaging.conversations.list_conversations(claims.sub).await?;
    Ok(Json(summaries))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationSummary>, ApiError> {
    let summary = state
        .messaging
        .conversations
        .get_conversation(conversation_id, claims.sub)
        .await?;
    Ok(Json(summary))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state
        .messaging
        .conversations
        .delete_conversation(conversation_id, claims.sub)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
