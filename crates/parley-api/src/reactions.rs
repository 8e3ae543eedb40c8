use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{AddReactionRequest, Claims};
use parley_types::models::Reaction;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Reaction>>, ApiError> {
    let reactions = state.messaging.reactions.list_reactions(message_id, claims.sub).await?;
    Ok(Json(reactions))
}

/// Adding a third reaction silently evicts the caller's oldest one.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddReactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction = state
        .messaging
        .reactions
        .add_reaction(message_id, claims.sub, &req.emoji)
        .await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path((message_id, emoji)): Path<(Uuid, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state
        .messaging
        .reactions
        .remove_reaction(message_id, claims.sub, &emoji)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
