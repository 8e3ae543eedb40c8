use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use parley_types::api::Claims;
use parley_types::models::{BlockEdge, BlockStatus};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_blocked(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BlockEdge>>, ApiError> {
    Ok(Json(state.messaging.blocks.list_blocked(claims.sub).await?))
}

/// Block state in both directions between the caller and `user_id`.
pub async fn block_status(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BlockStatus>, ApiError> {
    Ok(Json(state.messaging.blocks.is_blocked(claims.sub, user_id).await?))
}

pub async fn block(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.messaging.blocks.block(claims.sub, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unblock(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    state.messaging.blocks.unblock(claims.sub, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
