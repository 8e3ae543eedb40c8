use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use parley_types::api::Claims;
use parley_types::models::Profile;

use crate::error::ApiError;
use crate::state::AppState;

/// Extract and validate the JWT from the Authorization header, mirror the
/// caller's profile locally, and expose the claims as an extension.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Bearer token rejected: {}", e);
        ApiError::Unauthorized
    })?
    .claims;

    state.identity.remember(profile_from_claims(&claims)).await?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

fn profile_from_claims(claims: &Claims) -> Profile {
    Profile {
        id: claims.sub,
        username: claims.username.clone(),
        display_name: claims
            .display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| claims.username.clone()),
        avatar_url: claims.avatar_url.clone(),
    }
}
