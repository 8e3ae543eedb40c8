use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use parley_core::MessagingError;
use parley_types::api::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error(transparent)]
    Messaging(#[from] MessagingError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Messaging(e) => match e {
                MessagingError::SelfConversation
                | MessagingError::EmptyMessage
                | MessagingError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                MessagingError::NotParticipant | MessagingError::NotOwner | MessagingError::Blocked => {
                    StatusCode::FORBIDDEN
                }
                MessagingError::NotFound { .. } => StatusCode::NOT_FOUND,
                MessagingError::EditWindowExpired { .. } | MessagingError::MessageDeleted => StatusCode::CONFLICT,
                MessagingError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::Messaging(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Storage details stay in the server log.
            ApiError::Messaging(MessagingError::BackendUnavailable(_)) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
