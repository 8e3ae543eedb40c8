use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Errors surfaced by messaging operations. Every variant except
/// `BackendUnavailable` is raised before any write is attempted.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Cannot start a conversation with yourself")]
    SelfConversation,

    #[error("You are not a participant of this conversation")]
    NotParticipant,

    #[error("Only the sender can change this message")]
    NotOwner,

    #[error("Messages can only be edited within {window_secs} seconds of sending")]
    EditWindowExpired { window_secs: i64 },

    #[error("Messaging is blocked between these users")]
    Blocked,

    #[error("A message needs text or media")]
    EmptyMessage,

    #[error("This message was deleted")]
    MessageDeleted,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl MessagingError {
    /// Stable machine-readable code, used by API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SelfConversation => "self_conversation",
            Self::NotParticipant => "not_participant",
            Self::NotOwner => "not_owner",
            Self::EditWindowExpired { .. } => "edit_window_expired",
            Self::Blocked => "blocked",
            Self::EmptyMessage => "empty_message",
            Self::MessageDeleted => "message_deleted",
            Self::NotFound { .. } => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::BackendUnavailable(_) => "backend_unavailable",
        }
    }

    pub(crate) fn backend(err: anyhow::Error) -> Self {
        error!("Storage error: {:#}", err);
        Self::BackendUnavailable(err.to_string())
    }

    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MessagingError>;
