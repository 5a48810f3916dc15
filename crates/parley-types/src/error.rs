use thiserror::Error;

use crate::conversation::ConversationId;

/// Errors surfaced to the caller of a dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Admission policy is `reject` and the concurrency ceiling is reached.
    #[error("concurrency ceiling of {0} reached, update rejected")]
    Backpressure(usize),

    #[error("dispatcher is shut down")]
    ShutDown,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors related to chat session creation and delivery.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The init (or resume) callback failed; no session was registered.
    #[error("session init failed for chat {chat_id}: {reason}")]
    InitFailed {
        chat_id: ConversationId,
        reason: String,
    },

    #[error("session limit of {0} reached")]
    SessionLimitReached(usize),

    #[error("session for chat {0} is already running")]
    AlreadyRunning(ConversationId),

    /// The session stopped before the message could be queued.
    #[error("session for chat {0} is closed")]
    Closed(ConversationId),

    #[error("chat supervisor is shut down")]
    ShutDown,
}

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
