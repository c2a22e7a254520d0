use chatline_core::{MessageId, SessionId};

/// Errors from the client pipeline: generation, conversation state and
/// persistence.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ChatError {
    /// The backend refused the request before streaming started.
    #[error("{message}")]
    Request { status: u16, message: String },

    /// The connection dropped after `received` bytes of text had arrived.
    #[error("stream interrupted after {received} bytes: {reason}")]
    StreamInterrupted { received: usize, reason: String },

    /// Missing body or bytes that are not valid UTF-8.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("message is empty")]
    EmptyMessage,

    #[error("display name is empty")]
    EmptyName,

    #[error("a reply is still streaming")]
    TurnInProgress,

    #[error("message {0} is not the pending reply")]
    NoPendingMessage(MessageId),

    #[error("not logged in")]
    NotLoggedIn,

    #[error("store error: {0}")]
    Store(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ChatError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::StreamInterrupted { .. } => "stream_interrupted",
            Self::Transport(_) => "transport",
            Self::Network(_) => "network",
            Self::SessionNotFound(_) => "session_not_found",
            Self::EmptyMessage => "empty_message",
            Self::EmptyName => "empty_name",
            Self::TurnInProgress => "turn_in_progress",
            Self::NoPendingMessage(_) => "no_pending_message",
            Self::NotLoggedIn => "not_logged_in",
            Self::Store(_) => "store",
            Self::Decode(_) => "decode",
        }
    }

    /// Whether this error came from producing a reply (as opposed to a
    /// caller mistake or a persistence problem).
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Self::Request { .. }
                | Self::StreamInterrupted { .. }
                | Self::Transport(_)
                | Self::Network(_)
                | Self::Decode(_)
        )
    }
}
