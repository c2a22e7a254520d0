use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::now_millis;
use crate::ids::MessageId;

/// Content shown in place of an assistant reply whose generation failed.
pub const APOLOGY_TEXT: &str =
    "Sorry, I encountered an error. Please check your API key or try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    /// Older stored chats use the backend's `model` role name.
    #[serde(alias = "model")]
    Assistant,
}

/// Lifecycle of a message: `Pending -> Finalized` or `Pending -> Errored`.
/// Both end states are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    Pending,
    #[default]
    Finalized,
    Errored,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub state: MessageState,
}

impl Message {
    /// A user message. User messages are finalized from the moment they exist.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            created_at: now_millis(),
            state: MessageState::Finalized,
        }
    }

    /// An empty assistant message waiting for streamed content.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            created_at: now_millis(),
            state: MessageState::Pending,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            state: MessageState::Finalized,
            content: content.into(),
            ..Self::assistant_placeholder()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == MessageState::Pending
    }

    /// Whether this message may be sent back to the backend as history.
    /// Pending and errored replies are not real answers.
    pub fn is_replayable(&self) -> bool {
        self.state == MessageState::Finalized
    }
}
