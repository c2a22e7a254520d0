//! JSON bodies exchanged between the client and the backend.

use serde::{Deserialize, Serialize};

use crate::messages::{Message, Role};

/// One prior turn as the generation endpoint expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
}

/// Body of `POST /api/generate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub history: Vec<HistoryEntry>,
    pub message: String,
}

impl GenerateRequest {
    /// Serialize a transcript plus the new user text. Only finalized messages
    /// are replayed; pending and errored assistant messages never reach the
    /// backend.
    pub fn new(history: &[Message], message: impl Into<String>) -> Self {
        Self {
            history: history
                .iter()
                .filter(|m| m.is_replayable())
                .map(|m| HistoryEntry {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            message: message.into(),
        }
    }
}

/// Error body returned by every route on failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}
