use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::OwnerId;
use crate::ids::SessionId;
use crate::messages::{Message, Role};

/// Maximum number of characters kept from the first user message.
pub const TITLE_MAX_CHARS: usize = 30;
/// Appended to a title that was cut short.
pub const TITLE_ELLIPSIS: &str = "...";
/// Title for a session that somehow has no user message.
pub const UNTITLED: &str = "New chat";

/// A stored conversation. Title is fixed at creation; later turns only
/// replace `messages` and bump `updated_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: SessionId,
    #[serde(rename = "userId")]
    pub owner_id: OwnerId,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Build a brand-new session for the first turn of a conversation.
    pub fn create(
        id: SessionId,
        owner_id: OwnerId,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> Self {
        let title = messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| derive_title(&m.content))
            .unwrap_or_else(|| UNTITLED.to_string());

        Self {
            id,
            owner_id,
            title,
            messages,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the transcript. `updated_at` always moves forward, even when
    /// two commits land within the same millisecond.
    pub fn replace_messages(&mut self, messages: Vec<Message>, now: DateTime<Utc>) {
        self.messages = messages;
        let floor = self.updated_at + Duration::milliseconds(1);
        self.updated_at = now.max(floor);
    }
}

/// Derive a session title from the first user message.
pub fn derive_title(first_message: &str) -> String {
    let text = first_message.trim();
    let mut chars = text.char_indices();
    match chars.nth(TITLE_MAX_CHARS) {
        Some((cut, _)) => format!("{}{TITLE_ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}
