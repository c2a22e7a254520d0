//! Client-held transcript of the active conversation.
//!
//! A turn appends a finalized user message and a pending assistant
//! placeholder. The placeholder is then updated in place until it is either
//! finalized with the reply or marked errored with [`APOLOGY_TEXT`].

use chatline_core::messages::APOLOGY_TEXT;
use chatline_core::{Message, MessageId, MessageState};
use tracing::debug;

use crate::error::ChatError;

/// Everything needed to stream the reply for a turn that was just begun.
#[derive(Clone, Debug)]
pub struct TurnHandle {
    /// Id of the pending assistant message this turn will resolve.
    pub assistant_id: MessageId,
    /// Replayable history as it stood before the turn.
    pub history: Vec<Message>,
    /// Trimmed user text.
    pub user_text: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a stored transcript. A stored pending message can never be
    /// completed, so it is loaded as errored.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let messages = messages
            .into_iter()
            .map(|mut m| {
                if m.is_pending() {
                    debug!(message_id = %m.id, "stored reply was never completed");
                    m.state = MessageState::Errored;
                    m.content = APOLOGY_TEXT.to_string();
                }
                m
            })
            .collect();
        Self { messages }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The in-flight placeholder, if a turn is streaming.
    pub fn pending(&self) -> Option<&Message> {
        self.messages.last().filter(|m| m.is_pending())
    }

    /// Messages that may be replayed to the backend.
    pub fn request_history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|m| m.is_replayable())
            .cloned()
            .collect()
    }

    /// Start a turn: append the user message (never rolled back) and an empty
    /// pending assistant message.
    pub fn begin_turn(&mut self, text: &str) -> Result<TurnHandle, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.pending().is_some() {
            return Err(ChatError::TurnInProgress);
        }

        let history = self.request_history();
        let placeholder = Message::assistant_placeholder();
        let assistant_id = placeholder.id.clone();
        self.messages.push(Message::user(text));
        self.messages.push(placeholder);

        Ok(TurnHandle {
            assistant_id,
            history,
            user_text: text.to_string(),
        })
    }

    /// Replace the pending message's content with the text accumulated so far.
    pub fn apply_progress(&mut self, id: &MessageId, text: &str) -> Result<(), ChatError> {
        let msg = self.pending_mut(id)?;
        msg.content.clear();
        msg.content.push_str(text);
        Ok(())
    }

    pub fn finalize(&mut self, id: &MessageId, final_text: String) -> Result<(), ChatError> {
        let msg = self.pending_mut(id)?;
        msg.content = final_text;
        msg.state = MessageState::Finalized;
        Ok(())
    }

    /// Mark the pending message errored. Partial text is discarded.
    pub fn fail(&mut self, id: &MessageId) -> Result<(), ChatError> {
        let msg = self.pending_mut(id)?;
        msg.content = APOLOGY_TEXT.to_string();
        msg.state = MessageState::Errored;
        Ok(())
    }

    fn pending_mut(&mut self, id: &MessageId) -> Result<&mut Message, ChatError> {
        self.messages
            .last_mut()
            .filter(|m| m.is_pending() && &m.id == id)
            .ok_or_else(|| ChatError::NoPendingMessage(id.clone()))
    }
}
