//! Commits finished turns to the document store.
//!
//! Persistence failures are non-fatal: they are logged and returned in the
//! [`CommitOutcome`], and the in-memory conversation stays authoritative.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use chatline_core::clock::now_millis;
use chatline_core::{ChatSession, Message, OwnerId, SessionId, User};

use crate::error::ChatError;

/// Keyed read/write access to stored chat sessions and users.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or fully replace the session with this id.
    async fn save_chat(&self, chat: &ChatSession) -> Result<(), ChatError>;

    async fn get_chat(&self, id: &SessionId) -> Result<Option<ChatSession>, ChatError>;

    /// Sessions owned by `owner`, most recently updated first.
    async fn list_chats(&self, owner: &OwnerId) -> Result<Vec<ChatSession>, ChatError>;

    async fn delete_chat(&self, id: &SessionId) -> Result<(), ChatError>;

    /// Create or fetch the user for a display name.
    async fn login(&self, name: &str) -> Result<User, ChatError>;
}

/// Who the client is acting for. Passed explicitly into every store call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientContext {
    pub owner: OwnerId,
}

impl ClientContext {
    pub fn new(owner: OwnerId) -> Self {
        Self { owner }
    }
}

/// Result of committing one turn.
#[derive(Clone, Debug)]
pub struct CommitOutcome {
    /// Session the conversation now belongs to. `None` only when creating a
    /// new session failed, so the next commit tries to create it again.
    pub session_id: Option<SessionId>,
    /// Whether this commit created the session.
    pub created: bool,
    /// Refreshed session list, or `None` if the refresh failed.
    pub sessions: Option<Vec<ChatSession>>,
    /// The non-fatal persistence error, if the write did not happen.
    pub error: Option<ChatError>,
}

impl CommitOutcome {
    pub fn is_saved(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn DocumentStore>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write the conversation to its session, creating one on the first turn,
    /// then refresh the session list from the store.
    #[instrument(skip_all, fields(owner_id = %ctx.owner, session_id = ?active.map(SessionId::as_str)))]
    pub async fn commit_turn(
        &self,
        ctx: &ClientContext,
        active: Option<&SessionId>,
        messages: &[Message],
    ) -> CommitOutcome {
        let (session_id, created, error) = match active {
            None => self.create(ctx, messages).await,
            Some(id) => {
                let error = self.update(id, messages).await.err();
                (Some(id.clone()), false, error)
            }
        };

        if let Some(e) = &error {
            warn!(
                owner_id = %ctx.owner,
                session_id = session_id.as_ref().map(SessionId::as_str).unwrap_or("<new>"),
                error = %e,
                kind = e.error_kind(),
                "turn not saved"
            );
        }

        let sessions = self.refresh(ctx).await.ok();
        CommitOutcome {
            session_id,
            created,
            sessions,
            error,
        }
    }

    /// Fetch the owner's sessions, newest first.
    pub async fn refresh(&self, ctx: &ClientContext) -> Result<Vec<ChatSession>, ChatError> {
        self.store.list_chats(&ctx.owner).await.inspect_err(|e| {
            warn!(owner_id = %ctx.owner, error = %e, "session list refresh failed");
        })
    }

    async fn create(
        &self,
        ctx: &ClientContext,
        messages: &[Message],
    ) -> (Option<SessionId>, bool, Option<ChatError>) {
        let chat = ChatSession::create(
            SessionId::new(),
            ctx.owner.clone(),
            messages.to_vec(),
            now_millis(),
        );
        match self.store.save_chat(&chat).await {
            Ok(()) => {
                info!(session_id = %chat.id, title = %chat.title, "session created");
                (Some(chat.id), true, None)
            }
            Err(e) => (None, false, Some(e)),
        }
    }

    async fn update(&self, id: &SessionId, messages: &[Message]) -> Result<(), ChatError> {
        let mut chat = self
            .store
            .get_chat(id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(id.clone()))?;
        chat.replace_messages(messages.to_vec(), now_millis());
        self.store.save_chat(&chat).await
    }
}
