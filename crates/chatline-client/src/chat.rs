//! Turn orchestration for one signed-in user.
//!
//! [`ChatClient`] wires the controller, the conversation state machine and
//! the persistence coordinator together and keeps the session list that a UI
//! would show alongside the transcript.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use chatline_core::{ChatSession, Message, SessionId, User};

use crate::config::ClientConfig;
use crate::controller::{GenerateTransport, HttpTransport, StreamingController};
use crate::conversation::Conversation;
use crate::error::ChatError;
use crate::persistence::{ClientContext, DocumentStore, PersistenceCoordinator};
use crate::store_client::HttpDocumentStore;

/// What happened during one [`ChatClient::send_message`] call.
///
/// Generation and persistence failures are reported here rather than as an
/// `Err`: the turn still happened and the transcript reflects it.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// The assistant message as it ended up: finalized or errored.
    pub reply: Message,
    pub session_id: Option<SessionId>,
    pub created_session: bool,
    pub generation_error: Option<ChatError>,
    /// Set when the turn could not be saved; the transcript is unaffected.
    pub persistence_error: Option<ChatError>,
}

pub struct ChatClient {
    controller: StreamingController,
    coordinator: PersistenceCoordinator,
    store: Arc<dyn DocumentStore>,
    context: Option<ClientContext>,
    user: Option<User>,
    conversation: Conversation,
    active_session: Option<SessionId>,
    sessions: Vec<ChatSession>,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn GenerateTransport>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            controller: StreamingController::new(transport),
            coordinator: PersistenceCoordinator::new(store.clone()),
            store,
            context: None,
            user: None,
            conversation: Conversation::new(),
            active_session: None,
            sessions: Vec::new(),
        }
    }

    /// Client talking to a backend over HTTP.
    pub fn connect(config: &ClientConfig) -> Result<Self, ChatError> {
        let http = config.http_client()?;
        let transport = HttpTransport::new(http.clone(), config.api_url.clone());
        let store = HttpDocumentStore::new(http, config.api_url.clone());
        Ok(Self::new(Arc::new(transport), Arc::new(store)))
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn active_session(&self) -> Option<&SessionId> {
        self.active_session.as_ref()
    }

    /// Last known session list, newest first.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    /// Sign in by display name and load that user's sessions. Starts with an
    /// empty conversation.
    #[instrument(skip(self))]
    pub async fn login(&mut self, name: &str) -> Result<&User, ChatError> {
        if name.trim().is_empty() {
            return Err(ChatError::EmptyName);
        }
        let user = self.store.login(name.trim()).await?;
        info!(owner_id = %user.id, "logged in");

        let ctx = ClientContext::new(user.id.clone());
        self.sessions = self.coordinator.refresh(&ctx).await.unwrap_or_default();
        self.context = Some(ctx);
        self.new_chat();
        Ok(self.user.insert(user))
    }

    pub fn logout(&mut self) {
        self.context = None;
        self.user = None;
        self.sessions.clear();
        self.new_chat();
    }

    /// Clear the view. The next turn creates a new session.
    pub fn new_chat(&mut self) {
        self.conversation = Conversation::new();
        self.active_session = None;
    }

    /// Load a stored session into the view.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn select_chat(&mut self, id: &SessionId) -> Result<(), ChatError> {
        self.require_context()?;
        let chat = self
            .store
            .get_chat(id)
            .await?
            .ok_or_else(|| ChatError::SessionNotFound(id.clone()))?;
        self.conversation = Conversation::from_messages(chat.messages);
        self.active_session = Some(chat.id);
        Ok(())
    }

    /// Delete a stored session. If it is the one on screen the view is reset.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn delete_chat(&mut self, id: &SessionId) -> Result<(), ChatError> {
        self.require_context()?;
        self.store.delete_chat(id).await?;
        if self.active_session.as_ref() == Some(id) {
            self.new_chat();
        }
        self.refresh_sessions().await?;
        Ok(())
    }

    pub async fn refresh_sessions(&mut self) -> Result<&[ChatSession], ChatError> {
        let ctx = self.require_context()?.clone();
        self.sessions = self.coordinator.refresh(&ctx).await?;
        Ok(&self.sessions)
    }

    /// Run one turn: append the user message, stream the reply into the
    /// pending placeholder, then save the conversation.
    ///
    /// `on_progress` gets the full reply text so far. Returns `Err` only when
    /// the turn could not start (not logged in, blank text); everything after
    /// that is reported in the [`TurnOutcome`].
    #[instrument(skip_all, fields(session_id = ?self.active_session.as_ref().map(SessionId::as_str)))]
    pub async fn send_message<F>(&mut self, text: &str, mut on_progress: F) -> Result<TurnOutcome, ChatError>
    where
        F: FnMut(&str),
    {
        let ctx = self.require_context()?.clone();
        let turn = self.conversation.begin_turn(text)?;
        let assistant_id = turn.assistant_id.clone();

        let conversation = &mut self.conversation;
        let result = self
            .controller
            .stream_reply(&turn.history, &turn.user_text, |acc| {
                if let Err(e) = conversation.apply_progress(&assistant_id, acc) {
                    warn!(error = %e, "progress for a message that is no longer pending");
                }
                on_progress(acc);
            })
            .await;

        let generation_error = match result {
            Ok(reply) => {
                self.conversation.finalize(&assistant_id, reply)?;
                None
            }
            Err(e) => {
                warn!(message_id = %assistant_id, error = %e, kind = e.error_kind(), "reply failed");
                self.conversation.fail(&assistant_id)?;
                Some(e)
            }
        };

        let commit = self
            .coordinator
            .commit_turn(&ctx, self.active_session.as_ref(), self.conversation.messages())
            .await;
        self.active_session = commit.session_id.clone();
        if let Some(sessions) = commit.sessions {
            self.sessions = sessions;
        }

        let reply = self
            .conversation
            .messages()
            .last()
            .cloned()
            .ok_or_else(|| ChatError::NoPendingMessage(assistant_id.clone()))?;

        Ok(TurnOutcome {
            reply,
            session_id: commit.session_id,
            created_session: commit.created,
            generation_error,
            persistence_error: commit.error,
        })
    }

    fn require_context(&self) -> Result<&ClientContext, ChatError> {
        self.context.as_ref().ok_or(ChatError::NotLoggedIn)
    }
}
