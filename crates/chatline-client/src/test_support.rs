//! In-process fakes for the transport and the document store.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;

use chatline_core::wire::GenerateRequest;
use chatline_core::{ChatSession, OwnerId, SessionId, User};

use crate::controller::{ByteStream, GenerateTransport};
use crate::error::ChatError;
use crate::persistence::DocumentStore;

/// One element of a scripted response body.
#[derive(Clone, Debug)]
pub enum Piece {
    Text(String),
    Bytes(Vec<u8>),
    /// The connection drops with this reason.
    Drop(String),
}

#[derive(Clone, Debug)]
enum Script {
    Body(Vec<Piece>),
    Reject { status: u16, message: String },
}

/// Replays one scripted body or rejection per `open` call and records requests.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedTransport {
    pub fn new(pieces: Vec<Piece>) -> Self {
        Self::default().then(pieces)
    }

    pub fn chunks(parts: &[&str]) -> Self {
        Self::default().then_chunks(parts)
    }

    pub fn reject(status: u16, message: &str) -> Self {
        Self::default().then_reject(status, message)
    }

    pub fn then(self, pieces: Vec<Piece>) -> Self {
        self.scripts.lock().push_back(Script::Body(pieces));
        self
    }

    pub fn then_chunks(self, parts: &[&str]) -> Self {
        self.then(parts.iter().map(|p| Piece::Text(p.to_string())).collect())
    }

    pub fn then_reject(self, status: u16, message: &str) -> Self {
        self.scripts.lock().push_back(Script::Reject {
            status,
            message: message.to_string(),
        });
        self
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl GenerateTransport for ScriptedTransport {
    async fn open(&self, request: &GenerateRequest) -> Result<ByteStream, ChatError> {
        self.requests.lock().push(request.clone());
        let script = self.scripts.lock().pop_front();
        match script {
            Some(Script::Body(pieces)) => {
                let items: Vec<Result<Bytes, std::io::Error>> = pieces
                    .into_iter()
                    .map(|piece| match piece {
                        Piece::Text(text) => Ok(Bytes::from(text)),
                        Piece::Bytes(bytes) => Ok(Bytes::from(bytes)),
                        Piece::Drop(reason) => Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            reason,
                        )),
                    })
                    .collect();
                Ok(futures::stream::iter(items).boxed())
            }
            Some(Script::Reject { status, message }) => Err(ChatError::Request { status, message }),
            None => Err(ChatError::Request {
                status: 500,
                message: "no scripted response".into(),
            }),
        }
    }
}

/// Document store kept in memory, with switches to simulate failures.
#[derive(Default)]
pub struct MemoryStore {
    chats: Mutex<HashMap<SessionId, ChatSession>>,
    users: Mutex<HashMap<OwnerId, User>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn chat(&self, id: &SessionId) -> Option<ChatSession> {
        self.chats.lock().get(id).cloned()
    }

    pub fn insert(&self, chat: ChatSession) {
        self.chats.lock().insert(chat.id.clone(), chat);
    }

    /// Remove a chat behind the client's back.
    pub fn remove(&self, id: &SessionId) {
        self.chats.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.chats.lock().len()
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> Result<(), ChatError> {
        if flag.load(Ordering::SeqCst) {
            Err(ChatError::Store(format!("simulated {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn save_chat(&self, chat: &ChatSession) -> Result<(), ChatError> {
        self.check(&self.fail_writes, "write")?;
        self.insert(chat.clone());
        Ok(())
    }

    async fn get_chat(&self, id: &SessionId) -> Result<Option<ChatSession>, ChatError> {
        self.check(&self.fail_reads, "read")?;
        Ok(self.chat(id))
    }

    async fn list_chats(&self, owner: &OwnerId) -> Result<Vec<ChatSession>, ChatError> {
        self.check(&self.fail_reads, "read")?;
        let mut chats: Vec<ChatSession> = self
            .chats
            .lock()
            .values()
            .filter(|c| &c.owner_id == owner)
            .cloned()
            .collect();
        chats.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        Ok(chats)
    }

    async fn delete_chat(&self, id: &SessionId) -> Result<(), ChatError> {
        self.check(&self.fail_writes, "write")?;
        self.remove(id);
        Ok(())
    }

    async fn login(&self, name: &str) -> Result<User, ChatError> {
        let user = User::from_display_name(name).ok_or(ChatError::Request {
            status: 400,
            message: "name is required".into(),
        })?;
        Ok(self
            .users
            .lock()
            .entry(user.id.clone())
            .or_insert(user)
            .clone())
    }
}
