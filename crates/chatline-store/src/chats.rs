use tracing::instrument;

use chatline_core::{ChatSession, Message, OwnerId, SessionId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const SELECT_CHAT: &str =
    "SELECT id, user_id, title, messages, created_at, updated_at FROM chats";

/// Whole-document storage of chat sessions keyed by id.
#[derive(Clone)]
pub struct ChatRepo {
    db: Database,
}

impl ChatRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert the session, or overwrite every field of an existing one.
    #[instrument(skip(self, chat), fields(session_id = %chat.id, owner_id = %chat.owner_id, messages = chat.messages.len()))]
    pub fn upsert(&self, chat: &ChatSession) -> Result<(), StoreError> {
        let messages = serde_json::to_string(&chat.messages)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (id, user_id, title, messages, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    user_id = excluded.user_id,
                    title = excluded.title,
                    messages = excluded.messages,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    chat.id.as_str(),
                    chat.owner_id.as_str(),
                    chat.title,
                    messages,
                    chat.created_at.timestamp_millis(),
                    chat.updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub fn get(&self, id: &SessionId) -> Result<Option<ChatSession>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_CHAT} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_chat(row).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Like [`get`](Self::get) but absent sessions are an error.
    pub fn require(&self, id: &SessionId) -> Result<ChatSession, StoreError> {
        self.get(id)?
            .ok_or_else(|| StoreError::NotFound(format!("chat {id}")))
    }

    /// All sessions owned by `owner`, most recently updated first.
    #[instrument(skip(self), fields(owner_id = %owner))]
    pub fn list_for_owner(&self, owner: &OwnerId) -> Result<Vec<ChatSession>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_CHAT} WHERE user_id = ?1 ORDER BY updated_at DESC, id DESC"
            ))?;
            let mut rows = stmt.query([owner.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_chat(row)?);
            }
            Ok(results)
        })
    }

    /// Remove a session. Returns whether a row existed.
    #[instrument(skip(self), fields(session_id = %id))]
    pub fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM chats WHERE id = ?1", [id.as_str()])?;
            Ok(changed > 0)
        })
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> Result<ChatSession, StoreError> {
    let raw_messages: String = row_helpers::get(row, 3, "chats", "messages")?;
    let messages: Vec<Message> = row_helpers::parse_json(&raw_messages, "chats", "messages")?;
    let created_at: i64 = row_helpers::get(row, 4, "chats", "created_at")?;
    let updated_at: i64 = row_helpers::get(row, 5, "chats", "updated_at")?;

    Ok(ChatSession {
        id: SessionId::from_raw(row_helpers::get::<String>(row, 0, "chats", "id")?),
        owner_id: OwnerId::from_raw(row_helpers::get::<String>(row, 1, "chats", "user_id")?),
        title: row_helpers::get(row, 2, "chats", "title")?,
        messages,
        created_at: row_helpers::parse_millis(created_at, "chats", "created_at")?,
        updated_at: row_helpers::parse_millis(updated_at, "chats", "updated_at")?,
    })
}
