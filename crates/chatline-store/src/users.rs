use tracing::instrument;

use chatline_core::clock::now_millis;
use chatline_core::{OwnerId, User};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone)]
pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the stored user with this id, or store `user` as given.
    ///
    /// Insert and read happen under one lock, so two concurrent first logins
    /// for the same id both succeed and see the same record.
    #[instrument(skip(self, user), fields(owner_id = %user.id))]
    pub fn get_or_create(&self, user: &User) -> Result<User, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, avatar, created_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
                rusqlite::params![
                    user.id.as_str(),
                    user.name,
                    user.avatar,
                    now_millis().timestamp_millis(),
                ],
            )?;
            select_user(conn, &user.id)?.ok_or_else(|| StoreError::NotFound(user.id.to_string()))
        })
    }

    #[instrument(skip(self), fields(owner_id = %id))]
    pub fn get(&self, id: &OwnerId) -> Result<Option<User>, StoreError> {
        self.db.with_conn(|conn| select_user(conn, id))
    }
}

fn select_user(conn: &rusqlite::Connection, id: &OwnerId) -> Result<Option<User>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, avatar FROM users WHERE id = ?1")?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => Ok(Some(User {
            id: OwnerId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
            name: row_helpers::get(row, 1, "users", "name")?,
            avatar: row_helpers::get(row, 2, "users", "avatar")?,
        })),
        None => Ok(None),
    }
}
