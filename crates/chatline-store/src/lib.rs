pub mod chats;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod users;

pub use chats::ChatRepo;
pub use database::Database;
pub use error::StoreError;
pub use users::UserRepo;
