pub mod chat;
pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod persistence;
pub mod reader;
pub mod store_client;

#[cfg(test)]
mod test_support;

pub use chat::{ChatClient, TurnOutcome};
pub use config::ClientConfig;
pub use controller::{GenerateTransport, HttpTransport, StreamingController};
pub use conversation::{Conversation, TurnHandle};
pub use error::ChatError;
pub use persistence::{ClientContext, CommitOutcome, DocumentStore, PersistenceCoordinator};
pub use reader::TextStreamReader;
pub use store_client::HttpDocumentStore;
