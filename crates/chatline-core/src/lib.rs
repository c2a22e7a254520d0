pub mod clock;
pub mod errors;
pub mod identity;
pub mod ids;
pub mod messages;
pub mod provider;
pub mod session;
pub mod wire;

pub use errors::GatewayError;
pub use identity::{OwnerId, User};
pub use ids::{MessageId, SessionId};
pub use messages::{Message, MessageState, Role};
pub use session::ChatSession;
