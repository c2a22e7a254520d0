pub mod gemini;
pub mod mock;
pub mod sse;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use mock::{MockGenerator, MockResponse};
