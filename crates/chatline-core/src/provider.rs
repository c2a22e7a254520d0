use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::GatewayError;
use crate::wire::HistoryEntry;

/// Text fragments of one generated answer, in order. Concatenating every
/// `Ok` item yields the full answer.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GatewayError>> + Send>>;

/// Everything a backend needs to answer one user message.
#[derive(Clone, Debug, Default)]
pub struct GenerationRequest {
    pub system_instruction: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub message: String,
}

/// Trait implemented by each generation backend (Gemini, mock).
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    /// Start generating. An `Err` here means the backend rejected the request
    /// before any text was produced.
    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, GatewayError>;
}
