use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use chatline_core::errors::GatewayError;
use chatline_core::provider::{GenerationRequest, Generator, TextStream};

/// Scripted outcome of one `stream()` call.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Yield these fragments, then end cleanly.
    Chunks(Vec<String>),
    /// Yield fragments with a pause before each one.
    Paced { interval: Duration, chunks: Vec<String> },
    /// Reject the request before any text is produced.
    Error(GatewayError),
    /// Yield fragments, then fail mid-stream.
    FailAfter(Vec<String>, GatewayError),
    /// Wait, then behave like the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(parts: &[&str]) -> Self {
        Self::Chunks(parts.iter().map(|p| p.to_string()).collect())
    }
}

/// Generator that replays scripted responses in order. Used by tests and by
/// `chatline serve --mock` for offline development.
pub struct MockGenerator {
    responses: Mutex<VecDeque<MockResponse>>,
    fallback: Option<MockResponse>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Response used once the script runs out.
    pub fn with_fallback(mut self, response: MockResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Generator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, GatewayError> {
        let call = {
            let mut requests = self.requests.lock();
            requests.push(request.clone());
            requests.len()
        };

        let next = self.responses.lock().pop_front().or_else(|| self.fallback.clone());
        let Some(mut response) = next else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockGenerator: no response configured for call {call}"
            )));
        };

        loop {
            match response {
                MockResponse::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    response = *inner;
                }
                MockResponse::Error(e) => return Err(e),
                MockResponse::Chunks(chunks) => {
                    return Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))));
                }
                MockResponse::Paced { interval, chunks } => {
                    let paced = stream::iter(chunks).then(move |chunk| async move {
                        tokio::time::sleep(interval).await;
                        Ok(chunk)
                    });
                    return Ok(Box::pin(paced));
                }
                MockResponse::FailAfter(chunks, error) => {
                    let head = stream::iter(chunks.into_iter().map(Ok));
                    return Ok(Box::pin(head.chain(stream::once(async move { Err(error) }))));
                }
            }
        }
    }
}
