use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use chatline_core::errors::GatewayError;
use chatline_core::messages::Role;
use chatline_core::provider::{GenerationRequest, Generator, TextStream};

use crate::sse;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Finish reasons that mean the answer was withheld rather than completed.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

#[derive(Clone, Debug)]
pub struct GeminiConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Streams answers from the Gemini `streamGenerateContent` endpoint.
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Build the JSON body. Prior turns and the new message become `contents`;
/// the assistant role is called `model` on this API.
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let mut contents: Vec<Value> = request
        .history
        .iter()
        .map(|entry| {
            let role = match entry.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": entry.content }] })
        })
        .collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": request.message }] }));

    let mut body = json!({ "contents": contents });
    if let Some(instruction) = request.system_instruction.as_deref() {
        body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
    }
    body
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// Turn one SSE payload into a text fragment, an error, or nothing.
fn interpret_chunk(data: &str) -> Option<Result<String, GatewayError>> {
    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "unparseable Gemini stream chunk");
            return None;
        }
    };

    if let Some(err) = chunk.error {
        return Some(Err(GatewayError::from_status(err.code, err.message)));
    }
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Some(Err(GatewayError::Blocked(reason)));
    }

    let candidate = chunk.candidates.into_iter().next()?;
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if !text.is_empty() {
        return Some(Ok(text));
    }
    match candidate.finish_reason.as_deref() {
        Some(reason) if BLOCKING_FINISH_REASONS.contains(&reason) => {
            Some(Err(GatewayError::Blocked(reason.to_string())))
        }
        _ => None,
    }
}

/// Pull the human-readable message out of a Gemini error response.
fn error_message(body: String) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(&body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body,
    }
}

#[async_trait]
impl Generator for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    #[instrument(skip(self, request), fields(model = %self.config.model, history = request.history.len()))]
    async fn stream(&self, request: &GenerationRequest) -> Result<TextStream, GatewayError> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status, error_message(body)));
        }
        debug!("Gemini stream opened");

        let fragments = sse::data_lines(Box::pin(resp.bytes_stream()), SSE_IDLE_TIMEOUT)
            .filter_map(|item| async move {
                match item {
                    Ok(data) => interpret_chunk(&data),
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(Box::pin(fragments))
    }
}
