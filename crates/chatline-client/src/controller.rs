use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::{debug, instrument};

use chatline_core::wire::{ErrorBody, GenerateRequest};
use chatline_core::Message;

use crate::error::ChatError;
use crate::reader::TextStreamReader;

/// Raw response body of the generation endpoint.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Carries one generation request to the backend.
#[async_trait]
pub trait GenerateTransport: Send + Sync {
    /// Issue the request. `Ok` means the backend accepted it and the body is
    /// ready to stream; a refusal is `ChatError::Request`.
    async fn open(&self, request: &GenerateRequest) -> Result<ByteStream, ChatError>;
}

/// `POST {api_url}/generate` over HTTP.
pub struct HttpTransport {
    client: Client,
    api_url: String,
}

impl HttpTransport {
    pub fn new(client: Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

/// Build a `Request` error from a non-success response, preferring the
/// server's `{ "error": .. }` message.
pub(crate) async fn request_error(resp: reqwest::Response, fallback: &str) -> ChatError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .map(|b| b.error)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("{fallback}: {status}"));
    ChatError::Request { status, message }
}

#[async_trait]
impl GenerateTransport for HttpTransport {
    async fn open(&self, request: &GenerateRequest) -> Result<ByteStream, ChatError> {
        let resp = self
            .client
            .post(format!("{}/generate", self.api_url))
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(request_error(resp, "Server Error").await);
        }
        Ok(resp.bytes_stream().map_err(std::io::Error::other).boxed())
    }
}

/// Drives one request/response exchange and accumulates the streamed answer.
#[derive(Clone)]
pub struct StreamingController {
    transport: Arc<dyn GenerateTransport>,
}

impl StreamingController {
    pub fn new(transport: Arc<dyn GenerateTransport>) -> Self {
        Self { transport }
    }

    /// Stream a reply to `new_user_text`.
    ///
    /// `on_progress` receives the full text so far after every non-empty
    /// fragment, so a caller replaces rather than appends. The last value it
    /// sees equals the returned text. Pending and errored messages in
    /// `history` are dropped before the request is built.
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn stream_reply<F>(
        &self,
        history: &[Message],
        new_user_text: &str,
        mut on_progress: F,
    ) -> Result<String, ChatError>
    where
        F: FnMut(&str),
    {
        if new_user_text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let request = GenerateRequest::new(history, new_user_text);
        let dropped = history.len() - request.history.len();
        if dropped > 0 {
            debug!(dropped, "excluded unfinished messages from history");
        }

        let body = self.transport.open(&request).await?;
        let mut reader = TextStreamReader::new(body);
        let mut accumulated = String::new();

        while let Some(fragment) = reader.next().await {
            match fragment {
                Ok(text) => {
                    accumulated.push_str(&text);
                    on_progress(&accumulated);
                }
                Err(ChatError::Network(reason)) if !accumulated.is_empty() => {
                    return Err(ChatError::StreamInterrupted {
                        received: accumulated.len(),
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        debug!(chars = accumulated.chars().count(), "reply complete");
        Ok(accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Piece, ScriptedTransport};
    use chatline_core::MessageState;
    use proptest::prelude::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn controller(transport: ScriptedTransport) -> (StreamingController, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        (StreamingController::new(transport.clone()), transport)
    }

    #[tokio::test]
    async fn progress_receives_accumulated_text() {
        let (ctl, _) = controller(ScriptedTransport::chunks(&["H", "el", "lo there!"]));
        let mut seen = Vec::new();
        let out = ctl
            .stream_reply(&[], "Hello", |text| seen.push(text.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["H", "Hel", "Hello there!"]);
        assert_eq!(out, "Hello there!");
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_a_request() {
        let (ctl, transport) = controller(ScriptedTransport::chunks(&["x"]));
        let err = ctl.stream_reply(&[], "   \n", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn unfinished_history_is_never_sent() {
        let (ctl, transport) = controller(ScriptedTransport::chunks(&["ok"]));
        let mut errored = Message::assistant_placeholder();
        errored.state = MessageState::Errored;
        let history = vec![
            Message::user("one"),
            errored,
            Message::user("two"),
            Message::assistant_placeholder(),
        ];
        ctl.stream_reply(&history, "three", |_| {}).await.unwrap();

        let sent = &transport.requests()[0];
        let contents: Vec<&str> = sent.history.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(sent.message, "three");
    }

    #[tokio::test]
    async fn drop_after_partial_text_is_stream_interrupted() {
        let (ctl, _) = controller(ScriptedTransport::new(vec![
            Piece::Text("Par".into()),
            Piece::Drop("connection reset".into()),
        ]));
        let mut last = String::new();
        let err = ctl
            .stream_reply(&[], "hi", |t| last = t.to_string())
            .await
            .unwrap_err();
        assert_eq!(last, "Par");
        assert!(matches!(
            err,
            ChatError::StreamInterrupted { received: 3, ref reason } if reason.contains("reset")
        ));
    }

    #[tokio::test]
    async fn drop_before_any_text_is_network_error() {
        let (ctl, _) = controller(ScriptedTransport::new(vec![Piece::Drop("refused".into())]));
        let err = ctl.stream_reply(&[], "hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Network(_)));
    }

    #[tokio::test]
    async fn rejection_is_passed_through() {
        let (ctl, _) = controller(ScriptedTransport::reject(500, "Failed to generate response"));
        let mut calls = 0;
        let err = ctl.stream_reply(&[], "hi", |_| calls += 1).await.unwrap_err();
        assert_eq!(calls, 0);
        assert!(matches!(err, ChatError::Request { status: 500, .. }));
    }

    #[tokio::test]
    async fn http_transport_streams_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({ "message": "Hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_raw("Hello there!", "text/plain"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), format!("{}/api", server.uri()));
        let ctl = StreamingController::new(Arc::new(transport));
        let mut last = String::new();
        let out = ctl
            .stream_reply(&[Message::user("earlier")], "Hello", |t| last = t.to_string())
            .await
            .unwrap();
        assert_eq!(out, "Hello there!");
        assert_eq!(last, out);
    }

    #[tokio::test]
    async fn http_transport_surfaces_server_error_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "error": "Failed to generate response" })),
            )
            .mount(&server)
            .await;

        let ctl = StreamingController::new(Arc::new(HttpTransport::new(
            Client::new(),
            format!("{}/api", server.uri()),
        )));
        let err = ctl.stream_reply(&[], "hi", |_| {}).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to generate response");
    }

    #[tokio::test]
    async fn http_transport_falls_back_to_status_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let ctl = StreamingController::new(Arc::new(HttpTransport::new(
            Client::new(),
            format!("{}/api", server.uri()),
        )));
        let err = ctl.stream_reply(&[], "hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Request { status: 502, ref message } if message == "Server Error: 502"));
    }

    proptest! {
        #[test]
        fn last_progress_equals_result(text in "\\PC{1,40}", cuts in proptest::collection::vec(any::<usize>(), 0..6)) {
            let bytes = text.as_bytes();
            let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
            points.sort_unstable();
            let mut pieces = Vec::new();
            let mut start = 0;
            for p in points.into_iter().chain(std::iter::once(bytes.len())) {
                pieces.push(Piece::Bytes(bytes[start..p].to_vec()));
                start = p;
            }

            let (ctl, _) = controller(ScriptedTransport::new(pieces));
            let mut seen: Vec<String> = Vec::new();
            let out = futures::executor::block_on(
                ctl.stream_reply(&[], "go", |t| seen.push(t.to_string())),
            )
            .unwrap();

            prop_assert_eq!(&out, &text);
            prop_assert_eq!(seen.last(), Some(&out));
            for pair in seen.windows(2) {
                prop_assert!(pair[1].len() > pair[0].len());
                prop_assert!(pair[1].starts_with(pair[0].as_str()));
            }
        }
    }
}
