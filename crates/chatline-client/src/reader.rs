//! Decodes a chunked byte body into UTF-8 text fragments.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;

use crate::error::ChatError;

pin_project! {
    /// Lazy, single-pass decoder over a byte stream.
    ///
    /// A multi-byte character split across chunks is held back until the
    /// next chunk completes it. Fragments are never empty. Text decoded before
    /// a failure is always yielded before the error, and the stream ends
    /// after the first error.
    pub struct TextStreamReader<S> {
        #[pin]
        inner: S,
        carry: Vec<u8>,
        queued_error: Option<ChatError>,
        done: bool,
    }
}

impl<S, E> TextStreamReader<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            carry: Vec::new(),
            queued_error: None,
            done: false,
        }
    }
}

/// Split off the longest decodable prefix of `carry`. Returns the text and,
/// if `carry` holds bytes that can never decode, the error to raise next.
fn drain_valid(carry: &mut Vec<u8>) -> (String, Option<ChatError>) {
    match std::str::from_utf8(carry) {
        Ok(text) => {
            let text = text.to_owned();
            carry.clear();
            (text, None)
        }
        Err(e) => {
            let valid = e.valid_up_to();
            let rest = carry.split_off(valid);
            let prefix = std::mem::replace(carry, rest);
            // Already validated; the lossy path never substitutes here.
            let text = String::from_utf8_lossy(&prefix).into_owned();
            match e.error_len() {
                // Incomplete sequence at the end; wait for more bytes.
                None => (text, None),
                Some(_) => (
                    text,
                    Some(ChatError::Transport("invalid UTF-8 in response body".into())),
                ),
            }
        }
    }
}

impl<S, E> Stream for TextStreamReader<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    type Item = Result<String, ChatError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(err) = this.queued_error.take() {
                *this.done = true;
                return Poll::Ready(Some(Err(err)));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) => {
                    this.carry.extend_from_slice(&chunk);
                    let (text, error) = drain_valid(this.carry);
                    *this.queued_error = error;
                    if !text.is_empty() {
                        return Poll::Ready(Some(Ok(text)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.queued_error = Some(ChatError::Network(e.to_string()));
                }
                Poll::Ready(None) => {
                    if !this.carry.is_empty() {
                        *this.queued_error = Some(ChatError::Transport(format!(
                            "body ended inside a UTF-8 sequence ({} dangling bytes)",
                            this.carry.len()
                        )));
                        this.carry.clear();
                    } else {
                        *this.done = true;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    type Chunk = Result<Bytes, std::io::Error>;

    fn ok(bytes: &[u8]) -> Chunk {
        Ok(Bytes::copy_from_slice(bytes))
    }

    async fn drain(chunks: Vec<Chunk>) -> Vec<Result<String, ChatError>> {
        TextStreamReader::new(futures::stream::iter(chunks)).collect().await
    }

    #[tokio::test]
    async fn passes_ascii_chunks_through() {
        let out = drain(vec![ok(b"Hel"), ok(b"lo")]).await;
        let texts: Vec<String> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn multibyte_char_split_across_chunks() {
        let bytes = "héllo 👋".as_bytes();
        // Cut inside 'é' and inside the emoji.
        let out = drain(vec![ok(&bytes[..2]), ok(&bytes[2..9]), ok(&bytes[9..])]).await;
        let joined: String = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(joined, "héllo 👋");
    }

    #[tokio::test]
    async fn chunk_holding_only_a_partial_char_yields_nothing_yet() {
        let euro = "€".as_bytes();
        let out = drain(vec![ok(&euro[..1]), ok(&euro[1..2]), ok(&euro[2..])]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_deref().unwrap(), "€");
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let out = drain(vec![ok(b""), ok(b"a"), ok(b"")]).await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn network_error_after_text_delivers_text_first() {
        let out = drain(vec![
            ok(b"Par"),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            ok(b"never"),
        ])
        .await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "Par");
        assert!(matches!(&out[1], Err(ChatError::Network(m)) if m.contains("reset")));
    }

    #[tokio::test]
    async fn invalid_utf8_yields_valid_prefix_then_transport_error() {
        let out = drain(vec![ok(b"ok\xffrest"), ok(b"more")]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_deref().unwrap(), "ok");
        assert!(matches!(&out[1], Err(ChatError::Transport(_))));
    }

    #[tokio::test]
    async fn truncated_sequence_at_end_is_transport_error() {
        let euro = "€".as_bytes();
        let mut first = b"a".to_vec();
        first.extend_from_slice(&euro[..2]);
        let out = drain(vec![ok(&first)]).await;
        assert_eq!(out[0].as_deref().unwrap(), "a");
        assert!(matches!(&out[1], Err(ChatError::Transport(m)) if m.contains("2 dangling")));
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn empty_body_ends_cleanly() {
        assert!(drain(Vec::new()).await.is_empty());
    }
}
