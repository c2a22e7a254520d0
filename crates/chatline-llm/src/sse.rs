//! Line-buffered Server-Sent Events decoding for streamed model responses.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tracing::warn;

use chatline_core::GatewayError;

/// Yield the payload of every `data:` line in `byte_stream`.
///
/// Comments, blank lines and `[DONE]` markers are skipped. A trailing line
/// without a newline is still processed when the stream ends. A transport
/// error, or no bytes for `idle_timeout`, yields one `StreamInterrupted` and
/// ends the stream.
pub fn data_lines<S, E>(
    byte_stream: S,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<String, GatewayError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        warn!(bytes = line_bytes.len(), "skipping SSE line with invalid UTF-8");
                        continue;
                    };
                    if let Some(data) = extract_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match tokio::time::timeout(idle_timeout, stream.next()).await {
                    Ok(Some(Ok(chunk))) => buffer.extend_from_slice(&chunk),
                    Ok(Some(Err(e))) => {
                        let err = GatewayError::StreamInterrupted(e.to_string());
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    Ok(None) => {
                        let rest = std::str::from_utf8(&buffer).ok().and_then(extract_data);
                        buffer.clear();
                        return rest.map(|data| (Ok(data), (stream, buffer, true)));
                    }
                    Err(_) => {
                        let err = GatewayError::StreamInterrupted(format!(
                            "idle timeout after {}s",
                            idle_timeout.as_secs()
                        ));
                        return Some((Err(err), (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

fn extract_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(90);

    fn chunks(
        parts: &[&str],
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static {
        let owned: Vec<Result<Bytes, std::io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(owned)
    }

    async fn collect(stream: impl Stream<Item = Result<String, GatewayError>>) -> Vec<String> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn extracts_data_lines() {
        let out = collect(data_lines(chunks(&["data: {\"a\":1}\n\ndata: {\"b\":2}\n\n"]), IDLE)).await;
        assert_eq!(out, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[tokio::test]
    async fn lines_split_across_chunks() {
        let out = collect(data_lines(chunks(&["da", "ta: hel", "lo\r\n", "\r\n"]), IDLE)).await;
        assert_eq!(out, vec!["hello"]);
    }

    #[tokio::test]
    async fn skips_comments_blank_and_done() {
        let out = collect(data_lines(
            chunks(&[": keepalive\n", "event: message\n", "data: [DONE]\n", "data:x\n"]),
            IDLE,
        ))
        .await;
        assert_eq!(out, vec!["x"]);
    }

    #[tokio::test]
    async fn trailing_line_without_newline() {
        let out = collect(data_lines(chunks(&["data: one\n", "data: two"]), IDLE)).await;
        assert_eq!(out, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn transport_error_ends_with_stream_interrupted() {
        let parts: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from("data: a\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Bytes::from("data: never\n")),
        ];
        let items: Vec<_> = data_lines(futures::stream::iter(parts), IDLE).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "a");
        assert!(matches!(&items[1], Err(GatewayError::StreamInterrupted(m)) if m.contains("reset")));
    }

    #[tokio::test]
    async fn idle_timeout_fires_when_no_data() {
        tokio::time::pause();
        let pending = futures::stream::pending::<Result<Bytes, std::io::Error>>();
        let mut stream = Box::pin(data_lines(pending, Duration::from_secs(5)));
        let item = stream.next().await;
        assert!(
            matches!(&item, Some(Err(GatewayError::StreamInterrupted(m))) if m.contains("idle timeout")),
            "got: {item:?}"
        );
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn idle_timer_resets_on_data() {
        tokio::time::pause();
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(4);
        let mut stream = Box::pin(data_lines(
            tokio_stream::wrappers::ReceiverStream::new(rx),
            Duration::from_secs(5),
        ));

        tx.send(Ok(Bytes::from("data: ping\n"))).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "ping");

        tokio::time::advance(Duration::from_secs(4)).await;
        tx.send(Ok(Bytes::from("data: pong\n"))).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "pong");

        drop(tx);
        assert!(stream.next().await.is_none());
    }
}
