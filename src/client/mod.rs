//! Client-side turn dispatch and reply consumption.
//!
//! One in-flight turn at a time (the guard lives in
//! [`crate::core::conversation::Conversation`]); the dispatcher's job
//! is to carry an accepted turn to the relay and feed the reply back
//! through a channel as it arrives, in either transport shape.

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::api::{ChatReply, ChatRequest, ErrorReply};

pub mod files;
pub mod voice;

/// Messages the reply reader emits toward the UI loop. `End` always
/// follows the last `Chunk` or `Error` for a given turn.
#[derive(Clone, Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(String),
    End,
}

pub struct TurnParams {
    pub client: reqwest::Client,
    pub endpoint: String,
    pub request: ChatRequest,
    pub cancel_token: tokio_util::sync::CancellationToken,
    pub stream_id: u64,
}

#[derive(Clone)]
pub struct TurnDispatcher {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl TurnDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Submit one turn to the relay on a background task. The response
    /// is consumed according to its shape: a JSON payload arrives as a
    /// single chunk, a chunked text body arrives incrementally.
    pub fn spawn_turn(&self, params: TurnParams) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let TurnParams {
                client,
                endpoint,
                request,
                cancel_token,
                stream_id,
            } = params;

            tokio::select! {
                _ = run_turn(client, endpoint, request, tx.clone(), stream_id) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id));
    }
}

async fn run_turn(
    client: reqwest::Client,
    endpoint: String,
    request: ChatRequest,
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
) {
    let response = match client.post(&endpoint).json(&request).send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send((StreamMessage::Error(e.to_string()), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }
    };

    if !response.status().is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let _ = tx.send((StreamMessage::Error(extract_error(&body)), stream_id));
        let _ = tx.send((StreamMessage::End, stream_id));
        return;
    }

    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        // Buffered deployment: parse once, deliver as one chunk.
        match response.json::<ChatReply>().await {
            Ok(reply) => {
                let _ = tx.send((StreamMessage::Chunk(reply.content), stream_id));
            }
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(e.to_string()), stream_id));
            }
        }
        let _ = tx.send((StreamMessage::End, stream_id));
        return;
    }

    // Incremental deployment: chunked text/plain. Chunk boundaries may
    // split multi-byte characters, so decode through a carry buffer.
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                buffer.extend_from_slice(&bytes);
                if let Some(text) = drain_valid_utf8(&mut buffer) {
                    let _ = tx.send((StreamMessage::Chunk(text), stream_id));
                }
            }
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(e.to_string()), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        }
    }

    if !buffer.is_empty() {
        let text = String::from_utf8_lossy(&buffer).into_owned();
        let _ = tx.send((StreamMessage::Chunk(text), stream_id));
    }
    let _ = tx.send((StreamMessage::End, stream_id));
}

/// Surface the relay's `{error}` field verbatim when the body carries
/// one, falling back to the raw body.
fn extract_error(body: &str) -> String {
    match serde_json::from_str::<ErrorReply>(body) {
        Ok(reply) if !reply.error.is_empty() => reply.error,
        _ => {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "请求失败".to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

/// Decode everything decodable out of `buffer`. A trailing partial
/// character is left for the next chunk; genuinely invalid bytes are
/// replaced with U+FFFD so one bad byte cannot stall live rendering.
fn drain_valid_utf8(buffer: &mut Vec<u8>) -> Option<String> {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(buffer) {
            Ok(text) => {
                out.push_str(text);
                buffer.clear();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(std::str::from_utf8(&buffer[..valid]).expect("prefix validated"));
                match e.error_len() {
                    Some(invalid) => {
                        out.push('\u{FFFD}');
                        buffer.drain(..valid + invalid);
                    }
                    // Truncated sequence at the tail: wait for the rest.
                    None => {
                        buffer.drain(..valid);
                        break;
                    }
                }
            }
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_carry_buffer_handles_split_characters() {
        // "结" is three bytes; split it across two chunks.
        let bytes = "结论".as_bytes();
        let mut buffer = bytes[..4].to_vec();
        let first = drain_valid_utf8(&mut buffer).unwrap();
        assert_eq!(first, "结");
        assert_eq!(buffer.len(), 1);

        buffer.extend_from_slice(&bytes[4..]);
        let second = drain_valid_utf8(&mut buffer).unwrap();
        assert_eq!(second, "论");
        assert!(buffer.is_empty());
    }

    #[test]
    fn utf8_carry_buffer_waits_on_pure_partials() {
        let bytes = "结".as_bytes();
        let mut buffer = bytes[..2].to_vec();
        assert!(drain_valid_utf8(&mut buffer).is_none());
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn invalid_bytes_are_replaced_instead_of_stalling() {
        // 0xFF can never start a UTF-8 sequence; it must not be held
        // back as a "partial character" while valid text queues behind.
        let mut buffer = vec![0xFF];
        buffer.extend_from_slice("结论".as_bytes());
        assert_eq!(drain_valid_utf8(&mut buffer).as_deref(), Some("\u{FFFD}结论"));
        assert!(buffer.is_empty());

        // Invalid byte in the middle of a chunk.
        let mut buffer = b"ok\xC0ok".to_vec();
        assert_eq!(drain_valid_utf8(&mut buffer).as_deref(), Some("ok\u{FFFD}ok"));
    }

    #[test]
    fn error_bodies_surface_the_error_field_verbatim() {
        assert_eq!(extract_error(r#"{"error":"API Key 未配置"}"#), "API Key 未配置");
        assert_eq!(extract_error("bad gateway"), "bad gateway");
        assert_eq!(extract_error(""), "请求失败");
    }
}
