//! Client side of the streaming bridge: decodes the relay's byte stream
//! into frames and folds them into a progressively assembled message.
//!
//! This is the same loop the browser runs (fetch reader + TextDecoder);
//! having it in Rust lets the session layer and the integration tests
//! exercise the wire contract end to end.

pub mod session;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use uuid::Uuid;

use crate::web::models::{Role, StreamEvent, DONE_SENTINEL, FRAME_PREFIX};

/// The accumulator one relay call writes into. Created empty when the call
/// begins; mutated only by appending fragments and, on the terminal
/// sentinel, setting the completion flag.
#[derive(Debug, Clone)]
pub struct AssembledMessage {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

impl AssembledMessage {
    pub fn new(role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: String::new(),
            complete: false,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsumeError {
    /// The stream ended cleanly but no frame was ever observed.
    #[error("no data received from server")]
    NoData,
    /// Frames were seen but the stream ended without the terminal sentinel.
    #[error("stream ended before the terminal sentinel")]
    Incomplete,
    /// The relay reported an upstream failure as an error event.
    #[error("relay error: {0}")]
    Upstream(String),
    /// The underlying read failed.
    #[error("stream read failed: {0}")]
    Read(String),
}

/// Decode the largest valid UTF-8 prefix of `pending`, leaving an
/// incomplete trailing sequence buffered for the next read. Invalid bytes
/// are replaced rather than aborting the stream.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(n) => {
                        out.push('\u{FFFD}');
                        pending.drain(..valid + n);
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

/// Consume a relay byte stream into `message`, calling `on_update` after
/// every mutation so a rendering layer can observe progress.
///
/// Frames are applied strictly in receipt order. Lines without the frame
/// prefix are ignored, as are frame bodies that fail to parse; an
/// unterminated frame is not re-buffered across reads, so a body split at
/// a read boundary is dropped rather than recovered. On any failure the
/// partial `message` is left as-is for the caller.
pub async fn consume_with<S, E>(
    mut stream: S,
    message: &mut AssembledMessage,
    mut on_update: impl FnMut(&AssembledMessage),
) -> Result<(), ConsumeError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut line_buffer = String::new();
    let mut saw_frame = false;

    while let Some(read) = stream.next().await {
        let bytes = read.map_err(|e| ConsumeError::Read(e.to_string()))?;
        pending.extend_from_slice(&bytes);
        line_buffer.push_str(&drain_utf8(&mut pending));

        // Only complete lines are processed; a trailing partial line waits
        // for the next read.
        while let Some(pos) = line_buffer.find('\n') {
            let line: String = line_buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            let Some(body) = line.strip_prefix(FRAME_PREFIX) else {
                continue;
            };
            saw_frame = true;

            if body == DONE_SENTINEL {
                message.complete = true;
                on_update(message);
                return Ok(());
            }

            match serde_json::from_str::<StreamEvent>(body) {
                Ok(StreamEvent::Text { content }) if !content.is_empty() => {
                    message.content.push_str(&content);
                    on_update(message);
                }
                Ok(StreamEvent::Text { .. }) => {}
                Ok(StreamEvent::Error { message: m }) => {
                    return Err(ConsumeError::Upstream(m));
                }
                Err(_) => {
                    // Malformed frame body; skip it and keep the stream
                    // alive.
                }
            }
        }
    }

    if saw_frame {
        Err(ConsumeError::Incomplete)
    } else {
        Err(ConsumeError::NoData)
    }
}

/// [`consume_with`] without an observer.
pub async fn consume<S, E>(stream: S, message: &mut AssembledMessage) -> Result<(), ConsumeError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    consume_with(stream, message, |_| {}).await
}
