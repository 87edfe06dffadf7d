//! Incremental consumption of streamed chat completions.
//!
//! Streaming responses arrive as server-sent events, one JSON chunk per
//! `data:` line, terminated by a `[DONE]` sentinel and the server closing
//! the connection.

use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};

use crate::compat::{raw_completion, Request};

/// Upper bound on buffered bytes awaiting a line break. A single delta is
/// a few tokens of text; anything near this size is a broken stream.
pub const MAX_EVENT_BUFFER: usize = 1_048_576;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub delta: Delta,
    #[serde(default)]
    pub index: Option<i32>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Chunk {
    /// Content delta of the first candidate, when this chunk carries one.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
            .filter(|content| !content.is_empty())
    }
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum DecodeError {
    #[error("event buffer overflow: {0} bytes exceeds maximum {MAX_EVENT_BUFFER}")]
    BufferOverflow(usize),
}

/// Reassembles `data:` payloads from raw network bytes.
///
/// Network chunk boundaries do not respect event boundaries, so bytes
/// accumulate until a line break lands. Blank separator lines, non-data
/// fields, and the `[DONE]` sentinel are swallowed.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning the payloads the bytes completed (possibly
    /// none, possibly several).
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, DecodeError> {
        if self.buffer.len() + bytes.len() > MAX_EVENT_BUFFER {
            return Err(DecodeError::BufferOverflow(self.buffer.len() + bytes.len()));
        }
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            payloads.push(data.to_string());
        }

        Ok(payloads)
    }
}

/// One round trip with `stream: true`: POST the request, hand back the lazy
/// chunk sequence. Chunks surface in arrival order; dropping the stream
/// closes the connection.
#[tracing::instrument(skip_all)]
pub async fn completion(
    base_url: &str,
    api_key: &str,
    request: &Request,
) -> Result<impl Stream<Item = Result<Chunk, anyhow::Error>>, anyhow::Error> {
    let request = request.clone().streamed();

    let response = raw_completion(
        &format!("{base_url}/chat/completions"),
        Some(api_key),
        &serde_json::to_value(request)?,
    )
    .await?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        anyhow::bail!("API error: {status} - {text}");
    }

    let mut decoder = SseDecoder::new();
    let chunks = response
        .bytes_stream()
        .map(move |bytes| match bytes {
            Ok(bytes) => match decoder.feed(&bytes) {
                Ok(payloads) => {
                    let parsed: Vec<Result<Chunk, anyhow::Error>> = payloads
                        .iter()
                        .map(|data| {
                            serde_json::from_str::<Chunk>(data).map_err(anyhow::Error::from)
                        })
                        .collect();
                    stream::iter(parsed)
                }
                Err(e) => stream::iter(vec![Err(e.into())]),
            },
            Err(e) => stream::iter(vec![Err(e.into())]),
        })
        .flatten();

    Ok(chunks)
}
