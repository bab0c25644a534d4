use futures::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::llm::tool_calls::{ToolCallAccumulator, ToolCallInvocation};
use crate::llm::types::ChatStreamChunk;

const DATA_PREFIX: &str = "data: ";
const DONE_LINE: &str = "data: [DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    ToolCall(ToolCallInvocation),
    End,
}

/// Incremental SSE decoder.
///
/// Bytes are buffered until a newline so a frame split across reads (or a
/// multi-byte character split across reads) decodes the same as if it had
/// arrived whole. Chunks come out in frame order.
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
    tool_calls: ToolCallAccumulator,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        let mut start = 0usize;
        while let Some(pos) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            let line = String::from_utf8_lossy(&self.buf[start..end]).into_owned();
            start = end + 1;
            self.handle_line(&line, &mut out);
        }
        // retain tail
        if start > 0 {
            self.buf.drain(..start);
        }
        out
    }

    /// Called once the byte source is exhausted.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.handle_line(&line, &mut out);
        }
        if let Some(dropped) = self.tool_calls.take_in_flight() {
            warn!(name = %dropped.name, id = %dropped.id, "stream ended with an incomplete tool call");
        }
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<StreamChunk>) {
        if line.trim() == DONE_LINE {
            if let Some(call) = self.tool_calls.take_in_flight() {
                out.push(StreamChunk::ToolCall(call));
            }
            out.push(StreamChunk::End);
            return;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };

        debug!(response_chunk = %payload, "sse frame");

        let chunk = match serde_json::from_str::<ChatStreamChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(err = %e, payload, "failed to parse stream chunk");
                return;
            }
        };
        let Some(delta) = chunk.first_delta() else {
            return;
        };

        if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
            out.push(StreamChunk::Content(text.to_string()));
        } else if let Some(call_delta) = delta.tool_calls.as_ref().and_then(|c| c.first()) {
            if let Some(done) = self.tool_calls.feed(call_delta) {
                out.push(StreamChunk::ToolCall(done));
            }
        }
    }
}

/// Adapts a byte stream (e.g. `reqwest::Response::bytes_stream`) into chunks.
///
/// A read error ends the stream; it is logged rather than surfaced.
pub fn chunk_stream<S, B, E>(bytes: S) -> impl Stream<Item = StreamChunk>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    async_stream::stream! {
        futures::pin_mut!(bytes);
        let mut parser = FrameParser::new();
        while let Some(next) = bytes.next().await {
            match next {
                Ok(b) => {
                    for chunk in parser.push(b.as_ref()) {
                        yield chunk;
                    }
                }
                Err(e) => {
                    error!(err = %e, "error reading chunk from byte stream");
                    break;
                }
            }
        }
        for chunk in parser.finish() {
            yield chunk;
        }
    }
}
