//! Server-Sent Events line parser for streaming responses
//!
//! Buffers chunked bytes, splits on newlines and yields the payload of every
//! `data:` line. Comments, blank lines, `event:` lines and `[DONE]` markers
//! are skipped.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Parse `data:` payloads out of a byte stream.
///
/// A transport error ends the stream with that error as its last item.
pub fn parse_sse_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
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
                        continue;
                    };

                    if let Some(data) = extract_sse_data(line) {
                        return Some((Ok(data), (stream, buffer, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        tracing::warn!("SSE stream read error");
                        return Some((Err(e), (stream, buffer, true)));
                    }
                    None => {
                        // Trailing line without a newline terminator
                        if !buffer.is_empty() {
                            let data = std::str::from_utf8(&buffer)
                                .ok()
                                .and_then(|line| extract_sse_data(line.trim()));
                            buffer.clear();
                            if let Some(data) = data {
                                return Some((Ok(data), (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract the data payload from one SSE line
fn extract_sse_data(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}
