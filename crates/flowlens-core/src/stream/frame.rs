//! Frame decoding for the execution event stream.
//!
//! Chunks arrive with no alignment to message boundaries. Bytes are buffered
//! until a blank-line delimiter (`\n\n` or `\r\n\r\n`, whichever comes first)
//! and everything before it becomes one frame. Buffering is byte-level so a
//! multi-byte character split across chunks is reassembled before decoding.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tracing::debug;

use super::{StreamError, StreamResult};

/// Payload that marks the end of the stream.
pub const COMPLETION_SENTINEL: &str = "[DONE]";

/// Prefix of the payload the server sends when the run failed.
pub const ERROR_SENTINEL_PREFIX: &str = "[ERROR]";

/// One complete, delimited unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Joined `data:` payload, not yet classified.
    Data(String),
    /// Completion sentinel.
    Done,
    /// Error sentinel with the server's message.
    ServerError(String),
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Done | Frame::ServerError(_))
    }
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk to the buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Returns the next complete frame, skipping frames without a `data:` line.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            let (pos, delim_len) = find_double_newline(&self.buffer)?;

            let chunk = self.buffer.drain(..pos).collect::<Vec<u8>>();
            self.buffer.drain(..delim_len); // remove "\n\n" or "\r\n\r\n"

            let text = String::from_utf8_lossy(&chunk);
            if let Some(frame) = parse_frame(&text) {
                return Some(frame);
            }
        }
    }

    /// Flushes a trailing frame that was never delimited.
    ///
    /// Called once the transport closes; the buffer is empty afterwards.
    pub fn finish(&mut self) -> Option<Frame> {
        if let Some(frame) = self.next_frame() {
            return Some(frame);
        }
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        parse_frame(&String::from_utf8_lossy(&rest))
    }

    /// Bytes buffered but not yet emitted.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Finds the position of a double newline in the buffer.
/// Handles both LF (\n\n) and CRLF (\r\n\r\n) line endings.
/// Returns the position and the length of the delimiter (2 or 4 bytes).
fn find_double_newline(buffer: &[u8]) -> Option<(usize, usize)> {
    let crlf_pos = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    let lf_pos = buffer.windows(2).position(|w| w == b"\n\n");

    match (crlf_pos, lf_pos) {
        (Some(c), Some(l)) => {
            if l <= c {
                Some((l, 2))
            } else {
                Some((c, 4))
            }
        }
        (Some(c), None) => Some((c, 4)),
        (None, Some(l)) => Some((l, 2)),
        (None, None) => None,
    }
}

fn parse_frame(raw: &str) -> Option<Frame> {
    let data_lines: Vec<&str> = raw
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();

    if data_lines.is_empty() {
        debug!(frame = %raw, "dropping frame without data line");
        return None;
    }

    let data = data_lines.join("\n");
    let trimmed = data.trim();
    if trimmed.is_empty() {
        debug!("dropping frame with empty data");
        return None;
    }
    if trimmed == COMPLETION_SENTINEL {
        return Some(Frame::Done);
    }
    if let Some(rest) = trimmed.strip_prefix(ERROR_SENTINEL_PREFIX) {
        let message = rest.trim_start_matches(':').trim();
        return Some(Frame::ServerError(message.to_string()));
    }
    Some(Frame::Data(data))
}

/// Adapts a byte stream into a lazy stream of frames.
///
/// A new `FrameStream` is built per session; frames never carry over.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    exhausted: bool,
}

impl<S> FrameStream<S> {
    pub fn new(stream: S) -> Self {
        Self {
            inner: stream,
            decoder: FrameDecoder::new(),
            exhausted: false,
        }
    }
}

impl<S, E> Stream for FrameStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = StreamResult<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.exhausted {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.decoder.push(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.exhausted = true;
                    return Poll::Ready(Some(Err(StreamError::transport(format!(
                        "Stream error: {e}"
                    )))));
                }
                Poll::Ready(None) => {
                    self.exhausted = true;
                    return Poll::Ready(self.decoder.finish().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::stream::StreamErrorKind;

    const STREAM: &str = "data: {\"event_type\":\"node_start\",\"node_id\":\"a\"}\n\n\
data: {\"event_type\":\"node_output\",\"node_id\":\"a\",\"data\":\"h\u{e9}llo \u{1f44b}\"}\r\n\r\n\
: keepalive\n\n\
event: message\ndata: first\ndata: second\n\n\
data: [DONE]\n\n";

    fn decode_all(chunks: &[&[u8]]) -> Vec<Frame> {
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for chunk in chunks {
            decoder.push(chunk);
            while let Some(frame) = decoder.next_frame() {
                frames.push(frame);
            }
        }
        frames.extend(decoder.finish());
        frames
    }

    fn mock_byte_stream(
        data: &str,
        chunk_size: usize,
    ) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        futures_util::stream::iter(chunks)
    }

    #[test]
    fn test_decodes_lf_crlf_and_multiline_frames() {
        let frames = decode_all(&[STREAM.as_bytes()]);

        assert_eq!(frames.len(), 4);
        assert_eq!(
            frames[0],
            Frame::Data(r#"{"event_type":"node_start","node_id":"a"}"#.to_string())
        );
        assert!(matches!(&frames[1], Frame::Data(data) if data.contains("h\u{e9}llo \u{1f44b}")));
        assert_eq!(frames[2], Frame::Data("first\nsecond".to_string()));
        assert_eq!(frames[3], Frame::Done);
    }

    #[test]
    fn test_chunk_boundaries_do_not_change_frames() {
        let bytes = STREAM.as_bytes();
        let whole = decode_all(&[bytes]);

        for split in 0..=bytes.len() {
            let (left, right) = bytes.split_at(split);
            assert_eq!(decode_all(&[left, right]), whole, "split at {split}");
        }

        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&singles), whole);
    }

    #[test]
    fn test_earliest_delimiter_wins() {
        let frames = decode_all(&[b"data: one\n\ndata: two\r\n\r\ndata: three\n\n"]);
        assert_eq!(
            frames,
            vec![
                Frame::Data("one".to_string()),
                Frame::Data("two".to_string()),
                Frame::Data("three".to_string()),
            ]
        );
    }

    #[test]
    fn test_frame_without_data_is_dropped() {
        let frames = decode_all(&[b"event: ping\nid: 4\n\ndata: ok\n\n"]);
        assert_eq!(frames, vec![Frame::Data("ok".to_string())]);
    }

    #[test]
    fn test_error_sentinel_keeps_message() {
        let frames = decode_all(&[b"data: [ERROR] agent crashed: out of memory\n\n"]);
        assert_eq!(
            frames,
            vec![Frame::ServerError(
                "agent crashed: out of memory".to_string()
            )]
        );
        assert!(frames[0].is_terminal());
    }

    #[test]
    fn test_data_without_space_after_colon() {
        let frames = decode_all(&[b"data:{\"a\":1}\n\n"]);
        assert_eq!(frames, vec![Frame::Data("{\"a\":1}".to_string())]);
    }

    #[test]
    fn test_finish_flushes_undelimited_tail() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"data: tail");
        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.pending_len(), 10);
        assert_eq!(decoder.finish(), Some(Frame::Data("tail".to_string())));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_frame_stream_handles_utf8_split_across_chunks() {
        let data = "data: caf\u{e9} \u{1f44b}\n\n";
        let bytes = data.as_bytes();
        let emoji_start = bytes
            .windows(4)
            .position(|w| w == [0xF0, 0x9F, 0x91, 0x8B])
            .expect("emoji not found");
        let split_point = emoji_start + 2;

        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::copy_from_slice(&bytes[..split_point])),
            Ok(Bytes::copy_from_slice(&bytes[split_point..])),
        ];
        let mut frames = FrameStream::new(futures_util::stream::iter(chunks));

        let frame = frames.next().await.unwrap().expect("valid frame");
        assert_eq!(frame, Frame::Data("caf\u{e9} \u{1f44b}".to_string()));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_frame_stream_small_chunks() {
        let mut frames = FrameStream::new(mock_byte_stream(STREAM, 7));
        let mut collected = Vec::new();
        while let Some(frame) = frames.next().await {
            collected.push(frame.expect("valid frame"));
        }
        assert_eq!(collected, decode_all(&[STREAM.as_bytes()]));
    }

    #[tokio::test]
    async fn test_frame_stream_surfaces_transport_error() {
        let chunks: Vec<std::result::Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
        ];
        let mut frames = FrameStream::new(futures_util::stream::iter(chunks));

        assert_eq!(
            frames.next().await.unwrap().unwrap(),
            Frame::Data("one".to_string())
        );
        let err = frames.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind, StreamErrorKind::Transport);
        assert!(frames.next().await.is_none());
    }
}
