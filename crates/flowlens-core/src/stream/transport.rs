//! HTTP transport: POST a run request and expose the response as frames.

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::frame::FrameStream;
use super::{StreamError, StreamErrorKind, StreamResult};

/// Body of a run request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Workflow graph forwarded verbatim to the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Value>,
}

pub type ByteStream = BoxStream<'static, reqwest::Result<Bytes>>;

/// Starts a run and returns its frame stream.
///
/// # Errors
/// `HttpStatus` for a non-success response, `Timeout` for connect/timeout
/// failures, `Transport` for anything else reqwest reports.
pub async fn open_stream(
    client: &reqwest::Client,
    url: &str,
    request: &RunRequest,
) -> StreamResult<FrameStream<ByteStream>> {
    debug!(%url, "opening execution stream");
    let response = client
        .post(url)
        .headers(build_headers())
        .json(request)
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        return Err(StreamError::http_status(status.as_u16(), &error_body));
    }

    let byte_stream: ByteStream = response.bytes_stream().boxed();
    Ok(FrameStream::new(byte_stream))
}

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

fn classify_reqwest_error(e: reqwest::Error) -> StreamError {
    if e.is_timeout() {
        StreamError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        StreamError::timeout(format!("Connection failed: {e}"))
    } else if e.is_status() {
        StreamError::new(StreamErrorKind::HttpStatus, format!("Request error: {e}"))
    } else {
        StreamError::transport(format!("Network error: {e}"))
    }
}
