//! Streaming response handling
//!
//! A [`ResponseStream`] wraps the upstream body together with the attempt's
//! timeout context. It holds exactly one drop guard for that context, so the
//! context is released once, when the stream is dropped or closed, whether
//! the body was read to the end, abandoned early, or failed.

use crate::context::RequestContext;
use crate::providers::{ProviderError, ProviderResult};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::DropGuard;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upstream response body bound to its attempt context
pub struct ResponseStream {
    status: StatusCode,
    headers: HeaderMap,
    content_length: Option<u64>,
    request_id: Uuid,
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: BytesMut,
    exhausted: bool,
    ctx: RequestContext,
    _release: DropGuard,
}

impl std::fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("status", &self.status)
            .field("request_id", &self.request_id)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl ResponseStream {
    /// Wrap a successful response
    ///
    /// `release` must be the drop guard of `ctx`.
    pub(crate) fn new(
        response: reqwest::Response,
        ctx: RequestContext,
        release: DropGuard,
        request_id: Uuid,
    ) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            content_length: response.content_length(),
            request_id,
            body: response.bytes_stream().boxed(),
            buffer: BytesMut::new(),
            exhausted: false,
            ctx,
            _release: release,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Next raw body chunk, bounded by the attempt context
    pub async fn next_chunk(&mut self) -> Option<ProviderResult<Bytes>> {
        if self.exhausted {
            return None;
        }

        match self.ctx.run(self.body.next()).await {
            Ok(Some(Ok(chunk))) => Some(Ok(chunk)),
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Ok(Some(Err(e))) => {
                self.exhausted = true;
                Some(Err(ProviderError::from(e)))
            }
            Err(e) => {
                self.exhausted = true;
                Some(Err(e.into()))
            }
        }
    }

    /// Next line of the body, including its trailing `\n`
    ///
    /// Only one line is buffered at a time. A final line without a newline is
    /// returned as-is at end of body.
    pub async fn next_line(&mut self) -> Option<ProviderResult<Bytes>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                return Some(Ok(self.buffer.split_to(pos + 1).freeze()));
            }

            match self.next_chunk().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(e)),
                None if self.buffer.is_empty() => return None,
                None => return Some(Ok(self.buffer.split().freeze())),
            }
        }
    }

    /// Read the whole body, refusing anything larger than `max_bytes`
    pub async fn read_to_end(mut self, max_bytes: usize) -> ProviderResult<Bytes> {
        if let Some(length) = self.content_length {
            if length as usize > max_bytes {
                return Err(ProviderError::ResponseTooLarge {
                    size: length as usize,
                    max: max_bytes,
                });
            }
        }

        let mut body = BytesMut::with_capacity(self.content_length.unwrap_or(0) as usize);
        while let Some(chunk) = self.next_chunk().await {
            let chunk = chunk?;
            if body.len() + chunk.len() > max_bytes {
                return Err(ProviderError::ResponseTooLarge {
                    size: body.len() + chunk.len(),
                    max: max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Convert into a `Stream` of body chunks, e.g. for a server response body
    pub fn into_byte_stream(self) -> BoxStream<'static, ProviderResult<Bytes>> {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next_chunk().await.map(|item| (item, stream))
        })
        .boxed()
    }

    /// Stop reading and release the connection and the attempt context
    pub fn close(self) {
        debug!("Closing upstream stream [request_id: {}]", self.request_id);
    }
}

/// Outcome of relaying a stream downstream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySummary {
    /// Lines written downstream, not counting a synthetic error event
    pub lines: usize,

    /// Bytes written downstream, not counting a synthetic error event
    pub bytes: usize,

    /// Upstream read error that ended the relay early
    pub upstream_error: Option<String>,
}

/// SSE event reporting a mid-stream upstream failure
pub fn error_event(err: &ProviderError) -> Bytes {
    let payload = json!({
        "error": {
            "message": err.to_string(),
            "type": "upstream_stream_error",
        }
    });
    Bytes::from(format!("data: {}\n\n", payload))
}

/// Copy `stream` to `out` line by line, flushing after every line
///
/// An upstream read error is reported as a single synthetic error event and
/// ends the relay; it is not retried. Errors writing to `out` are returned.
pub async fn relay_stream<W>(stream: &mut ResponseStream, out: &mut W) -> std::io::Result<RelaySummary>
where
    W: AsyncWrite + Unpin,
{
    let mut summary = RelaySummary::default();

    while let Some(line) = stream.next_line().await {
        match line {
            Ok(line) => {
                out.write_all(&line).await?;
                out.flush().await?;
                summary.lines += 1;
                summary.bytes += line.len();
            }
            Err(e) => {
                warn!(
                    "Upstream stream failed after {} lines [request_id: {}]: {}",
                    summary.lines,
                    stream.request_id(),
                    e
                );
                out.write_all(&error_event(&e)).await?;
                out.flush().await?;
                summary.upstream_error = Some(e.to_string());
                break;
            }
        }
    }

    debug!(
        "Relayed {} lines ({} bytes) [request_id: {}]",
        summary.lines,
        summary.bytes,
        stream.request_id()
    );
    Ok(summary)
}
