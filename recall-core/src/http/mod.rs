//! HTTP client module for forwarding requests to the upstream provider
//!
//! This module implements the HTTP layer of the proxy, handling:
//! - Connection pooling and client management
//! - Authentication and provider identification headers
//! - 429-aware retry with cancellable backoff
//! - Streaming and buffered response delivery
//! - Request ID generation and correlation

pub mod client;
pub mod error;
pub mod streaming;

pub use client::ProxyClient;
pub use streaming::{relay_stream, RelaySummary, ResponseStream};

use bytes::Bytes;
use reqwest::Method;
use std::time::Duration;
use uuid::Uuid;

/// Type of API call being made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Chat completion request
    Chat,
    /// Model listing
    Models,
}

impl CallKind {
    /// Get the endpoint path for this call kind
    pub fn endpoint(&self) -> &'static str {
        match self {
            CallKind::Chat => "/chat/completions",
            CallKind::Models => "/models",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            CallKind::Chat => Method::POST,
            CallKind::Models => Method::GET,
        }
    }
}

/// Options for an HTTP request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Type of API call
    pub call_kind: CallKind,

    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Per-attempt timeout
    pub timeout: Duration,

    /// Whether the caller expects an event stream
    pub streaming: bool,
}

impl RequestOptions {
    /// Create new request options with a generated request ID
    pub fn new(call_kind: CallKind, timeout: Duration) -> Self {
        Self {
            call_kind,
            request_id: Uuid::new_v4(),
            timeout,
            streaming: false,
        }
    }

    /// Mark the request as streaming
    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }
}

/// Response handed back to the caller, chosen by the request's streaming flag
#[derive(Debug)]
pub enum UpstreamResponse {
    /// Incrementally readable body; owns the attempt's timeout context
    Streaming(ResponseStream),
    /// Fully read body
    Buffered(Bytes),
}

impl UpstreamResponse {
    pub fn is_streaming(&self) -> bool {
        matches!(self, UpstreamResponse::Streaming(_))
    }

    /// Buffered body, if this is not a stream
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            UpstreamResponse::Buffered(bytes) => Some(bytes),
            UpstreamResponse::Streaming(_) => None,
        }
    }

    /// Stream handle, if this is a stream
    pub fn into_stream(self) -> Option<ResponseStream> {
        match self {
            UpstreamResponse::Streaming(stream) => Some(stream),
            UpstreamResponse::Buffered(_) => None,
        }
    }
}
