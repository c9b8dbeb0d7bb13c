//! Upstream error types and handling

use crate::context::ContextError;
use serde_json::Value;
use thiserror::Error;

/// Result type for upstream operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors surfaced by the upstream client
///
/// Every failure is typed and returned; nothing is swallowed at this layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Upstream kept answering 429 until the attempt budget ran out
    #[error("Rate limit exceeded after {attempts} attempts: {body}")]
    RateLimitExhausted { attempts: u32, body: String },

    /// Non-2xx, non-429 response
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response body could not be read or decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Buffered response exceeded the configured ceiling
    #[error("Response size {size} exceeds maximum {max}")]
    ResponseTooLarge { size: usize, max: usize },

    /// Request body could not be serialized
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// Client could not be built from its configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller cancellation or deadline
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl ProviderError {
    /// HTTP status associated with the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimitExhausted { .. } => Some(429),
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExhausted { .. })
    }

    /// True for caller cancellation and deadline expiry
    pub fn is_context(&self) -> bool {
        matches!(self, Self::Context(_))
    }

    /// Human-readable message from an upstream error body
    ///
    /// Understands `{"error": {"message": ..}}`, `{"message": ..}` and
    /// `{"error": ".."}`; falls back to the raw body.
    pub fn upstream_message(&self) -> Option<String> {
        let body = match self {
            Self::RateLimitExhausted { body, .. } | Self::Upstream { body, .. } => body,
            _ => return None,
        };
        let extracted = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| extract_error_message(&json));
        Some(extracted.unwrap_or_else(|| body.clone()))
    }
}

fn extract_error_message(json: &Value) -> Option<String> {
    if let Some(message) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }
    if let Some(message) = json.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    json.get("error").and_then(Value::as_str).map(str::to_string)
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Context(ContextError::DeadlineExceeded)
        } else if err.is_connect() {
            ProviderError::Network(format!("Connection failed: {}", err))
        } else if let Some(io) = transport_io_error(&err) {
            // reqwest reports body I/O failures as decode errors when a
            // decompressor is enabled; the underlying io::Error tells them apart.
            ProviderError::Network(format!("{}: {}", err, io))
        } else if err.is_decode() || err.is_body() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// First I/O failure in the source chain that is not a malformed-payload error
fn transport_io_error(err: &reqwest::Error) -> Option<&std::io::Error> {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if !matches!(
                io.kind(),
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput
            ) {
                return Some(io);
            }
        }
        source = cause.source();
    }
    None
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}
