//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::{redact_by_field_name, SafeLogging, SecretString};
use crate::enrichment::composer::DEFAULT_MAX_CONTEXT_TOKENS;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Schema version (required - no default)
    pub version: String,

    /// Upstream chat-completion provider
    pub upstream: UpstreamConfig,

    /// Enrichment pipeline settings
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// Upstream provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Provider name, used in logs
    #[serde(default = "default_upstream_name")]
    pub name: String,

    /// Base URL of the OpenAI-compatible API (e.g. `https://openrouter.ai/api/v1`)
    pub base_url: String,

    /// API key (supports environment variable interpolation)
    pub api_key: SecretString,

    /// Sent as `HTTP-Referer` for provider-side app identification
    #[serde(default)]
    pub app_url: Option<String>,

    /// Sent as `X-Title` for provider-side app identification
    #[serde(default)]
    pub app_title: Option<String>,

    /// Additional headers attached to every upstream request
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,

    /// Per-attempt timeout for non-streaming calls, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Per-attempt timeout for streaming calls, in milliseconds
    #[serde(default = "default_stream_timeout")]
    pub stream_timeout_ms: u64,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Largest buffered response body accepted, in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Retry policy for rate-limited calls
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl UpstreamConfig {
    /// Configuration with defaults for everything but the endpoint and key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<SecretString>) -> Self {
        Self {
            name: default_upstream_name(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            app_url: None,
            app_title: None,
            extra_headers: BTreeMap::new(),
            request_timeout_ms: default_request_timeout(),
            stream_timeout_ms: default_stream_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            max_idle_per_host: default_max_idle(),
            max_response_bytes: default_max_response_bytes(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, stream: Duration) -> Self {
        self.request_timeout_ms = request.as_millis() as u64;
        self.stream_timeout_ms = stream.as_millis() as u64;
        self
    }

    pub fn with_app_identity(mut self, url: impl Into<String>, title: impl Into<String>) -> Self {
        self.app_url = Some(url.into());
        self.app_title = Some(title.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate upstream configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::required(format!("{}.api_key", path)));
        }

        if self.base_url.is_empty() {
            return Err(ValidationError::required(format!("{}.base_url", path)));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::new(
                        format!("{}.base_url", path),
                        ValidationErrorKind::InvalidUrl {
                            message: format!(
                                "URL scheme must be http or https, got: {}",
                                url.scheme()
                            ),
                        },
                    ));
                }
            }
            Err(e) => {
                return Err(ValidationError::new(
                    format!("{}.base_url", path),
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                ));
            }
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.request_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.stream_timeout_ms < self.request_timeout_ms {
            return Err(ValidationError::new(
                format!("{}.stream_timeout_ms", path),
                ValidationErrorKind::Incompatible {
                    message: "Must be >= request_timeout_ms".to_string(),
                },
            ));
        }

        if self.max_response_bytes == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_response_bytes", path),
                "Must be greater than 0",
            ));
        }

        self.retry.validate(&format!("{}.retry", path))
    }
}

impl SafeLogging for UpstreamConfig {
    fn safe_for_logging(&self) -> String {
        let headers: Vec<String> = self
            .extra_headers
            .iter()
            .map(|(k, v)| format!("{}={}", k, redact_by_field_name(k, v)))
            .collect();
        format!(
            "{} at {} (key: {}, headers: [{}], max_attempts: {})",
            self.name,
            self.base_url,
            self.api_key.partial_redact(),
            headers.join(", "),
            self.retry.max_attempts
        )
    }
}

/// Enrichment pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    /// Budget for injected context, in estimated tokens
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Number of chunks kept after reranking
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Over-fetch factor for the candidate pool handed to the reranker
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Time budget for intent extraction, in milliseconds
    #[serde(default = "default_intent_timeout")]
    pub intent_timeout_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            top_k: default_top_k(),
            candidate_multiplier: default_candidate_multiplier(),
            intent_timeout_ms: default_intent_timeout(),
        }
    }
}

impl EnrichmentConfig {
    /// Size of the over-fetched candidate pool
    pub fn candidate_pool_size(&self) -> usize {
        self.top_k.saturating_mul(self.candidate_multiplier.max(1))
    }

    pub fn intent_timeout(&self) -> Duration {
        Duration::from_millis(self.intent_timeout_ms)
    }

    /// Validate enrichment configuration
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.top_k == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.top_k", path),
                "Must be greater than 0",
            ));
        }

        if self.candidate_multiplier == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.candidate_multiplier", path),
                "Must be greater than 0",
            ));
        }

        if self.intent_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.intent_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

// Default value functions for serde
fn default_upstream_name() -> String { "upstream".to_string() }
fn default_request_timeout() -> u64 { 60_000 }
fn default_stream_timeout() -> u64 { 300_000 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_max_idle() -> usize { 10 }
fn default_max_response_bytes() -> usize { 10 * 1024 * 1024 }
fn default_max_context_tokens() -> usize { DEFAULT_MAX_CONTEXT_TOKENS }
fn default_top_k() -> usize { 5 }
fn default_candidate_multiplier() -> usize { 4 }
fn default_intent_timeout() -> u64 { 2_000 }

impl RecallConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        // Currently support only version 0.1
        if self.version != "0.1" {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: "0.1".to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        self.upstream.validate("upstream")?;
        self.enrichment.validate("enrichment")
    }
}
