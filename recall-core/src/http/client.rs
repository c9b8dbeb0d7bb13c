//! Upstream client implementation using reqwest

use crate::config::UpstreamConfig;
use crate::context::RequestContext;
use crate::http::error::classify_failure;
use crate::http::streaming::ResponseStream;
use crate::http::{CallKind, RequestOptions, UpstreamResponse};
use crate::protocol::{ChatRequest, ModelList};
use crate::providers::retry::{AttemptError, RetryExecutor};
use crate::providers::{ProviderError, ProviderResult};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default user agent
const USER_AGENT: &str = concat!("recall-proxy/", env!("CARGO_PKG_VERSION"));

/// Client for the upstream chat-completion API
///
/// Holds only immutable configuration and a pooled `reqwest::Client`, so one
/// instance can serve any number of concurrent requests.
#[derive(Clone)]
pub struct ProxyClient {
    /// The underlying reqwest client
    client: Client,

    config: UpstreamConfig,
}

impl std::fmt::Debug for ProxyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClient")
            .field("upstream", &self.config.name)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl ProxyClient {
    /// Create a new client with a pooled connection manager
    pub fn new(config: UpstreamConfig) -> ProviderResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(config: UpstreamConfig, client: Client) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// Build the full URL for a call kind
    fn build_url(&self, call_kind: CallKind) -> String {
        format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            call_kind.endpoint()
        )
    }

    /// Authentication, identification and correlation headers
    fn build_headers(&self, options: &RequestOptions) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            header_value(&format!("Bearer {}", self.config.api_key.expose_secret()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(if options.streaming {
                "text/event-stream"
            } else {
                "application/json"
            }),
        );
        headers.insert(
            HeaderName::from_static("x-request-id"),
            header_value(&options.request_id.to_string())?,
        );

        if let Some(url) = &self.config.app_url {
            headers.insert(HeaderName::from_static("http-referer"), header_value(url)?);
        }
        if let Some(title) = &self.config.app_title {
            headers.insert(HeaderName::from_static("x-title"), header_value(title)?);
        }

        for (key, value) in &self.config.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                ProviderError::Configuration(format!("Invalid header name '{}': {}", key, e))
            })?;
            headers.insert(name, header_value(value)?);
        }

        Ok(headers)
    }

    /// Forward a chat request, streaming or buffered according to its flag
    pub async fn send(
        &self,
        ctx: &RequestContext,
        request: &ChatRequest,
    ) -> ProviderResult<UpstreamResponse> {
        if request.is_streaming() {
            self.send_stream(ctx, request)
                .await
                .map(UpstreamResponse::Streaming)
        } else {
            self.send_buffered(ctx, request)
                .await
                .map(UpstreamResponse::Buffered)
        }
    }

    /// Forward a chat request and return the body as a stream
    ///
    /// The stream timeout bounds each attempt, including reading the body.
    pub async fn send_stream(
        &self,
        ctx: &RequestContext,
        request: &ChatRequest,
    ) -> ProviderResult<ResponseStream> {
        let options =
            RequestOptions::new(CallKind::Chat, self.config.stream_timeout()).streaming();
        self.execute_chat(ctx, request, &options).await
    }

    /// Forward a chat request and read the whole body
    pub async fn send_buffered(
        &self,
        ctx: &RequestContext,
        request: &ChatRequest,
    ) -> ProviderResult<Bytes> {
        let options = RequestOptions::new(CallKind::Chat, self.config.request_timeout());
        let stream = self.execute_chat(ctx, request, &options).await?;
        let body = stream.read_to_end(self.config.max_response_bytes).await?;

        info!(
            "Request completed successfully for {} ({} bytes) [request_id: {}]",
            self.config.name,
            body.len(),
            options.request_id
        );
        Ok(body)
    }

    /// List the models the upstream exposes
    ///
    /// Single attempt: any non-2xx status, including 429, is returned as-is.
    pub async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList> {
        let options = RequestOptions::new(CallKind::Models, self.config.request_timeout());
        let url = self.build_url(CallKind::Models);

        let stream = match self.attempt(ctx, &url, None, &options, 1).await {
            Ok(stream) => stream,
            Err(AttemptError::Fatal(e)) => return Err(e),
            Err(AttemptError::RateLimited(signal)) => {
                return Err(ProviderError::Upstream {
                    status: 429,
                    body: signal.body,
                })
            }
        };

        let body = stream.read_to_end(self.config.max_response_bytes).await?;
        serde_json::from_slice(&body).map_err(|e| {
            error!(
                "Failed to parse model list from {} [request_id: {}]: {}",
                self.config.name, options.request_id, e
            );
            ProviderError::Decode(format!(
                "Invalid model list: {} [request_id: {}]",
                e, options.request_id
            ))
        })
    }

    async fn execute_chat(
        &self,
        ctx: &RequestContext,
        request: &ChatRequest,
        options: &RequestOptions,
    ) -> ProviderResult<ResponseStream> {
        let body = serde_json::to_vec(request).map(Bytes::from).map_err(|e| {
            ProviderError::Serialization(format!("{} [request_id: {}]", e, options.request_id))
        })?;
        let url = self.build_url(options.call_kind);

        info!(
            "Forwarding chat request to {} (model: {}, stream: {}) [request_id: {}]",
            self.config.name, request.model, options.streaming, options.request_id
        );

        let url = url.as_str();
        RetryExecutor::new(&self.config.retry)
            .execute(ctx, |attempt| {
                let body = body.clone();
                async move { self.attempt(ctx, url, Some(body), options, attempt).await }
            })
            .await
    }

    /// One HTTP exchange under its own timeout context
    ///
    /// On success the returned stream owns the context's drop guard; on every
    /// other path the guard is dropped here.
    async fn attempt(
        &self,
        ctx: &RequestContext,
        url: &str,
        body: Option<Bytes>,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<ResponseStream, AttemptError> {
        let attempt_ctx = ctx.with_timeout(options.timeout);
        let release = attempt_ctx.drop_guard();
        let request_id = options.request_id;

        let mut builder = self
            .client
            .request(options.call_kind.method(), url)
            .headers(self.build_headers(options)?);
        if let Some(body) = body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        debug!(
            "Attempt {} to {} [request_id: {}]",
            attempt, url, request_id
        );

        let response = match attempt_ctx.run(builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(
                    "Request error for {} [request_id: {}]: {}",
                    self.config.name, request_id, e
                );
                return Err(ProviderError::from(e).into());
            }
            Err(e) => {
                warn!(
                    "Request to {} ended before a response: {} [request_id: {}]",
                    self.config.name, e, request_id
                );
                return Err(ProviderError::from(e).into());
            }
        };

        let status = response.status();
        debug!("Response status: {} [request_id: {}]", status, request_id);

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = attempt_ctx
                .run(response.text())
                .await
                .map_err(ProviderError::from)?
                .unwrap_or_default();

            warn!(
                "Request failed with status {} for {} [request_id: {}]",
                status, self.config.name, request_id
            );
            return Err(classify_failure(status, &headers, body));
        }

        Ok(ResponseStream::new(response, attempt_ctx, release, request_id))
    }
}

fn header_value(value: &str) -> ProviderResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ProviderError::Configuration(format!("Invalid header value: {}", e)))
}
