//! Recall Proxy Core Library
//!
//! A context-enriching proxy for OpenAI-compatible chat-completion APIs.
//! Each request is augmented with retrieved memory and a user profile summary
//! spliced into the system prompt, then forwarded upstream with 429-aware
//! retries. Enrichment is best-effort; forwarding is strict.

pub mod config;
pub mod context;
pub mod enrichment;
pub mod http;
pub mod protocol;
pub mod providers;

pub use config::{EnrichmentConfig, RecallConfig, UpstreamConfig};
pub use context::{ContextError, RequestContext};
pub use enrichment::{Enricher, EnrichmentMetadata};
pub use http::{ProxyClient, ResponseStream, UpstreamResponse};
pub use protocol::{ChatRequest, Message, ModelList};
pub use providers::{ProviderError, ProviderResult, RetryPolicy};

use enrichment::{IntentExtractor, Retriever};
use std::sync::Arc;
use tracing::{debug, info};

/// Returns the version of the Recall Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Enrichment pipeline in front of the upstream client
///
/// Shared across requests; per-request state lives in the [`RequestContext`].
pub struct EnrichingProxy {
    enricher: Enricher,
    client: ProxyClient,
}

impl EnrichingProxy {
    pub fn new(enricher: Enricher, client: ProxyClient) -> Self {
        Self { enricher, client }
    }

    /// Build a proxy from a loaded configuration and the two mandatory collaborators
    pub fn from_config(
        config: RecallConfig,
        extractor: Arc<dyn IntentExtractor>,
        retriever: Arc<dyn Retriever>,
    ) -> ProviderResult<Self> {
        let client = ProxyClient::new(config.upstream)?;
        let enricher = Enricher::new(config.enrichment, extractor, retriever);
        Ok(Self::new(enricher, client))
    }

    pub fn enricher(&self) -> &Enricher {
        &self.enricher
    }

    pub fn client(&self) -> &ProxyClient {
        &self.client
    }

    /// Enrich `request` and forward it upstream
    ///
    /// Enrichment never fails the call; upstream errors are returned as-is.
    pub async fn handle(
        &self,
        ctx: &RequestContext,
        request: ChatRequest,
    ) -> ProviderResult<(UpstreamResponse, EnrichmentMetadata)> {
        let (enriched, metadata) = self.enricher.enrich(ctx, request).await;
        debug!(
            "Forwarding {} request (enriched: {}, chunks: {:?})",
            if enriched.is_streaming() { "streaming" } else { "buffered" },
            metadata.is_enriched(),
            metadata.chunk_ids
        );

        let response = self.client.send(ctx, &enriched).await?;
        info!(
            "Upstream accepted request for model {} after {:?} of enrichment",
            enriched.model, metadata.pipeline_duration
        );
        Ok((response, metadata))
    }

    /// Model listing passthrough; not enriched
    pub async fn list_models(&self, ctx: &RequestContext) -> ProviderResult<ModelList> {
        self.client.list_models(ctx).await
    }
}
