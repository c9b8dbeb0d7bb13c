//! Collaborator traits consumed by the enrichment pipeline
//!
//! Implementations live outside this crate (model calls, vector search,
//! profile storage). Their failures are opaque to the pipeline, so they
//! report them through `anyhow`.

use super::types::{ContextChunk, Intent};
use crate::context::RequestContext;
use async_trait::async_trait;

/// Intent extraction trait
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// Extract a structured intent from free text
    async fn extract(&self, ctx: &RequestContext, text: &str) -> anyhow::Result<Intent>;
}

/// Candidate retrieval trait
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve up to `limit` chunks, best match first
    async fn retrieve(
        &self,
        ctx: &RequestContext,
        text: &str,
        intent: &Intent,
        limit: usize,
    ) -> anyhow::Result<Vec<ContextChunk>>;
}

/// Candidate reranking trait
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Reorder and optionally filter `candidates` for `query`
    async fn rerank(
        &self,
        ctx: &RequestContext,
        query: &str,
        candidates: Vec<ContextChunk>,
    ) -> anyhow::Result<Vec<ContextChunk>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// User profile lookup trait
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Human-readable profile summary for the current user
    async fn summary(&self, ctx: &RequestContext) -> anyhow::Result<String>;
}

/// Reranker that keeps retrieval order
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReranker;

#[async_trait]
impl Reranker for NoopReranker {
    async fn rerank(
        &self,
        _ctx: &RequestContext,
        _query: &str,
        candidates: Vec<ContextChunk>,
    ) -> anyhow::Result<Vec<ContextChunk>> {
        Ok(candidates)
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Profile provider for deployments without user profiles
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProfile;

#[async_trait]
impl ProfileProvider for NoProfile {
    async fn summary(&self, _ctx: &RequestContext) -> anyhow::Result<String> {
        Ok(String::new())
    }
}
