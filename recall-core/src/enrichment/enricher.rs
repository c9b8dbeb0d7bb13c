//! Enrichment pipeline orchestration
//!
//! Stages run strictly in order (intent, retrieve, rerank, profile, compose),
//! each one bounded by the request context. What happens when a stage fails is
//! decided in one place, [`failure_policy`]: collaborator stages degrade to a
//! fallback value, composition aborts to the original request. Either way the
//! caller gets a usable request back.

use super::composer::Composer;
use super::traits::{IntentExtractor, NoProfile, NoopReranker, ProfileProvider, Reranker, Retriever};
use super::types::{ContextChunk, EnrichmentMetadata, Intent, Stage};
use crate::config::EnrichmentConfig;
use crate::context::RequestContext;
use crate::protocol::ChatRequest;
use std::collections::HashSet;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the orchestrator does when a stage fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Continue with the stage's fallback value
    Absorb,
    /// Stop and forward the original, unenriched request
    Abort,
}

/// Failure policy per stage
pub fn failure_policy(stage: Stage) -> FailurePolicy {
    match stage {
        Stage::Intent | Stage::Retrieve | Stage::Rerank | Stage::Profile => FailurePolicy::Absorb,
        Stage::Compose => FailurePolicy::Abort,
    }
}

/// Result of one stage: the value to continue with and whether it is genuine
#[derive(Debug)]
struct StageOutcome<T> {
    value: Option<T>,
    ok: bool,
}

/// Orchestrates intent extraction, retrieval, reranking, profile lookup and
/// composition into one best-effort pipeline
pub struct Enricher {
    config: EnrichmentConfig,
    composer: Composer,
    extractor: Arc<dyn IntentExtractor>,
    retriever: Arc<dyn Retriever>,
    reranker: Arc<dyn Reranker>,
    profile: Arc<dyn ProfileProvider>,
}

impl Enricher {
    /// Create an enricher with the no-op reranker and no profile source
    pub fn new(
        config: EnrichmentConfig,
        extractor: Arc<dyn IntentExtractor>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self {
            composer: Composer::new(config.max_context_tokens),
            config,
            extractor,
            retriever,
            reranker: Arc::new(NoopReranker),
            profile: Arc::new(NoProfile),
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = reranker;
        self
    }

    pub fn with_profile(mut self, profile: Arc<dyn ProfileProvider>) -> Self {
        self.profile = profile;
        self
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }

    /// Enrich `request` with retrieved context and the user profile
    ///
    /// Never fails: the worst case is the original request with metadata
    /// listing the stages that degraded.
    pub async fn enrich(
        &self,
        ctx: &RequestContext,
        request: ChatRequest,
    ) -> (ChatRequest, EnrichmentMetadata) {
        let started = Instant::now();
        let mut metadata = EnrichmentMetadata::default();

        let chunks = match request.last_user_text() {
            Some(query) if !query.trim().is_empty() => {
                let Some(chunks) = self.gather_chunks(ctx, &query, &mut metadata).await else {
                    return finish(request, metadata, started);
                };
                chunks
            }
            _ => {
                debug!("No user message to enrich from, skipping retrieval");
                Vec::new()
            }
        };

        let outcome = self.load_profile(ctx).await;
        let Some(profile) = settle(Stage::Profile, outcome, &mut metadata) else {
            return finish(request, metadata, started);
        };

        let outcome = match self.composer.compose(&request, &chunks, &profile) {
            Ok(composition) => {
                metadata.chunk_ids = composition.chunk_ids;
                succeeded(composition.request)
            }
            Err(e) => failed(Stage::Compose, e, None),
        };
        let Some(enriched) = settle(Stage::Compose, outcome, &mut metadata) else {
            return finish(request, metadata, started);
        };

        finish(enriched, metadata, started)
    }

    /// Intent, retrieval and rerank stages; `None` means a stage aborted
    async fn gather_chunks(
        &self,
        ctx: &RequestContext,
        query: &str,
        metadata: &mut EnrichmentMetadata,
    ) -> Option<Vec<ContextChunk>> {
        let outcome = self.extract_intent(ctx, query).await;
        let intent = settle(Stage::Intent, outcome, metadata)?;
        metadata.intent_extracted = !intent.is_empty();

        let outcome = self.retrieve(ctx, query, &intent).await;
        let candidates = settle(Stage::Retrieve, outcome, metadata)?;

        let rerank_started = Instant::now();
        let outcome = self.rerank(ctx, query, candidates).await;
        metadata.rerank_duration = rerank_started.elapsed();
        let mut chunks = settle(Stage::Rerank, outcome, metadata)?;

        chunks.truncate(self.config.top_k);
        Some(chunks)
    }

    async fn extract_intent(&self, ctx: &RequestContext, query: &str) -> StageOutcome<Intent> {
        let intent_ctx = ctx.with_timeout(self.config.intent_timeout());
        match intent_ctx.run(self.extractor.extract(&intent_ctx, query)).await {
            Ok(Ok(intent)) => succeeded(intent),
            Ok(Err(e)) => failed(Stage::Intent, format!("{:#}", e), Some(Intent::default())),
            Err(e) => failed(Stage::Intent, e, Some(Intent::default())),
        }
    }

    async fn retrieve(
        &self,
        ctx: &RequestContext,
        query: &str,
        intent: &Intent,
    ) -> StageOutcome<Vec<ContextChunk>> {
        let limit = self.config.candidate_pool_size();
        match ctx.run(self.retriever.retrieve(ctx, query, intent, limit)).await {
            Ok(Ok(candidates)) => {
                debug!("Retrieved {} candidates (limit {})", candidates.len(), limit);
                succeeded(candidates)
            }
            Ok(Err(e)) => failed(Stage::Retrieve, format!("{:#}", e), Some(Vec::new())),
            Err(e) => failed(Stage::Retrieve, e, Some(Vec::new())),
        }
    }

    /// Rerank the pool; falls back to retrieval order
    ///
    /// Chunks the reranker returns that were not in the pool are discarded.
    async fn rerank(
        &self,
        ctx: &RequestContext,
        query: &str,
        candidates: Vec<ContextChunk>,
    ) -> StageOutcome<Vec<ContextChunk>> {
        if candidates.is_empty() {
            return succeeded(candidates);
        }

        let result = ctx
            .run(self.reranker.rerank(ctx, query, candidates.clone()))
            .await;
        let mut reranked = match result {
            Ok(Ok(reranked)) => reranked,
            Ok(Err(e)) => return failed(Stage::Rerank, format!("{:#}", e), Some(candidates)),
            Err(e) => return failed(Stage::Rerank, e, Some(candidates)),
        };

        let known: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        let before = reranked.len();
        reranked.retain(|c| known.contains(c.id.as_str()));
        if reranked.len() != before {
            warn!(
                "Reranker {} returned {} unknown chunks, dropped",
                self.reranker.name(),
                before - reranked.len()
            );
        }

        debug!(
            "Reranker {} kept {} of {} candidates",
            self.reranker.name(),
            reranked.len(),
            candidates.len()
        );
        succeeded(reranked)
    }

    async fn load_profile(&self, ctx: &RequestContext) -> StageOutcome<String> {
        match ctx.run(self.profile.summary(ctx)).await {
            Ok(Ok(summary)) => succeeded(summary),
            Ok(Err(e)) => failed(Stage::Profile, format!("{:#}", e), Some(String::new())),
            Err(e) => failed(Stage::Profile, e, Some(String::new())),
        }
    }
}

fn succeeded<T>(value: T) -> StageOutcome<T> {
    StageOutcome {
        value: Some(value),
        ok: true,
    }
}

/// Log a stage failure and attach the fallback the stage would continue with
fn failed<T>(stage: Stage, err: impl Display, fallback: Option<T>) -> StageOutcome<T> {
    warn!("Enrichment stage {} failed: {}", stage, err);
    StageOutcome {
        value: fallback,
        ok: false,
    }
}

/// Apply the failure policy; `None` tells the caller to abort
fn settle<T>(stage: Stage, outcome: StageOutcome<T>, metadata: &mut EnrichmentMetadata) -> Option<T> {
    if outcome.ok {
        return outcome.value;
    }

    metadata.degraded_stages.push(stage);
    match failure_policy(stage) {
        FailurePolicy::Absorb => outcome.value,
        FailurePolicy::Abort => {
            warn!("Enrichment aborted at stage {}, forwarding original request", stage);
            None
        }
    }
}

fn finish(
    request: ChatRequest,
    mut metadata: EnrichmentMetadata,
    started: Instant,
) -> (ChatRequest, EnrichmentMetadata) {
    metadata.pipeline_duration = started.elapsed();
    info!(
        "Enrichment finished in {:?}: intent={}, chunks={}, degraded={:?}",
        metadata.pipeline_duration,
        metadata.intent_extracted,
        metadata.chunk_ids.len(),
        metadata.degraded_stages
    );
    (request, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_compose_aborts() {
        assert_eq!(failure_policy(Stage::Intent), FailurePolicy::Absorb);
        assert_eq!(failure_policy(Stage::Retrieve), FailurePolicy::Absorb);
        assert_eq!(failure_policy(Stage::Rerank), FailurePolicy::Absorb);
        assert_eq!(failure_policy(Stage::Profile), FailurePolicy::Absorb);
        assert_eq!(failure_policy(Stage::Compose), FailurePolicy::Abort);
    }

    #[test]
    fn test_settle_records_degraded_stage() {
        let mut metadata = EnrichmentMetadata::default();
        let value = settle(
            Stage::Profile,
            failed(Stage::Profile, "store down", Some(String::new())),
            &mut metadata,
        );
        assert_eq!(value, Some(String::new()));
        assert_eq!(metadata.degraded_stages, vec![Stage::Profile]);

        let aborted: Option<String> = settle(
            Stage::Compose,
            failed(Stage::Compose, "bad payload", None),
            &mut metadata,
        );
        assert_eq!(aborted, None);
        assert_eq!(metadata.degraded_stages, vec![Stage::Profile, Stage::Compose]);
    }
}
