//! Best-effort request enrichment
//!
//! Retrieves memory relevant to the latest user message, merges it with the
//! user's profile and splices the result into the system prompt. Every stage
//! except composition degrades gracefully; the proxy always has a request to
//! forward.

pub mod composer;
pub mod enricher;
pub mod traits;
pub mod types;

pub use composer::{
    estimate_tokens, ComposeError, Composer, Composition, DEFAULT_MAX_CONTEXT_TOKENS,
};
pub use enricher::{failure_policy, Enricher, FailurePolicy};
pub use traits::{IntentExtractor, NoProfile, NoopReranker, ProfileProvider, Reranker, Retriever};
pub use types::{ContextChunk, EnrichmentMetadata, Intent, Stage};
