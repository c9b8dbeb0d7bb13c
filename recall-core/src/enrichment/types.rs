//! Data carried through the enrichment pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structured intent extracted from the latest user message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Intent {
    /// Coarse classification (question, task, chit-chat, ...)
    #[serde(default, rename = "type")]
    pub intent_type: String,

    #[serde(default)]
    pub entities: Vec<String>,

    #[serde(default)]
    pub topics: Vec<String>,

    /// Kinds of context the message appears to need
    #[serde(default)]
    pub context_needs: Vec<String>,
}

impl Intent {
    /// True when the extractor produced nothing usable
    pub fn is_empty(&self) -> bool {
        self.intent_type.is_empty()
            && self.entities.is_empty()
            && self.topics.is_empty()
            && self.context_needs.is_empty()
    }
}

/// A retrieved unit of context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub id: String,

    /// Identifier of the document or record the chunk came from
    pub source_id: String,

    /// Kind of source (note, email, doc, ...)
    pub source_type: String,

    pub text: String,

    /// Relevance score; higher is better, only comparable within one retrieval
    pub score: f64,
}

impl ContextChunk {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        source_type: impl Into<String>,
        text: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            source_type: source_type.into(),
            text: text.into(),
            score,
        }
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intent,
    Retrieve,
    Rerank,
    Profile,
    Compose,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intent => "intent",
            Stage::Retrieve => "retrieve",
            Stage::Rerank => "rerank",
            Stage::Profile => "profile",
            Stage::Compose => "compose",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic record produced once per enriched request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnrichmentMetadata {
    /// Whether intent extraction returned a non-empty intent
    pub intent_extracted: bool,

    /// Ids of the chunks rendered into the final prompt, in prompt order
    pub chunk_ids: Vec<String>,

    /// Wall-clock time of the whole pipeline
    pub pipeline_duration: Duration,

    /// Wall-clock time of the rerank stage
    pub rerank_duration: Duration,

    /// Stages that failed and fell back
    pub degraded_stages: Vec<Stage>,
}

impl EnrichmentMetadata {
    /// Whether the request left the pipeline with injected context
    pub fn is_enriched(&self) -> bool {
        !self.chunk_ids.is_empty()
    }
}
