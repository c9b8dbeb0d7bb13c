//! Token-budgeted prompt composition
//!
//! The composer renders a profile summary and retrieved chunks into a single
//! instruction block and splices it into the request as a system message.
//!
//! Block layout:
//!
//! ```text
//! [User Profile]
//! <summary>
//!
//! [Retrieved Context]
//! (Score: 0.90, Source: note:n-1)
//! <chunk text>
//!
//! (Score: 0.50, Source: doc:d-7)
//! <chunk text>
//! ```
//!
//! Chunk selection is a single greedy pass in descending score order: a chunk
//! that does not fit the remaining budget is skipped and the scan continues.

use super::types::ContextChunk;
use crate::protocol::{ChatRequest, Message};
use thiserror::Error;
use tracing::debug;

/// Default composition budget, in estimated tokens
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4000;

/// Header of the profile section
pub const PROFILE_HEADER: &str = "[User Profile]\n";

/// Header of the retrieved-context section
pub const CONTEXT_HEADER: &str = "[Retrieved Context]\n";

/// Separator between sections of the block
const SECTION_SEPARATOR: &str = "\n\n";

/// Delimiter between new enrichment and a pre-existing system prompt
pub const SYSTEM_DELIMITER: &str = "\n\n---\n\n";

/// Approximate token count of `text`
///
/// Roughly four characters per token. Monotonic in text length, not exact.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Render one chunk the way it appears in the prompt
pub fn render_chunk(chunk: &ContextChunk) -> String {
    format!(
        "(Score: {:.2}, Source: {}:{})\n{}\n\n",
        chunk.score, chunk.source_type, chunk.source_id, chunk.text
    )
}

/// Render the profile section for a non-empty summary
pub fn render_profile(summary: &str) -> String {
    format!("{PROFILE_HEADER}{summary}")
}

/// Composition failures
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The request's messages are not an array of `{role, content}` objects
    #[error("message payload is not a sequence of message objects: {0}")]
    InvalidMessages(#[from] serde_json::Error),
}

/// Outcome of a successful composition
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    /// The request to forward; equal to the input when nothing was added
    pub request: ChatRequest,

    /// Ids of rendered chunks, in prompt order
    pub chunk_ids: Vec<String>,

    /// Whether a block was spliced into the messages
    pub injected: bool,
}

/// Prompt composer bounded by a token budget
#[derive(Debug, Clone)]
pub struct Composer {
    max_context_tokens: usize,
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTEXT_TOKENS)
    }
}

impl Composer {
    /// Create a composer with the given budget in estimated tokens
    pub fn new(max_context_tokens: usize) -> Self {
        Self { max_context_tokens }
    }

    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    /// Merge `profile_summary` and `chunks` into `request`
    ///
    /// The input request is borrowed, so on error the caller still holds the
    /// original and can forward it unchanged.
    pub fn compose(
        &self,
        request: &ChatRequest,
        chunks: &[ContextChunk],
        profile_summary: &str,
    ) -> Result<Composition, ComposeError> {
        let (block, chunk_ids) = self.build_block(chunks, profile_summary);

        if block.is_empty() {
            return Ok(Composition {
                request: request.clone(),
                chunk_ids,
                injected: false,
            });
        }

        let mut messages = request.parse_messages()?;
        splice_system_block(&mut messages, &block);

        let mut enriched = request.clone();
        enriched.set_messages(&messages);

        debug!(
            "Composed enrichment block: {} chunks, ~{} tokens",
            chunk_ids.len(),
            estimate_tokens(&block)
        );

        Ok(Composition {
            request: enriched,
            chunk_ids,
            injected: true,
        })
    }

    /// Build the enrichment block and the ids of the chunks it contains
    ///
    /// Returns an empty string when there is nothing to inject.
    pub fn build_block(
        &self,
        chunks: &[ContextChunk],
        profile_summary: &str,
    ) -> (String, Vec<String>) {
        let mut block = String::new();

        if !profile_summary.is_empty() {
            block.push_str(&render_profile(profile_summary));
        }

        let selected = self.select_chunks(chunks, estimate_tokens(&block));
        if !selected.is_empty() {
            if !block.is_empty() {
                block.push_str(SECTION_SEPARATOR);
            }
            block.push_str(CONTEXT_HEADER);
            for chunk in &selected {
                block.push_str(&render_chunk(chunk));
            }
        }

        // Drop the blank line after the last chunk; profile and chunk text stay verbatim.
        if block.ends_with(SECTION_SEPARATOR) && !selected.is_empty() {
            block.truncate(block.len() - SECTION_SEPARATOR.len());
        }
        let ids = selected.into_iter().map(|c| c.id.clone()).collect();
        (block, ids)
    }

    /// Greedy single-pass selection under the remaining budget
    fn select_chunks<'a>(
        &self,
        chunks: &'a [ContextChunk],
        profile_tokens: usize,
    ) -> Vec<&'a ContextChunk> {
        if chunks.is_empty() {
            return Vec::new();
        }

        let header_tokens = estimate_tokens(&format!("{SECTION_SEPARATOR}{CONTEXT_HEADER}"));
        let mut remaining = self
            .max_context_tokens
            .saturating_sub(profile_tokens + header_tokens);

        let mut ordered: Vec<&ContextChunk> = chunks
            .iter()
            .filter(|c| c.score.is_finite())
            .collect();
        // Vec::sort_by is stable, so ties keep retrieval order.
        ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut selected = Vec::new();
        for chunk in ordered {
            let cost = estimate_tokens(&render_chunk(chunk));
            if cost <= remaining {
                remaining -= cost;
                selected.push(chunk);
            } else {
                debug!(
                    "Skipping chunk {} (cost {} > remaining {})",
                    chunk.id, cost, remaining
                );
            }
        }
        selected
    }
}

/// Prepend `block` to a leading system message, or insert a new one
fn splice_system_block(messages: &mut Vec<Message>, block: &str) {
    match messages.first_mut() {
        Some(first) if first.is_system() => {
            first.content = format!("{block}{SYSTEM_DELIMITER}{}", first.content);
        }
        _ => messages.insert(0, Message::system(block)),
    }
}
