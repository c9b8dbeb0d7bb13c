//! Recall proxy demo - enrichment and forwarding
//!
//! Enriches a chat request with an in-memory "memory store" and prints the
//! composed system prompt. When `RECALL_API_KEY` is set, the enriched request
//! is streamed from the upstream (default `https://openrouter.ai/api/v1`,
//! override with `RECALL_BASE_URL`) and relayed to stdout.
//!
//! Run with: RUST_LOG=recall_core=debug cargo run --example proxy_demo

use anyhow::Context;
use async_trait::async_trait;
use recall_core::config::{EnrichmentConfig, UpstreamConfig};
use recall_core::context::RequestContext;
use recall_core::enrichment::{
    ContextChunk, Enricher, Intent, IntentExtractor, ProfileProvider, Retriever,
};
use recall_core::http::{relay_stream, ProxyClient};
use recall_core::protocol::{ChatRequest, Message};
use recall_core::EnrichingProxy;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Splits the query into lowercase keywords
struct KeywordExtractor;

#[async_trait]
impl IntentExtractor for KeywordExtractor {
    async fn extract(&self, _ctx: &RequestContext, text: &str) -> anyhow::Result<Intent> {
        Ok(Intent {
            intent_type: "question".to_string(),
            topics: text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 3)
                .map(str::to_lowercase)
                .collect(),
            ..Default::default()
        })
    }
}

/// Scores notes by keyword overlap with the intent
struct MemoryStore {
    notes: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl Retriever for MemoryStore {
    async fn retrieve(
        &self,
        _ctx: &RequestContext,
        _text: &str,
        intent: &Intent,
        limit: usize,
    ) -> anyhow::Result<Vec<ContextChunk>> {
        let mut hits: Vec<ContextChunk> = self
            .notes
            .iter()
            .filter_map(|(id, text)| {
                let lower = text.to_lowercase();
                let matched = intent.topics.iter().filter(|t| lower.contains(t.as_str())).count();
                (matched > 0).then(|| {
                    let score = matched as f64 / intent.topics.len().max(1) as f64;
                    ContextChunk::new(*id, *id, "note", *text, score)
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

struct StaticProfile;

#[async_trait]
impl ProfileProvider for StaticProfile {
    async fn summary(&self, _ctx: &RequestContext) -> anyhow::Result<String> {
        Ok("User: backend engineer. Prefers: direct tone, Rust examples.".to_string())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recall_core=info")),
        )
        .init();

    let memory = MemoryStore {
        notes: vec![
            ("n-1", "Caching: we chose a write-through cache for the profile store."),
            ("n-2", "Deployment runs on two regions with a shared Postgres primary."),
            ("n-3", "The caching layer must expire entries after 15 minutes."),
        ],
    };
    let enricher = Enricher::new(
        EnrichmentConfig::default(),
        Arc::new(KeywordExtractor),
        Arc::new(memory),
    )
    .with_profile(Arc::new(StaticProfile));

    let request = ChatRequest::new(
        "openai/gpt-4o-mini",
        vec![Message::user("Remind me what we decided about caching.")],
    )
    .with_stream(true);

    let ctx = RequestContext::new().with_timeout(Duration::from_secs(120));

    let Ok(api_key) = env::var("RECALL_API_KEY") else {
        let (enriched, metadata) = enricher.enrich(&ctx, request).await;
        let messages = enriched.parse_messages()?;
        println!("--- system prompt ---\n{}\n", messages[0].content);
        println!("--- metadata ---\n{}", serde_json::to_string_pretty(&metadata)?);
        println!("\nSet RECALL_API_KEY to forward the request upstream.");
        return Ok(());
    };

    let base_url =
        env::var("RECALL_BASE_URL").unwrap_or_else(|_| "https://openrouter.ai/api/v1".to_string());
    let upstream = UpstreamConfig::new(base_url, api_key)
        .with_app_identity("https://github.com/recall-proxy/recall-proxy", "Recall Proxy Demo");
    let proxy = EnrichingProxy::new(enricher, ProxyClient::new(upstream)?);

    let (response, metadata) = proxy.handle(&ctx, request).await?;
    eprintln!("Injected chunks: {:?}", metadata.chunk_ids);

    let mut stream = response
        .into_stream()
        .context("upstream returned a buffered body for a streaming request")?;
    let mut stdout = tokio::io::stdout();
    let summary = relay_stream(&mut stream, &mut stdout).await?;
    eprintln!("\nRelayed {} lines ({} bytes)", summary.lines, summary.bytes);

    Ok(())
}
