//! Integration tests for prompt composition

use proptest::prelude::*;
use recall_core::enrichment::composer::{
    estimate_tokens, render_chunk, render_profile, Composer, CONTEXT_HEADER, SYSTEM_DELIMITER,
};
use recall_core::enrichment::ContextChunk;
use recall_core::protocol::{ChatRequest, Message};
use serde_json::json;

const PROFILE: &str = "User: engineer. Prefers: direct tone.";

fn chunk(id: &str, score: f64, text: &str) -> ContextChunk {
    ContextChunk::new(id, format!("src-{}", id), "note", text, score)
}

fn header_cost() -> usize {
    estimate_tokens(&format!("\n\n{}", CONTEXT_HEADER))
}

fn system_content(request: &ChatRequest) -> String {
    let messages = request.parse_messages().unwrap();
    assert_eq!(messages[0].role, "system");
    messages[0].content.clone()
}

#[test]
fn test_profile_then_chunks_by_score() {
    let composer = Composer::default();
    let request = ChatRequest::new("gpt-4o", vec![Message::user("What did I decide about caching?")]);
    let chunks = vec![
        chunk("low", 0.5, "Caching was discussed in the design review."),
        chunk("high", 0.9, "Decision: use a write-through cache."),
    ];

    let composition = composer.compose(&request, &chunks, PROFILE).unwrap();
    assert!(composition.injected);
    assert_eq!(composition.chunk_ids, vec!["high", "low"]);

    let content = system_content(&composition.request);
    assert!(content.starts_with("[User Profile]\nUser: engineer. Prefers: direct tone.\n\n[Retrieved Context]\n"));

    let profile_at = content.find(PROFILE).unwrap();
    let high_at = content.find("(Score: 0.90, Source: note:src-high)").unwrap();
    let low_at = content.find("(Score: 0.50, Source: note:src-low)").unwrap();
    assert!(profile_at < high_at);
    assert!(high_at < low_at);
    assert!(!content.ends_with('\n'));
}

#[test]
fn test_budget_admits_exactly_one_chunk() {
    let text = "x".repeat(80);
    let best = chunk("a", 0.9, &text);
    let other = chunk("b", 0.5, &text);

    let budget = estimate_tokens(&render_profile(PROFILE)) + header_cost()
        + estimate_tokens(&render_chunk(&best));
    let composer = Composer::new(budget);
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);

    let composition = composer
        .compose(&request, &[other.clone(), best.clone()], PROFILE)
        .unwrap();
    assert_eq!(composition.chunk_ids, vec!["a"]);

    let content = system_content(&composition.request);
    assert!(content.contains("(Score: 0.90, Source: note:src-a)"));
    assert!(!content.contains("Score: 0.50"));
}

#[test]
fn test_oversized_chunk_is_skipped_and_scan_continues() {
    let big = chunk("big", 0.9, &"y".repeat(400));
    let small = chunk("small", 0.4, "short note");

    let budget = header_cost() + estimate_tokens(&render_chunk(&small)) + 5;
    let composer = Composer::new(budget);
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);

    let composition = composer.compose(&request, &[big, small], "").unwrap();
    assert_eq!(composition.chunk_ids, vec!["small"]);
    assert!(!system_content(&composition.request).contains("yyyy"));
}

#[test]
fn test_equal_scores_keep_retrieval_order() {
    let composer = Composer::default();
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);
    let chunks = vec![
        chunk("first", 0.7, "one"),
        chunk("second", 0.7, "two"),
        chunk("third", 0.7, "three"),
    ];

    let composition = composer.compose(&request, &chunks, "").unwrap();
    assert_eq!(composition.chunk_ids, vec!["first", "second", "third"]);
}

#[test]
fn test_nothing_to_inject_returns_request_unchanged() {
    let composer = Composer::default();
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]).with_field("temperature", json!(0.2));

    let composition = composer.compose(&request, &[], "").unwrap();
    assert!(!composition.injected);
    assert!(composition.chunk_ids.is_empty());
    assert_eq!(composition.request, request);
}

#[test]
fn test_context_only_block_without_profile() {
    let composer = Composer::default();
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);

    let composition = composer
        .compose(&request, &[chunk("c", 0.8, "remembered fact")], "")
        .unwrap();
    let content = system_content(&composition.request);
    assert!(content.starts_with(CONTEXT_HEADER));
    assert!(!content.contains("[User Profile]"));
}

#[test]
fn test_prepends_to_existing_system_message() {
    let composer = Composer::default();
    let request = ChatRequest::new(
        "gpt-4o",
        vec![
            Message::system("You are terse.").with_field("name", json!("persona")),
            Message::user("hi"),
        ],
    );

    let composition = composer.compose(&request, &[], PROFILE).unwrap();
    let messages = composition.request.parse_messages().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[0].content,
        format!("[User Profile]\n{}{}You are terse.", PROFILE, SYSTEM_DELIMITER)
    );
    assert_eq!(messages[0].extra.get("name"), Some(&json!("persona")));
}

#[test]
fn test_inserts_system_message_and_preserves_other_fields() {
    let composer = Composer::default();
    let request: ChatRequest = serde_json::from_value(json!({
        "model": "gpt-4o",
        "temperature": 0.3,
        "tools": [{"type": "function", "function": {"name": "lookup"}}],
        "messages": [
            {"role": "user", "content": "look it up"},
            {"role": "assistant", "content": "", "tool_calls": [{"id": "call_1"}]},
            {"role": "tool", "content": "42", "tool_call_id": "call_1"},
            {"role": "user", "content": "thanks"}
        ]
    }))
    .unwrap();

    let composition = composer
        .compose(&request, &[chunk("c", 0.6, "fact")], PROFILE)
        .unwrap();
    let body = serde_json::to_value(&composition.request).unwrap();

    assert_eq!(body["temperature"], json!(0.3));
    assert_eq!(body["tools"][0]["function"]["name"], json!("lookup"));

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0]["role"], json!("system"));
    assert_eq!(messages[1], json!({"role": "user", "content": "look it up"}));
    assert_eq!(messages[2]["tool_calls"], json!([{"id": "call_1"}]));
    assert_eq!(
        messages[3],
        json!({"role": "tool", "content": "42", "tool_call_id": "call_1"})
    );
    assert_eq!(messages[4], json!({"role": "user", "content": "thanks"}));
}

#[test]
fn test_malformed_messages_fail_composition() {
    let composer = Composer::default();
    let request: ChatRequest = serde_json::from_value(json!({
        "model": "gpt-4o",
        "messages": [{"role": "assistant", "content": null, "tool_calls": []}]
    }))
    .unwrap();

    assert!(composer.compose(&request, &[], PROFILE).is_err());
}

#[test]
fn test_non_finite_scores_are_dropped() {
    let composer = Composer::default();
    let request = ChatRequest::new("gpt-4o", vec![Message::user("hi")]);
    let chunks = vec![chunk("nan", f64::NAN, "bad"), chunk("ok", 0.1, "good")];

    let composition = composer.compose(&request, &chunks, "").unwrap();
    assert_eq!(composition.chunk_ids, vec!["ok"]);
}

fn arb_chunks() -> impl Strategy<Value = Vec<ContextChunk>> {
    prop::collection::vec(("[a-z ]{0,200}", 0.0f64..1.0), 0..12).prop_map(|items| {
        items
            .into_iter()
            .enumerate()
            .map(|(i, (text, score))| chunk(&format!("c{}", i), score, &text))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_block_never_exceeds_budget(chunks in arb_chunks(), budget in 0usize..400) {
        let composer = Composer::new(budget);
        let (block, _) = composer.build_block(&chunks, "");
        prop_assert!(estimate_tokens(&block) <= budget);
    }

    #[test]
    fn prop_selected_chunks_are_in_score_order(chunks in arb_chunks(), budget in 0usize..400) {
        let composer = Composer::new(budget);
        let (_, ids) = composer.build_block(&chunks, PROFILE);

        let scores: Vec<f64> = ids
            .iter()
            .map(|id| chunks.iter().find(|c| &c.id == id).map(|c| c.score).unwrap())
            .collect();
        prop_assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn prop_user_turns_survive(chunks in arb_chunks(), turns in prop::collection::vec("[a-z ]{1,40}", 1..6)) {
        let messages: Vec<Message> = turns.iter().map(Message::user).collect();
        let request = ChatRequest::new("gpt-4o", messages.clone());

        let composition = Composer::default().compose(&request, &chunks, PROFILE).unwrap();
        let out = composition.request.parse_messages().unwrap();
        prop_assert_eq!(&out[1..], &messages[..]);
    }
}
