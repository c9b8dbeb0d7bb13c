//! Wire types for chat-completion requests
//!
//! This module contains the request-side data structures that flow through the
//! proxy. The design prioritizes:
//! - Passthrough of every field the proxy does not interpret
//! - A raw `messages` payload, so a malformed array can still be forwarded
//! - Typed access to the few fields the proxy does interpret

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role name for system messages
pub const ROLE_SYSTEM: &str = "system";

/// Role name for user messages
pub const ROLE_USER: &str = "user";

/// Role name for assistant messages
pub const ROLE_ASSISTANT: &str = "assistant";

/// A chat message with an open set of provider-specific fields
///
/// Only `role` and `content` are interpreted. Everything else (tool call ids,
/// names, cache hints, ...) lives in `extra` and is written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: String,

    /// Text content of the message
    pub content: String,

    /// Fields not modeled by the proxy
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a message with the given role and content
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    /// Attach an extra passthrough field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn is_system(&self) -> bool {
        self.role == ROLE_SYSTEM
    }

    pub fn is_user(&self) -> bool {
        self.role == ROLE_USER
    }
}

/// Chat completion request as received from the downstream caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatRequest {
    /// Model identifier to use, omitted on output when the caller sent none
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,

    /// Raw message array, parsed lazily with [`ChatRequest::parse_messages`]
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub messages: Value,

    /// Raw streaming flag. `Some(Value::Null)` records an explicit `null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub stream: Option<Value>,

    /// Every other request field (temperature, tools, provider routing, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatRequest {
    /// Create a request from typed messages
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages: messages_to_value(&messages),
            stream: None,
            extra: Map::new(),
        }
    }

    /// Set the streaming flag
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(Value::Bool(stream));
        self
    }

    /// Attach an extra passthrough field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether the caller asked for a streamed response
    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().and_then(Value::as_bool).unwrap_or(false)
    }

    /// Parse the raw message payload into typed messages
    pub fn parse_messages(&self) -> Result<Vec<Message>, serde_json::Error> {
        Vec::<Message>::deserialize(&self.messages)
    }

    /// Replace the message payload
    pub fn set_messages(&mut self, messages: &[Message]) {
        self.messages = messages_to_value(messages);
    }

    /// Content of the last user-authored message, scanning from the end
    ///
    /// Returns `None` when the payload does not parse, has no user turn, or
    /// the last user turn carries non-text content. Earlier user turns are
    /// never consulted.
    pub fn last_user_text(&self) -> Option<String> {
        let messages = self.messages.as_array()?;
        let last = messages
            .iter()
            .rev()
            .find(|m| m.get("role").and_then(Value::as_str) == Some(ROLE_USER))?;
        last.get("content").and_then(Value::as_str).map(str::to_string)
    }
}

/// Keeps a present field as `Some` even when its value is `null`
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn messages_to_value(messages: &[Message]) -> Value {
    // Message serialization is infallible: string keys and JSON values only.
    Value::Array(
        messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
            .collect(),
    )
}

/// One entry of the upstream model listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,

    /// Provider-specific details (pricing, context length, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response body of the upstream `/models` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelList {
    #[serde(default)]
    pub object: Option<String>,

    pub data: Vec<ModelInfo>,
}

impl ModelList {
    /// Identifiers of all listed models
    pub fn ids(&self) -> Vec<&str> {
        self.data.iter().map(|m| m.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_request_fields_round_trip() {
        let raw = json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "provider": {"order": ["a", "b"]}
        });

        let request: ChatRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(request.extra.len(), 2);
        assert!(!request.is_streaming());
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_explicit_stream_false_is_preserved() {
        let raw = json!({"model": "m", "messages": [], "stream": false});
        let request: ChatRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);
    }

    #[test]
    fn test_request_without_model_and_null_stream_round_trips() {
        let raw = json!({
            "messages": [{"role": "user", "content": "hi"}],
            "stream": null
        });
        let request: ChatRequest = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(request.stream, Some(Value::Null));
        assert!(!request.is_streaming());
        assert_eq!(serde_json::to_value(&request).unwrap(), raw);

        let absent: ChatRequest = serde_json::from_value(json!({"messages": []})).unwrap();
        assert_eq!(absent.stream, None);
        assert_eq!(serde_json::to_value(&absent).unwrap(), json!({"messages": []}));
    }

    #[test]
    fn test_with_stream_sets_boolean() {
        let request = ChatRequest::new("m", vec![]).with_stream(true);
        assert!(request.is_streaming());
        assert_eq!(serde_json::to_value(&request).unwrap()["stream"], json!(true));
    }

    #[test]
    fn test_message_extra_fields() {
        let raw = json!({"role": "tool", "content": "42", "tool_call_id": "call_1"});
        let message: Message = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(message.role, "tool");
        assert_eq!(message.extra.get("tool_call_id"), Some(&json!("call_1")));
        assert_eq!(serde_json::to_value(&message).unwrap(), raw);
    }

    #[test]
    fn test_parse_messages_rejects_non_string_content() {
        let request = ChatRequest {
            messages: json!([{"role": "user", "content": [{"type": "text"}]}]),
            ..Default::default()
        };
        assert!(request.parse_messages().is_err());
    }

    #[test]
    fn test_last_user_text_scans_from_end() {
        let request = ChatRequest::new(
            "m",
            vec![
                Message::user("first"),
                Message::assistant("reply"),
                Message::user("second"),
                Message::assistant("another reply"),
            ],
        );
        assert_eq!(request.last_user_text().as_deref(), Some("second"));

        let no_user = ChatRequest::new("m", vec![Message::system("rules")]);
        assert_eq!(no_user.last_user_text(), None);
    }

    #[test]
    fn test_last_user_text_ignores_earlier_turns_when_latest_is_multimodal() {
        let request = ChatRequest {
            messages: json!([
                {"role": "user", "content": "stale question"},
                {"role": "assistant", "content": "a"},
                {"role": "user", "content": [{"type": "text", "text": "fresh question"}]}
            ]),
            ..Default::default()
        };
        assert_eq!(request.last_user_text(), None);
    }
}
