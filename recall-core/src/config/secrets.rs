//! Secret handling for configuration values
//!
//! The upstream API key is carried as a [`SecretString`], which never prints
//! its value through `Display` or `Debug`. Extra headers are plain strings, so
//! logging goes through [`redact_by_field_name`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// A wrapper type for sensitive strings like API keys
#[derive(Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Get the actual value (use with caution)
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Partially redacted form for debugging
    pub fn partial_redact(&self) -> String {
        if self.value.is_empty() {
            return "[EMPTY]".to_string();
        }

        let len = self.value.chars().count();
        if len <= 8 || !self.value.is_ascii() {
            "[REDACTED]".to_string()
        } else if self.value.starts_with("sk-") {
            format!("{}...{}", &self.value[..3], &self.value[len - 4..])
        } else {
            format!("{}...{}", &self.value[..2], &self.value[len - 2..])
        }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Types that can describe themselves without leaking secrets
pub trait SafeLogging {
    fn safe_for_logging(&self) -> String;
}

/// Whether a field or header name looks like it carries a credential
pub fn is_sensitive_name(name: &str) -> bool {
    const SENSITIVE: [&str; 7] = [
        "api_key",
        "api-key",
        "secret",
        "token",
        "password",
        "credential",
        "auth",
    ];

    let lower = name.to_lowercase();
    SENSITIVE.iter().any(|pattern| lower.contains(pattern))
}

/// Redact `value` if `field_name` looks sensitive
pub fn redact_by_field_name(field_name: &str, value: &str) -> String {
    if is_sensitive_name(field_name) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}
