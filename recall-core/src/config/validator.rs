//! Configuration validation beyond the per-section rules in the schema

use super::env::placeholder_pattern;
use super::error::{ConfigError, ValidationError, ValidationErrorKind};
use super::schema::{RecallConfig, UpstreamConfig};
use super::secrets::is_sensitive_name;
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use tracing::warn;

/// Headers the client sets itself; configuration may not override them
const RESERVED_HEADERS: [&str; 5] = [
    "authorization",
    "accept",
    "content-type",
    "x-request-id",
    "content-length",
];

/// Configuration validator with cross-field rules
pub struct ConfigValidator {
    /// Pattern for environment variable placeholders
    env_var_pattern: Regex,
}

impl ConfigValidator {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            env_var_pattern: placeholder_pattern()?,
        })
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &RecallConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_credentials(&config.upstream)?;
        self.validate_headers(&config.upstream)?;
        self.validate_app_identity(&config.upstream)?;

        Ok(())
    }

    /// Placeholders must be resolved by now
    fn validate_credentials(&self, upstream: &UpstreamConfig) -> Result<(), ValidationError> {
        let key = upstream.api_key.expose_secret();
        if let Some(var) = self.extract_env_vars(key).into_iter().next() {
            return Err(ValidationError::invalid_format(
                "upstream.api_key",
                format!("unresolved placeholder ${{{}}}", var),
            ));
        }

        if key.trim() != key {
            return Err(ValidationError::invalid_format(
                "upstream.api_key",
                "leading or trailing whitespace",
            ));
        }

        Ok(())
    }

    fn validate_headers(&self, upstream: &UpstreamConfig) -> Result<(), ValidationError> {
        for (name, value) in &upstream.extra_headers {
            let path = format!("upstream.extra_headers.{}", name);

            let parsed = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ValidationError::invalid_format(path.clone(), e.to_string()))?;

            if RESERVED_HEADERS.contains(&parsed.as_str()) {
                return Err(ValidationError::new(
                    path,
                    ValidationErrorKind::Incompatible {
                        message: "header is set by the proxy client".to_string(),
                    },
                ));
            }

            HeaderValue::from_str(value)
                .map_err(|e| ValidationError::invalid_format(path.clone(), e.to_string()))?;
        }

        Ok(())
    }

    /// Credential-looking extra headers whose value is written out literally
    ///
    /// Only meaningful before interpolation: afterwards no value carries a
    /// placeholder any more.
    pub fn literal_credential_headers<'a>(&self, upstream: &'a UpstreamConfig) -> Vec<&'a str> {
        let mut names: Vec<&str> = upstream
            .extra_headers
            .iter()
            .filter(|(name, value)| is_sensitive_name(name) && self.extract_env_vars(value).is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Log a warning for every header reported by [`Self::literal_credential_headers`]
    pub fn warn_literal_credentials(&self, upstream: &UpstreamConfig) {
        for name in self.literal_credential_headers(upstream) {
            warn!(
                "Header '{}' looks like a credential but is not read from the environment",
                name
            );
        }
    }

    fn validate_app_identity(&self, upstream: &UpstreamConfig) -> Result<(), ValidationError> {
        if let Some(app_url) = &upstream.app_url {
            url::Url::parse(app_url).map_err(|e| {
                ValidationError::new(
                    "upstream.app_url",
                    ValidationErrorKind::InvalidUrl {
                        message: e.to_string(),
                    },
                )
            })?;
        }

        if let Some(title) = &upstream.app_title {
            if title.trim().is_empty() {
                return Err(ValidationError::invalid_value(
                    "upstream.app_title",
                    "non-empty title",
                    "blank string",
                ));
            }
        }

        Ok(())
    }

    /// Check if a field name appears to contain sensitive information
    pub fn is_sensitive_field(&self, field_name: &str) -> bool {
        is_sensitive_name(field_name)
    }

    /// Extract environment variable names referenced in a string
    pub fn extract_env_vars(&self, text: &str) -> Vec<String> {
        self.env_var_pattern
            .captures_iter(text)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}
