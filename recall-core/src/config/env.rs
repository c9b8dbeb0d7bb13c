//! Environment variable interpolation for configuration
//!
//! `${NAME}` placeholders are resolved against the process environment. The
//! whole file is interpolated before parsing; the upstream key and URL are
//! checked again afterwards so values built in code get the same treatment.

use super::error::ConfigError;
use super::schema::RecallConfig;
use super::secrets::SecretString;
use regex::{Captures, Regex};
use std::env;

const PLACEHOLDER: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

pub(crate) fn placeholder_pattern() -> Result<Regex, ConfigError> {
    Ok(Regex::new(PLACEHOLDER)?)
}

/// Interpolate environment variables in a configuration string
///
/// Fails on the first placeholder whose variable is unset.
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    let pattern = placeholder_pattern()?;
    interpolate_with(&pattern, content)
}

/// Interpolate the upstream fields of a parsed configuration
pub fn interpolate_config_env_vars(config: &mut RecallConfig) -> Result<(), ConfigError> {
    let pattern = placeholder_pattern()?;
    let upstream = &mut config.upstream;

    if pattern.is_match(upstream.api_key.expose_secret()) {
        let interpolated = interpolate_with(&pattern, upstream.api_key.expose_secret())?;
        upstream.api_key = SecretString::new(interpolated);
    }

    if pattern.is_match(&upstream.base_url) {
        upstream.base_url = interpolate_with(&pattern, &upstream.base_url)?;
    }

    for value in upstream.extra_headers.values_mut() {
        if pattern.is_match(value) {
            *value = interpolate_with(&pattern, value)?;
        }
    }

    Ok(())
}

fn interpolate_with(pattern: &Regex, content: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let result = pattern.replace_all(content, |cap: &Captures<'_>| match env::var(&cap[1]) {
        Ok(value) => value,
        Err(_) => {
            missing.get_or_insert_with(|| cap[1].to_string());
            String::new()
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}
