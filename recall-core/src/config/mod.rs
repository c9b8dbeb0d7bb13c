//! Configuration for the recall proxy
//!
//! A configuration file names the upstream provider (endpoint, credentials,
//! timeouts, retry policy) and tunes the enrichment pipeline. YAML and JSON
//! are both accepted; `${VAR}` placeholders are resolved from the environment.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::interpolate_env_vars;
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{EnrichmentConfig, RecallConfig, UpstreamConfig};
pub use secrets::{is_sensitive_name, redact_by_field_name, SafeLogging, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::info;

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> ConfigResult<RecallConfig> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: RecallConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    finish(path, config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> ConfigResult<RecallConfig> {
    let path = path.as_ref();
    let interpolated = read_interpolated(path)?;

    let config: RecallConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    finish(path, config)
}

/// Load a configuration, choosing the format from the file extension
///
/// `.json` is parsed as JSON, everything else as YAML.
pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<RecallConfig> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_from_json(path),
        _ => load_from_yaml(path),
    }
}

fn read_interpolated(path: &Path) -> ConfigResult<String> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;

    env::interpolate_env_vars(&content)
}

fn finish(path: &Path, mut config: RecallConfig) -> ConfigResult<RecallConfig> {
    let validator = ConfigValidator::new()?;
    validator.warn_literal_credentials(&config.upstream);

    env::interpolate_config_env_vars(&mut config)?;

    validator.validate(&config)?;

    info!(
        "Loaded configuration from {}: upstream {}",
        path.display(),
        config.upstream.safe_for_logging()
    );
    Ok(config)
}
