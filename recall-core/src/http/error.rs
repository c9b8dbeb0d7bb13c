//! HTTP status classification

use crate::providers::retry::{AttemptError, RateLimitSignal};
use crate::providers::ProviderError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;

/// Map a non-success response to the retry loop's view of it
///
/// 429 becomes a rate-limit signal; every other status is terminal.
pub(crate) fn classify_failure(status: StatusCode, headers: &HeaderMap, body: String) -> AttemptError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        AttemptError::RateLimited(RateLimitSignal { body, retry_after })
    } else {
        AttemptError::Fatal(ProviderError::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}

/// Parse Retry-After header value
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let value = header_value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    // Some gateways send fractional seconds
    value
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && (0.0..86_400.0).contains(s))
        .map(Duration::from_secs_f64)
}
