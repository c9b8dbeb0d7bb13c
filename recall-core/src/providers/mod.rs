//! Upstream provider error model and retry policy
//!
//! The upstream path is strict: every failure is typed and surfaced, and only
//! rate limiting is retried.

pub mod error;
pub mod retry;

pub use error::{ProviderError, ProviderResult};
pub use retry::RetryPolicy;
