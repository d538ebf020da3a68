//! HTTP transport module
//!
//! Provides the shared client every Branch API call goes through.
//!
//! # Features
//!
//! - **Retries**: transient failures are retried with exponential backoff
//! - **Classification**: status codes and error bodies map onto [`crate::error::Error`]
//! - **Rate Limiting**: token bucket rate limiter using governor

mod classify;
mod client;
mod rate_limit;

pub use classify::{
    check_rate_limit, classify_response, extract_retry_seconds, extract_unsupported_field,
    unsupported_fields,
};
pub use client::{
    HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig, DEFAULT_BASE_URL,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
