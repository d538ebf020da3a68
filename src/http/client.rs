//! HTTP transport with retry and throttling
//!
//! Every call to the Branch API goes through [`HttpClient::execute`], which:
//! - sends only GET or POST (anything else is a programming error)
//! - adds the app id query parameter and JSON headers to every request
//! - classifies the response (see [`super::classify`])
//! - retries transient failures with exponential backoff, up to a fixed
//!   number of total attempts
//! - times each attempt per endpoint

use super::classify::classify_response;
use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::metrics::RequestTimer;
use crate::types::{BackoffType, Method, StringMap};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Branch API host
pub const DEFAULT_BASE_URL: &str = "https://api2.branch.io";

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Total attempts per request, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for relative paths
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Total attempts per request
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    /// Type of backoff strategy
    pub backoff_type: BackoffType,
    /// Client-side throttling
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every API request
    pub default_headers: StringMap,
    /// Query parameters sent with every API request
    pub default_query: StringMap,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        let default_headers = HashMap::from([
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]);

        Self {
            base_url: Some(DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(600),
            backoff_type: BackoffType::Exponential,
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers,
            default_query: HashMap::new(),
            user_agent: format!("branch-export/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set total attempts per request
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set backoff configuration
    pub fn backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff_type = backoff_type;
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Add a default query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_query.insert(key.into(), value.into());
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Per-request headers, query and body
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: StringMap,
    /// Request headers
    pub headers: StringMap,
    /// Request body (JSON); dropped for GET
    pub body: Option<Value>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Merge several query parameters
    #[must_use]
    pub fn queries(mut self, params: &StringMap) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Merge several headers
    #[must_use]
    pub fn headers(mut self, headers: &StringMap) -> Self {
        self.headers
            .extend(headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set JSON body
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// HTTP client with retry and rate limiting. One instance (and its
/// connection pool) is shared by every call a sync makes.
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Get the client configuration
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Make a GET request and return the decoded JSON body
    pub async fn get(&self, path: &str, config: RequestConfig) -> Result<Value> {
        self.execute(Method::GET, path, config).await
    }

    /// Make a POST request and return the decoded JSON body
    pub async fn post(&self, path: &str, config: RequestConfig) -> Result<Value> {
        self.execute(Method::POST, path, config).await
    }

    /// Send a request, retrying transient failures
    pub async fn execute(&self, method: Method, path: &str, config: RequestConfig) -> Result<Value> {
        if !matches!(method, Method::GET | Method::POST) {
            return Err(Error::UnsupportedMethod {
                method: method.to_string(),
            });
        }

        let url = self.build_url(path);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.send_once(method, &url, &config).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.calculate_backoff(attempt - 1);
                    warn!(
                        "{method} {url} failed ({e}), attempt {attempt}/{max_attempts}, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!("{method} {url} failed after {attempt} attempts: {e}");
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn send_once(&self, method: Method, url: &str, config: &RequestConfig) -> Result<Value> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.request(method.into(), url);

        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            req = req.header(key.as_str(), value.as_str());
        }

        let mut query: Vec<(&str, &str)> = self
            .config
            .default_query
            .iter()
            .filter(|(k, _)| !config.query.contains_key(*k))
            .chain(&config.query)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        query.sort_unstable();
        if !query.is_empty() {
            req = req.query(&query);
        }

        if method == Method::POST {
            req = req.json(config.body.as_ref().unwrap_or(&Value::Object(Default::default())));
        }

        let timer = RequestTimer::start(strip_query(url));
        let response = match req.send().await {
            Ok(response) => response,
            Err(e) => {
                timer.finish(None, false);
                return Err(Error::Http(e));
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                timer.finish(Some(status), false);
                return Err(Error::BodyRead { status, source: e });
            }
        };

        let result = classify_response(status, &text);
        timer.finish(Some(status), result.is_ok());
        debug!("{method} {url} -> {status}");
        result
    }

    /// Open a streaming GET to a pre-signed URL. No API credentials are
    /// attached and no retries are made; non-2xx is an error.
    pub async fn download(&self, url: &str) -> Result<Response> {
        let timer = RequestTimer::start(strip_query(url));
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                timer.finish(None, false);
                return Err(Error::Http(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            timer.finish(Some(status.as_u16()), false);
            let body = response.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), body));
        }

        timer.finish(Some(status.as_u16()), true);
        Ok(response)
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Build full URL from path
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }

    /// Calculate backoff delay before retry number `retry` (0-based)
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let delay = match self.config.backoff_type {
            BackoffType::Constant => self.config.initial_backoff,
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(retry);
                self.config.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.config.max_backoff)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("max_attempts", &self.config.max_attempts)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Metric key for a URL: everything before the query string
fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
