//! Error types for the Branch export connector
//!
//! This module defines the error hierarchy for the entire crate, including the
//! closed taxonomy that maps Branch API status codes onto error kinds.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use serde_json::Value;
use thiserror::Error;

// ============================================================================
// API error taxonomy
// ============================================================================

/// Kind of error reported by the Branch API, derived from the HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    UnprocessableEntity,
    RateLimited,
    InternalServerError,
    NotImplemented,
    BadGateway,
    ServiceUnavailable,
    /// Any non-success status outside the table
    Unknown,
}

struct StatusEntry {
    status: u16,
    kind: ApiErrorKind,
    message: &'static str,
    retryable: bool,
}

static STATUS_TABLE: [StatusEntry; 11] = [
    StatusEntry {
        status: 400,
        kind: ApiErrorKind::BadRequest,
        message: "A validation exception has occurred.",
        retryable: false,
    },
    StatusEntry {
        status: 401,
        kind: ApiErrorKind::Unauthorized,
        message: "The access token provided is expired, revoked, malformed or invalid for other reasons.",
        retryable: false,
    },
    StatusEntry {
        status: 403,
        kind: ApiErrorKind::Forbidden,
        message: "You are missing the following required scopes: read",
        retryable: false,
    },
    StatusEntry {
        status: 404,
        kind: ApiErrorKind::NotFound,
        message: "The resource you have specified cannot be found.",
        retryable: false,
    },
    StatusEntry {
        status: 409,
        kind: ApiErrorKind::Conflict,
        message: "The API request cannot be completed because the requested operation would conflict with an existing item.",
        retryable: false,
    },
    StatusEntry {
        status: 422,
        kind: ApiErrorKind::UnprocessableEntity,
        message: "The request content itself is not processable by the server.",
        retryable: false,
    },
    StatusEntry {
        status: 429,
        kind: ApiErrorKind::RateLimited,
        message: "The API rate limit for your organisation/application pairing has been exceeded.",
        retryable: true,
    },
    StatusEntry {
        status: 500,
        kind: ApiErrorKind::InternalServerError,
        message: "The server encountered an unexpected condition which prevented it from fulfilling the request.",
        retryable: true,
    },
    StatusEntry {
        status: 501,
        kind: ApiErrorKind::NotImplemented,
        message: "The server does not support the functionality required to fulfill the request.",
        retryable: true,
    },
    StatusEntry {
        status: 502,
        kind: ApiErrorKind::BadGateway,
        message: "Server received an invalid response.",
        retryable: true,
    },
    StatusEntry {
        status: 503,
        kind: ApiErrorKind::ServiceUnavailable,
        message: "API service is currently unavailable.",
        retryable: true,
    },
];

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown Error";

impl ApiErrorKind {
    fn entry(self) -> Option<&'static StatusEntry> {
        STATUS_TABLE.iter().find(|e| e.kind == self)
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        STATUS_TABLE
            .iter()
            .find(|e| e.status == status)
            .map_or(ApiErrorKind::Unknown, |e| e.kind)
    }

    /// Message used when the response body carries none
    pub fn default_message(self) -> &'static str {
        self.entry().map_or(UNKNOWN_ERROR_MESSAGE, |e| e.message)
    }

    /// Whether the transport should retry this kind
    pub fn is_retryable(self) -> bool {
        self.entry().is_some_and(|e| e.retryable)
    }
}

/// Longest server-requested wait the connector accepts before giving up
pub const MAX_RETRY_WAIT_SECONDS: u64 = 60;

// ============================================================================
// Error
// ============================================================================

/// The main error type for the connector
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Body broke off after the status line (truncated or bad chunking)
    #[error("Failed to read HTTP {status} response body: {source}")]
    BodyRead {
        status: u16,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP-error-code: {status}, Error: {message}")]
    Api {
        kind: ApiErrorKind,
        status: u16,
        message: String,
        body: Option<Value>,
    },

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    #[error("Retry time {retry_after_seconds}s exceeds allowed limit of {limit_seconds}s")]
    FatalRateLimit {
        retry_after_seconds: u64,
        limit_seconds: u64,
        body: Option<Value>,
    },

    #[error("Unsupported method: {method}")]
    UnsupportedMethod { method: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Export Job Errors
    // ============================================================================
    #[error("Fields not available for export: {}", fields.join(", "))]
    UnsupportedFields { fields: Vec<String>, body: Value },

    #[error("Export job failed with status: {status}")]
    ExportFailed { status: String, body: Option<Value> },

    #[error("Export timed out after {timeout_minutes} minutes")]
    ExportTimeout { timeout_minutes: u64 },

    // ============================================================================
    // Data Processing Errors
    // ============================================================================
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Invalid replication key '{key}' in record: {message}")]
    ReplicationKey { key: String, message: String },

    #[error("Schema error: {message}")]
    Schema { message: String },

    // ============================================================================
    // State Errors
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    // ============================================================================
    // Stream Errors
    // ============================================================================
    #[error("Stream '{stream}' not found in catalog")]
    StreamNotFound { stream: String },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a classified API error from a status and optional body
    pub fn api(status: u16, body: Option<Value>) -> Self {
        let kind = ApiErrorKind::from_status(status);
        let message = body
            .as_ref()
            .and_then(|b| {
                b.get("error")
                    .filter(|v| !is_blank(v))
                    .or_else(|| b.get("message").filter(|v| !is_blank(v)))
            })
            .map_or_else(|| kind.default_message().to_string(), value_to_message);

        Self::Api {
            kind,
            status,
            message,
            body,
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// API error kind, if this is a classified API error
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            Error::Api { kind, .. } => Some(*kind),
            Error::RateLimited { .. } => Some(ApiErrorKind::RateLimited),
            _ => None,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            Error::BodyRead { .. } => true,
            Error::Api { kind, .. } => kind.is_retryable(),
            Error::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// A fatal rate limit aborts the whole run, not only the current stream
    pub fn is_fatal_rate_limit(&self) -> bool {
        matches!(self, Error::FatalRateLimit { .. })
    }

    /// Raw response body kept for diagnostics
    pub fn response_body(&self) -> Option<&Value> {
        match self {
            Error::Api { body, .. }
            | Error::FatalRateLimit { body, .. }
            | Error::ExportFailed { body, .. } => body.as_ref(),
            Error::UnsupportedFields { body, .. } => Some(body),
            _ => None,
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn value_to_message(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result type alias for the connector
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
