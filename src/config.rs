//! Connector configuration
//!
//! Loaded from a JSON file or inline JSON. Numeric options are accepted as
//! numbers or numeric strings.

use crate::engine::SyncConfig;
use crate::error::{Error, Result};
use crate::export::{ExportCredentials, MAX_WINDOW_DAYS};
use crate::http::{HttpClientConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::types::parse_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::info;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Connector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapConfig {
    /// App id sent as `app_id` with every request
    #[serde(default)]
    pub branch_app_id: String,

    /// Export API token, sent as `Access-Token`
    #[serde(default)]
    pub branch_access_token: String,

    /// Branch key, used by the full-table streams
    #[serde(default)]
    pub branch_key: Option<String>,

    #[serde(default)]
    pub branch_secret: Option<String>,

    /// Seconds; number or numeric string
    #[serde(default)]
    pub request_timeout: Option<Value>,

    /// Days per export window; number or numeric string
    #[serde(default)]
    pub branch_window_size: Option<Value>,

    /// Bookmark seed for streams without one
    #[serde(default)]
    pub start_date: Option<String>,

    /// Links read by the `deeplink` stream
    #[serde(default, deserialize_with = "deserialize_url_list")]
    pub deeplink_urls: Vec<String>,

    /// API base URL override
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl TapConfig {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    /// Parse inline JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("Invalid config JSON: {e}")))
    }

    /// Check everything the export streams need
    pub fn validate(&self) -> Result<()> {
        if self.branch_app_id.trim().is_empty() {
            return Err(Error::missing_field("branch_app_id"));
        }
        if self.branch_access_token.trim().is_empty() {
            return Err(Error::missing_field("branch_access_token"));
        }
        self.start_date()?;
        self.request_timeout()?;
        self.window_days()?;
        Ok(())
    }

    /// Parsed `start_date`
    pub fn start_date(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .start_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::missing_field("start_date"))?;
        parse_datetime(raw).map_err(|e| Error::invalid_value("start_date", e.to_string()))
    }

    /// Request timeout; absent, empty or zero means 300 seconds
    pub fn request_timeout(&self) -> Result<Duration> {
        let default = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        match lenient_number("request_timeout", self.request_timeout.as_ref())? {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::invalid_value("request_timeout", format!("{secs}: {e}"))),
            Some(secs) if secs < 0.0 => Err(Error::invalid_value(
                "request_timeout",
                format!("must be positive, got {secs}"),
            )),
            _ => Ok(default),
        }
    }

    /// Export window in days, capped at 60
    pub fn window_days(&self) -> Result<u32> {
        let Some(days) = lenient_number("branch_window_size", self.branch_window_size.as_ref())?
        else {
            return Ok(MAX_WINDOW_DAYS);
        };

        if days < 1.0 {
            return Err(Error::invalid_value(
                "branch_window_size",
                format!("must be at least 1 day, got {days}"),
            ));
        }
        if days > f64::from(MAX_WINDOW_DAYS) {
            info!("Window size {days} is greater than {MAX_WINDOW_DAYS}, setting to max {MAX_WINDOW_DAYS}");
            return Ok(MAX_WINDOW_DAYS);
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(days as u32)
    }

    pub fn credentials(&self) -> ExportCredentials {
        ExportCredentials::new(&self.branch_app_id, &self.branch_access_token)
    }

    /// HTTP client settings: base URL, timeout and the `app_id` query
    /// parameter every request carries
    pub fn http_config(&self) -> Result<HttpClientConfig> {
        let mut builder = HttpClientConfig::builder()
            .base_url(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))
            .timeout(self.request_timeout()?);
        if !self.branch_app_id.is_empty() {
            builder = builder.query("app_id", &self.branch_app_id);
        }
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent);
        }
        Ok(builder.build())
    }

    /// Engine settings derived from this config
    pub fn sync_config(&self) -> Result<SyncConfig> {
        Ok(SyncConfig::new().with_window_days(self.window_days()?))
    }

    /// Key and secret for the `app_config` stream, when both are set
    pub fn app_config_keys(&self) -> Option<(&str, &str)> {
        let key = self.branch_key.as_deref().filter(|k| !k.is_empty())?;
        let secret = self.branch_secret.as_deref().filter(|s| !s.is_empty())?;
        Some((key, secret))
    }

    /// Key for the `deeplink` stream, when links are configured
    pub fn deeplink_key(&self) -> Option<&str> {
        if self.deeplink_urls.is_empty() {
            return None;
        }
        self.branch_key.as_deref().filter(|k| !k.is_empty())
    }
}

// ============================================================================
// Lenient parsing
// ============================================================================

fn lenient_number(field: &str, value: Option<&Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Some(n)),
            _ => Err(Error::invalid_value(field, format!("not a number: {s}"))),
        },
        Some(other) => Err(Error::invalid_value(field, format!("not a number: {other}"))),
    }
}

/// A JSON list of URLs or a single comma-separated string
fn deserialize_url_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum UrlList {
        List(Vec<String>),
        Joined(String),
    }

    let urls = match Option::<UrlList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(UrlList::List(urls)) => urls,
        Some(UrlList::Joined(joined)) => joined.split(',').map(ToString::to_string).collect(),
    };
    Ok(urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect())
}
