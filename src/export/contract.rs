//! Export API contract
//!
//! Static endpoint descriptions, request payloads and the export window.

use crate::error::{Error, Result};
use crate::http::RequestConfig;
use crate::types::{format_datetime_string, format_iso8601, Method};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Most rows a single export job may return
pub const MAX_RECORDS_TO_FETCH: u64 = 1_000_000;

/// Longest window a single export job may cover
pub const MAX_WINDOW_DAYS: u32 = 60;

/// Schema fields the export API never accepts. They are removed from every
/// job payload before the first attempt.
pub const GLOBAL_EXPORT_FIELD_DENYLIST: [&str; 31] = [
    "datasource",
    "persona_identifiers",
    "user_data_referral_source",
    "last_attributed_touch_data_dollar_fb_data_terms_not_signed",
    "last_cta_view_data_tilde_advertising_partner_id",
    "last_cta_view_data_tilde_agency_id",
    "last_cta_view_data_tilde_customer_ad_name",
    "last_cta_view_data_tilde_customer_ad_set_name",
    "last_cta_view_data_tilde_customer_campaign",
    "last_cta_view_data_tilde_customer_keyword",
    "last_cta_view_data_tilde_customer_placement",
    "last_cta_view_data_tilde_customer_secondary_publisher",
    "last_cta_view_data_tilde_customer_sub_site_name",
    "last_cta_view_data_tilde_keyword",
    "last_cta_view_data_tilde_placement_id",
    "last_cta_view_data_tilde_secondary_publisher_id",
    "last_cta_view_data_tilde_sub_site_name",
    "last_cta_view_data_tilde_tune_publisher_id",
    "last_cta_view_data_tilde_tune_publisher_name",
    "last_cta_view_data_tilde_tune_publisher_sub1",
    "last_cta_view_data_tilde_tune_publisher_sub2",
    "last_cta_view_data_tilde_tune_publisher_sub3",
    "last_cta_view_data_tilde_tune_publisher_sub4",
    "last_cta_view_data_tilde_tune_publisher_sub5",
    "event_data_custom_param_4",
    "event_data_custom_param_5",
    "event_data_custom_param_6",
    "event_data_custom_param_7",
    "event_data_custom_param_8",
    "event_data_custom_param_9",
    "event_data_custom_param_10",
];

/// Header carrying the API access token
pub const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// Query parameter carrying the app id
pub const APP_ID_PARAM: &str = "app_id";

// ============================================================================
// Endpoints
// ============================================================================

/// One export API endpoint: verb, path template and the names (not values)
/// of the headers and query parameters it requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub method: Method,
    pub path: &'static str,
    pub required_headers: &'static [&'static str],
    pub required_query: &'static [&'static str],
}

/// Readiness check for a report type and date
pub const DATA_READY_ENDPOINT: EndpointConfig = EndpointConfig {
    method: Method::POST,
    path: "v2/data/ready/",
    required_headers: &[ACCESS_TOKEN_HEADER],
    required_query: &[APP_ID_PARAM],
};

/// Export job creation
pub const CREATE_JOB_ENDPOINT: EndpointConfig = EndpointConfig {
    method: Method::POST,
    path: "v2/logs/",
    required_headers: &[ACCESS_TOKEN_HEADER],
    required_query: &[APP_ID_PARAM],
};

/// Export job status
pub const POLL_JOB_ENDPOINT: EndpointConfig = EndpointConfig {
    method: Method::GET,
    path: "v2/logs/{{ request_handle }}/",
    required_headers: &[ACCESS_TOKEN_HEADER],
    required_query: &[APP_ID_PARAM],
};

/// Values for the export endpoints' required headers and query parameters
#[derive(Clone)]
pub struct ExportCredentials {
    pub app_id: String,
    pub access_token: String,
}

impl ExportCredentials {
    pub fn new(app_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            access_token: access_token.into(),
        }
    }

    fn header(&self, name: &str) -> Option<&str> {
        match name {
            ACCESS_TOKEN_HEADER => Some(self.access_token.as_str()),
            _ => None,
        }
        .filter(|v| !v.is_empty())
    }

    fn query(&self, name: &str) -> Option<&str> {
        match name {
            APP_ID_PARAM => Some(self.app_id.as_str()),
            _ => None,
        }
        .filter(|v| !v.is_empty())
    }
}

impl std::fmt::Debug for ExportCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportCredentials")
            .field("app_id", &self.app_id)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl EndpointConfig {
    /// Request config carrying every required header and query parameter
    pub fn request(&self, credentials: &ExportCredentials) -> Result<RequestConfig> {
        let mut config = RequestConfig::new();

        for name in self.required_headers {
            let value = credentials.header(name).ok_or_else(|| {
                Error::config(format!("Missing required header '{name}' for {}", self.path))
            })?;
            config = config.header(*name, value);
        }

        for name in self.required_query {
            let value = credentials.query(name).ok_or_else(|| {
                Error::config(format!(
                    "Missing required query parameter '{name}' for {}",
                    self.path
                ))
            })?;
            config = config.query(*name, value);
        }

        Ok(config)
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Body of the readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataReadyPayload {
    pub date: String,
    pub warehouse_meta_type: &'static str,
    pub topic: String,
    pub app_id: String,
}

impl DataReadyPayload {
    pub fn new(date: DateTime<Utc>, report_type: &str, app_id: &str) -> Self {
        Self {
            date: format_datetime_string(date),
            warehouse_meta_type: "EVENT",
            topic: report_type.to_string(),
            app_id: app_id.to_string(),
        }
    }
}

/// An export job request, before field rejection is applied
#[derive(Debug, Clone)]
pub struct ExportJobPayload {
    pub report_type: String,
    pub window: ExportWindow,
    /// Every field the schema defines
    pub fields: BTreeSet<String>,
    pub limit: u64,
    pub timezone: String,
}

impl ExportJobPayload {
    pub fn new(report_type: impl Into<String>, window: ExportWindow, fields: BTreeSet<String>) -> Self {
        Self {
            report_type: report_type.into(),
            window,
            fields,
            limit: MAX_RECORDS_TO_FETCH,
            timezone: "UTC".to_string(),
        }
    }

    /// Override the row limit
    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Requested fields: schema fields minus the denylist minus `rejected`
    pub fn requested_fields<'a>(&'a self, rejected: &BTreeSet<String>) -> Vec<&'a str> {
        self.fields
            .iter()
            .map(String::as_str)
            .filter(|f| !GLOBAL_EXPORT_FIELD_DENYLIST.contains(f) && !rejected.contains(*f))
            .collect()
    }

    /// JSON body for the create call
    pub fn to_payload(&self, rejected: &BTreeSet<String>) -> Value {
        json!({
            "start_date": format_iso8601(self.window.start),
            "end_date": format_iso8601(self.window.end),
            "report_type": self.report_type,
            "fields": self.requested_fields(rejected),
            "limit": self.limit,
            "timezone": self.timezone,
            "filter": [],
            "response_format": "json",
            "allow_multiple_files": true,
            "response_format_compression": "gz",
        })
    }
}

// ============================================================================
// Window
// ============================================================================

/// Half-open date range covered by one export job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExportWindow {
    /// A window must end after it starts
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end <= start {
            return Err(Error::Other(format!(
                "Export window end {} is not after start {}",
                format_iso8601(end),
                format_iso8601(start)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl std::fmt::Display for ExportWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", format_iso8601(self.start), format_iso8601(self.end))
    }
}
