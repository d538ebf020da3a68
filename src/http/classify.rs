//! Response classification
//!
//! Turns a raw status code and body into either the decoded JSON payload or
//! a classified [`Error`]. Branch embeds some failures in the body
//! (`errors[]`), so the body is inspected before the status code:
//!
//! 1. a 400 naming fields that are "not available for exports" becomes
//!    [`Error::UnsupportedFields`];
//! 2. any response, even a 2xx, with `error_code == 7` and a
//!    "retry after N seconds" message becomes a rate-limit error;
//! 3. everything else is classified by status through the taxonomy table.

use crate::error::{Error, Result, MAX_RETRY_WAIT_SECONDS};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::info;

/// Branch error code for throttled requests
const RATE_LIMIT_ERROR_CODE: i64 = 7;

/// Statuses treated as success
const SUCCESS_STATUSES: [u16; 3] = [200, 201, 204];

static UNSUPPORTED_FIELD_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^\s*(?:field\s+)?['"`]?([A-Za-z0-9_$~.\-]+)['"`]?\s+(?:field\s+)?is\s+not\s+available\s+for\s+exports"#,
    )
    .expect("valid unsupported field regex")
});

static RETRY_AFTER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry after (\d+)").expect("valid retry-after regex"));

/// Classify a response from the Branch API
pub fn classify_response(status: u16, text: &str) -> Result<Value> {
    let body: Option<Value> = if text.trim().is_empty() {
        None
    } else {
        serde_json::from_str(text).ok()
    };

    if status == 400 {
        if let Some(fields) = body.as_ref().and_then(unsupported_fields) {
            return Err(Error::UnsupportedFields {
                fields,
                body: body.unwrap_or(Value::Null),
            });
        }
    }

    if let Some(ref payload) = body {
        check_rate_limit(payload)?;
    }

    if SUCCESS_STATUSES.contains(&status) {
        return match body {
            Some(value) => Ok(value),
            None if text.trim().is_empty() => Ok(Value::Null),
            None => Err(Error::decode(format!(
                "Response with status {status} is not valid JSON"
            ))),
        };
    }

    Err(Error::api(status, body))
}

/// Field names rejected by the export API, sorted and deduplicated
pub fn unsupported_fields(body: &Value) -> Option<Vec<String>> {
    let fields: BTreeSet<String> = error_entries(body)
        .filter_map(|err| err.get("message").and_then(Value::as_str))
        .filter_map(extract_unsupported_field)
        .collect();

    if fields.is_empty() {
        None
    } else {
        Some(fields.into_iter().collect())
    }
}

/// Extract the field name from a "<field> field is not available for exports" message
pub fn extract_unsupported_field(message: &str) -> Option<String> {
    UNSUPPORTED_FIELD_REGEX
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fail when the body reports Branch's throttling error code
pub fn check_rate_limit(body: &Value) -> Result<()> {
    for err in error_entries(body) {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("");
        if error_code(err) != Some(RATE_LIMIT_ERROR_CODE)
            || !message.to_lowercase().contains("retry after")
        {
            continue;
        }

        let retry_after = extract_retry_seconds(message);
        info!(
            "Branch rate limit encountered. Retry after {} seconds",
            retry_after.map_or_else(|| "unknown".to_string(), |s| s.to_string())
        );

        return match retry_after {
            Some(seconds) if seconds > MAX_RETRY_WAIT_SECONDS => Err(Error::FatalRateLimit {
                retry_after_seconds: seconds,
                limit_seconds: MAX_RETRY_WAIT_SECONDS,
                body: Some(body.clone()),
            }),
            _ => Err(Error::RateLimited {
                message: message.to_string(),
                retry_after_seconds: retry_after,
            }),
        };
    }

    Ok(())
}

/// Seconds from a "retry after N" message
pub fn extract_retry_seconds(message: &str) -> Option<u64> {
    RETRY_AFTER_REGEX
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn error_entries(body: &Value) -> impl Iterator<Item = &Value> {
    body.get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn error_code(err: &Value) -> Option<i64> {
    match err.get("error_code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
