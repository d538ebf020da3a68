//! Requests behind the full-table streams

use crate::error::{Error, Result};
use crate::http::RequestConfig;
use crate::template::{render_path, PathParams};
use serde_json::Value;

const APP_CONFIG_PATH: &str = "v1/app/{{ branch_key }}";
const DEEPLINK_PATH: &str = "v1/url";

/// One GET issued by a full-table stream
#[derive(Debug, Clone)]
pub struct FullTableRequest {
    pub path: String,
    pub request: RequestConfig,
}

/// `GET v1/app/{branch_key}?branch_secret=...`
pub fn app_config_request(branch_key: &str, branch_secret: &str) -> Result<FullTableRequest> {
    require("branch_key", branch_key)?;
    require("branch_secret", branch_secret)?;

    Ok(FullTableRequest {
        path: render_path(
            APP_CONFIG_PATH,
            &PathParams::new().with("branch_key", branch_key),
        )?,
        request: RequestConfig::new().query("branch_secret", branch_secret),
    })
}

/// One `GET v1/url?url=...&branch_key=...` per deep link
pub fn deeplink_requests(urls: &[String], branch_key: &str) -> Result<Vec<FullTableRequest>> {
    require("branch_key", branch_key)?;

    Ok(urls
        .iter()
        .filter(|url| !url.trim().is_empty())
        .map(|url| FullTableRequest {
            path: DEEPLINK_PATH.to_string(),
            request: RequestConfig::new()
                .query("url", url.trim())
                .query("branch_key", branch_key),
        })
        .collect())
}

/// Records carried by a full-table response
pub fn response_records(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::missing_field(field));
    }
    Ok(())
}
