//! Export job protocol client
//!
//! Three calls against the export API: readiness, create and poll. Creation
//! recovers once from a field rejection; polling runs until the job reaches
//! a terminal status or the job timeout passes.

use super::clock::Clock;
use super::contract::{
    DataReadyPayload, EndpointConfig, ExportCredentials, ExportJobPayload, CREATE_JOB_ENDPOINT,
    DATA_READY_ENDPOINT, POLL_JOB_ENDPOINT,
};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::template::{render_path, PathParams};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default wait between two polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);

/// Default limit on how long one job may take
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(3600);

/// Server-reported state of an export job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Complete,
    Cancelled,
    Failed,
    /// Any other value, or `NA` when the field is missing
    Unknown(String),
}

impl JobStatus {
    /// Read the `status` field of a poll response
    pub fn from_response(response: &Value) -> Self {
        match response.get("status").and_then(Value::as_str) {
            Some(status) => Self::parse(status),
            None => Self::Unknown("NA".to_string()),
        }
    }

    pub fn parse(status: &str) -> Self {
        match status {
            "complete" => Self::Complete,
            "cancelled" => Self::Cancelled,
            "fail" | "failed" => Self::Failed,
            "pending" | "in_progress" | "running" | "queued" => Self::Pending,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Cancelled => "cancelled",
            Self::Failed => "fail",
            Self::Unknown(s) => s,
        }
    }

    /// Whether polling should stop
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-side identifier of one export job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExportJobHandle(String);

impl ExportJobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExportJobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job that reported `complete`
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub handle: ExportJobHandle,
    /// Last poll response
    pub response: Value,
    /// Number of polls it took
    pub polls: usize,
}

impl CompletedJob {
    /// Result file URLs, in order. `response_url` is either one URL or a
    /// list of them for multi-file exports.
    pub fn result_urls(&self) -> Result<Vec<String>> {
        match self.response.get("response_url") {
            Some(Value::String(url)) => Ok(vec![url.clone()]),
            Some(Value::Array(urls)) => urls
                .iter()
                .map(|u| {
                    u.as_str().map(ToString::to_string).ok_or_else(|| {
                        Error::decode(format!("Invalid entry in response_url: {u}"))
                    })
                })
                .collect(),
            _ => Err(Error::decode(format!(
                "Export job {} is complete but has no response_url",
                self.handle
            ))),
        }
    }
}

/// Client for the export job protocol
pub struct ExportJobClient {
    http: Arc<HttpClient>,
    clock: Arc<dyn Clock>,
    credentials: ExportCredentials,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl ExportJobClient {
    pub fn new(http: Arc<HttpClient>, clock: Arc<dyn Clock>, credentials: ExportCredentials) -> Self {
        Self {
            http,
            clock,
            credentials,
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    /// Set poll interval and job timeout
    #[must_use]
    pub fn with_timing(mut self, poll_interval: Duration, job_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.job_timeout = job_timeout;
        self
    }

    pub fn credentials(&self) -> &ExportCredentials {
        &self.credentials
    }

    /// Whether data for `date` and `report_type` is finalized
    pub async fn check_readiness(&self, date: DateTime<Utc>, report_type: &str) -> Result<bool> {
        let payload = DataReadyPayload::new(date, report_type, &self.credentials.app_id);
        let request = DATA_READY_ENDPOINT
            .request(&self.credentials)?
            .json(serde_json::to_value(&payload)?);

        let response = self.send(&DATA_READY_ENDPOINT, DATA_READY_ENDPOINT.path, request).await?;

        response
            .get("data_ready")
            .and_then(Value::as_bool)
            .ok_or_else(|| Error::decode("Readiness response has no boolean data_ready field"))
    }

    /// Create an export job. A rejection naming unsupported fields is
    /// retried once without them; a second failure propagates.
    pub async fn create_job(&self, payload: &ExportJobPayload) -> Result<ExportJobHandle> {
        let first = self.send_create(payload, &BTreeSet::new()).await;

        let response = match first {
            Err(Error::UnsupportedFields { fields, .. }) => {
                warn!(
                    "Export of {} rejected fields [{}], retrying without them",
                    payload.report_type,
                    fields.join(", ")
                );
                let rejected: BTreeSet<String> = fields.into_iter().collect();
                self.send_create(payload, &rejected).await?
            }
            other => other?,
        };

        let handle = response
            .get("handle")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::decode("Create job response has no handle"))?;

        info!(
            "Received request handle {handle} for export report type {}",
            payload.report_type
        );
        Ok(ExportJobHandle::new(handle))
    }

    async fn send_create(&self, payload: &ExportJobPayload, rejected: &BTreeSet<String>) -> Result<Value> {
        let request = CREATE_JOB_ENDPOINT
            .request(&self.credentials)?
            .json(payload.to_payload(rejected));
        self.send(&CREATE_JOB_ENDPOINT, CREATE_JOB_ENDPOINT.path, request).await
    }

    /// Fetch the current status of a job
    pub async fn poll_job(&self, handle: &ExportJobHandle) -> Result<(JobStatus, Value)> {
        let path = render_path(
            POLL_JOB_ENDPOINT.path,
            &PathParams::new().with("request_handle", handle.as_str()),
        )?;
        let request = POLL_JOB_ENDPOINT.request(&self.credentials)?;
        let response = self.send(&POLL_JOB_ENDPOINT, &path, request).await?;

        Ok((JobStatus::from_response(&response), response))
    }

    /// Poll until the job completes, fails or times out
    pub async fn wait_for_completion(&self, handle: &ExportJobHandle) -> Result<CompletedJob> {
        let timeout = chrono::Duration::from_std(self.job_timeout)
            .map_err(|e| Error::config(format!("Invalid job timeout: {e}")))?;
        let deadline = self.clock.now() + timeout;
        let mut polls = 0;

        while self.clock.now() < deadline {
            let (status, response) = self.poll_job(handle).await?;
            polls += 1;
            info!("Current export status of handle {handle} is {status}");

            match status {
                JobStatus::Complete => {
                    return Ok(CompletedJob {
                        handle: handle.clone(),
                        response,
                        polls,
                    })
                }
                JobStatus::Cancelled | JobStatus::Failed => {
                    let raw = response
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or(status.as_str())
                        .to_string();
                    return Err(Error::ExportFailed {
                        status: raw,
                        body: Some(response),
                    })
                }
                JobStatus::Pending | JobStatus::Unknown(_) => {}
            }

            self.clock.sleep(self.poll_interval).await;
        }

        Err(Error::ExportTimeout {
            timeout_minutes: self.job_timeout.as_secs() / 60,
        })
    }

    async fn send(
        &self,
        endpoint: &EndpointConfig,
        path: &str,
        request: crate::http::RequestConfig,
    ) -> Result<Value> {
        self.http.execute(endpoint.method, path, request).await
    }
}

impl std::fmt::Debug for ExportJobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportJobClient")
            .field("credentials", &self.credentials)
            .field("poll_interval", &self.poll_interval)
            .field("job_timeout", &self.job_timeout)
            .finish_non_exhaustive()
    }
}
