//! Tests for the export job module

use super::*;
use crate::error::Error;
use crate::http::{HttpClient, HttpClientConfig};
use crate::types::BackoffType;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_case::test_case;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

/// Returns the queued instants in order, then keeps repeating the last one
struct ScriptedClock {
    times: Mutex<VecDeque<DateTime<Utc>>>,
    last: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ScriptedClock {
    fn seconds_after(start: DateTime<Utc>, offsets: &[i64]) -> Self {
        Self {
            times: Mutex::new(
                offsets
                    .iter()
                    .map(|s| start + chrono::Duration::seconds(*s))
                    .collect(),
            ),
            last: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ScriptedClock {
    fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.times.lock().unwrap().pop_front() {
            *last = next;
        }
        *last
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn http_client(base_url: &str) -> Arc<HttpClient> {
    let config = HttpClientConfig::builder()
        .base_url(base_url)
        .backoff(
            BackoffType::Exponential,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .no_rate_limit()
        .build();
    Arc::new(HttpClient::with_config(config).unwrap())
}

fn job_client(server: &MockServer, clock: Arc<dyn Clock>) -> ExportJobClient {
    ExportJobClient::new(
        http_client(&server.uri()),
        clock,
        ExportCredentials::new("12345", "token"),
    )
    .with_timing(Duration::from_secs(2), Duration::from_secs(10))
}

fn schema_fields(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(ToString::to_string).collect()
}

fn window() -> ExportWindow {
    ExportWindow::new(start(), start() + chrono::Duration::days(60)).unwrap()
}

// ============================================================================
// Contract Tests
// ============================================================================

#[test]
fn test_denylist_has_no_duplicates() {
    let unique: BTreeSet<&str> = GLOBAL_EXPORT_FIELD_DENYLIST.iter().copied().collect();
    assert_eq!(unique.len(), GLOBAL_EXPORT_FIELD_DENYLIST.len());
    assert!(unique.contains("datasource"));
    assert!(unique.contains("event_data_custom_param_10"));
}

#[test]
fn test_job_payload_excludes_denylist_and_rejected() {
    let payload = ExportJobPayload::new(
        "eo_open",
        window(),
        schema_fields(&["timestamp", "id", "datasource", "custom_field", "name"]),
    );

    let body = payload.to_payload(&schema_fields(&["custom_field"]));

    assert_eq!(
        body,
        json!({
            "start_date": "2024-01-01T00:00:00Z",
            "end_date": "2024-03-01T00:00:00Z",
            "report_type": "eo_open",
            "fields": ["id", "name", "timestamp"],
            "limit": 1_000_000,
            "timezone": "UTC",
            "filter": [],
            "response_format": "json",
            "allow_multiple_files": true,
            "response_format_compression": "gz"
        })
    );
}

#[test]
fn test_data_ready_payload() {
    let payload = DataReadyPayload::new(
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        "eo_click",
        "12345",
    );
    assert_eq!(
        serde_json::to_value(&payload).unwrap(),
        json!({
            "date": "2024-05-06 07:08:09",
            "warehouse_meta_type": "EVENT",
            "topic": "eo_click",
            "app_id": "12345"
        })
    );
}

#[test]
fn test_endpoint_request_requires_credentials() {
    let request = CREATE_JOB_ENDPOINT
        .request(&ExportCredentials::new("12345", "token"))
        .unwrap();
    assert_eq!(request.headers.get("Access-Token"), Some(&"token".to_string()));
    assert_eq!(request.query.get("app_id"), Some(&"12345".to_string()));

    let err = CREATE_JOB_ENDPOINT
        .request(&ExportCredentials::new("12345", ""))
        .unwrap_err();
    assert!(err.to_string().contains("Access-Token"));
}

#[test]
fn test_window_must_move_forward() {
    assert!(ExportWindow::new(start(), start()).is_err());
    assert_eq!(window().duration(), chrono::Duration::days(60));
    assert_eq!(
        window().to_string(),
        "[2024-01-01T00:00:00Z, 2024-03-01T00:00:00Z)"
    );
}

#[test]
fn test_credentials_debug_hides_token() {
    let debug = format!("{:?}", ExportCredentials::new("12345", "very-secret"));
    assert!(!debug.contains("very-secret"));
}

// ============================================================================
// JobStatus Tests
// ============================================================================

#[test_case(json!({"status": "complete"}), JobStatus::Complete ; "complete")]
#[test_case(json!({"status": "cancelled"}), JobStatus::Cancelled ; "cancelled")]
#[test_case(json!({"status": "fail"}), JobStatus::Failed ; "fail")]
#[test_case(json!({"status": "failed"}), JobStatus::Failed ; "failed")]
#[test_case(json!({"status": "in_progress"}), JobStatus::Pending ; "in progress")]
#[test_case(json!({"status": "queued"}), JobStatus::Pending ; "queued")]
#[test_case(json!({"status": "paused"}), JobStatus::Unknown("paused".to_string()) ; "other")]
#[test_case(json!({}), JobStatus::Unknown("NA".to_string()) ; "missing")]
fn test_job_status_from_response(response: Value, expected: JobStatus) {
    assert_eq!(JobStatus::from_response(&response), expected);
}

#[test]
fn test_completed_job_result_urls() {
    let job = |response: Value| CompletedJob {
        handle: ExportJobHandle::new("h"),
        response,
        polls: 1,
    };

    assert_eq!(
        job(json!({"response_url": "https://files/a.gz"}))
            .result_urls()
            .unwrap(),
        vec!["https://files/a.gz"]
    );
    assert_eq!(
        job(json!({"response_url": ["https://files/a.gz", "https://files/b.gz"]}))
            .result_urls()
            .unwrap(),
        vec!["https://files/a.gz", "https://files/b.gz"]
    );
    assert!(job(json!({"status": "complete"})).result_urls().is_err());
}

// ============================================================================
// Protocol Tests
// ============================================================================

#[tokio::test]
async fn test_check_readiness() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .and(query_param("app_id", "12345"))
        .and(header("Access-Token", "token"))
        .and(body_json(json!({
            "date": "2024-01-01 00:00:00",
            "warehouse_meta_type": "EVENT",
            "topic": "eo_open",
            "app_id": "12345"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data_ready": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    assert!(client.check_readiness(start(), "eo_open").await.unwrap());
}

#[tokio::test]
async fn test_check_readiness_not_ready() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data_ready": false})))
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    assert!(!client.check_readiness(start(), "eo_open").await.unwrap());
}

#[tokio::test]
async fn test_create_job_returns_handle() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .and(header("Access-Token", "token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"handle": "abc-123"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    let payload = ExportJobPayload::new("eo_open", window(), schema_fields(&["id"]));
    let handle = client.create_job(&payload).await.unwrap();
    assert_eq!(handle.as_str(), "abc-123");
}

#[tokio::test]
async fn test_create_job_retries_once_without_rejected_fields() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"message": "custom_field field is not available for exports"}]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"handle": "h-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    let payload = ExportJobPayload::new(
        "eo_click",
        window(),
        schema_fields(&["custom_field", "id", "timestamp"]),
    );
    let handle = client.create_job(&payload).await.unwrap();
    assert_eq!(handle.as_str(), "h-2");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let first: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(first["fields"], json!(["custom_field", "id", "timestamp"]));
    assert_eq!(second["fields"], json!(["id", "timestamp"]));
}

#[tokio::test]
async fn test_create_job_second_rejection_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "errors": [{"message": "id field is not available for exports"}]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    let payload = ExportJobPayload::new("eo_click", window(), schema_fields(&["id"]));
    let err = client.create_job(&payload).await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedFields { .. }));
}

#[tokio::test]
async fn test_create_job_other_errors_are_not_recovered() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    let payload = ExportJobPayload::new("eo_click", window(), schema_fields(&["id"]));
    let err = client.create_job(&payload).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "HTTP-error-code: 403, Error: You are missing the following required scopes: read"
    );
}

#[tokio::test]
async fn test_poll_job_uses_handle_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/abc-123/"))
        .and(query_param("app_id", "12345"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(SystemClock));
    let (status, response) = client
        .poll_job(&ExportJobHandle::new("abc-123"))
        .await
        .unwrap();
    assert_eq!(status, JobStatus::Pending);
    assert_eq!(response["status"], "pending");
}

#[tokio::test]
async fn test_wait_completes_on_third_poll() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in_progress"})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "response_url": "https://files.example.com/export.json.gz"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ScriptedClock::seconds_after(start(), &[0, 2, 4, 6, 8, 11]));
    let client = job_client(&server, clock.clone());

    let job = client
        .wait_for_completion(&ExportJobHandle::new("h"))
        .await
        .unwrap();

    assert_eq!(job.polls, 3);
    assert_eq!(job.response["status"], "complete");
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2); 2]);
}

#[tokio::test]
async fn test_wait_times_out_after_four_polls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "in_progress"})))
        .expect(4)
        .mount(&server)
        .await;

    let clock = Arc::new(ScriptedClock::seconds_after(start(), &[0, 2, 4, 6, 8, 11]));
    let client = job_client(&server, clock);

    let err = client
        .wait_for_completion(&ExportJobHandle::new("h"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ExportTimeout { .. }));
}

#[tokio::test]
async fn test_wait_timeout_message_in_minutes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let client = ExportJobClient::new(
        http_client(&server.uri()),
        Arc::new(ManualClock::new(start())),
        ExportCredentials::new("12345", "token"),
    )
    .with_timing(Duration::from_secs(120), Duration::from_secs(3600));

    let err = client
        .wait_for_completion(&ExportJobHandle::new("h"))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Export timed out after 60 minutes");
    assert_eq!(server.received_requests().await.unwrap().len(), 30);
}

#[test_case("cancelled" ; "cancelled")]
#[test_case("fail" ; "fail")]
#[tokio::test]
async fn test_wait_fails_on_terminal_failure(status: &str) {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": status})))
        .expect(1)
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(ManualClock::new(start())));
    let err = client
        .wait_for_completion(&ExportJobHandle::new("h"))
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        format!("Export job failed with status: {status}")
    );
    assert!(err.response_body().is_some());
}

#[tokio::test]
async fn test_wait_keeps_polling_when_status_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/h/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "response_url": ["https://files/a.gz"]
        })))
        .mount(&server)
        .await;

    let client = job_client(&server, Arc::new(ManualClock::new(start())));
    let job = client
        .wait_for_completion(&ExportJobHandle::new("h"))
        .await
        .unwrap();
    assert_eq!(job.polls, 2);
}
