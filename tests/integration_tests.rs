//! Integration tests using mock HTTP server
//!
//! Runs the CLI runner end to end: readiness → export job → poll → gzip
//! download → Singer messages and a state file.

use branch_export::cli::{Cli, Runner};
use branch_export::engine::Message;
use branch_export::output::MemorySink;
use branch_export::types::format_iso8601;
use branch_export::Error;
use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use flate2::write::GzEncoder;
use flate2::Compression;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Helpers
// ============================================================================

fn config_json(server: &MockServer, extra: Value) -> String {
    let mut config = json!({
        "branch_app_id": "app-1",
        "branch_access_token": "api_app_token",
        "start_date": format_iso8601(Utc::now() - ChronoDuration::days(2)),
        "base_url": server.uri(),
    });
    if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        base.extend(extra.clone());
    }
    config.to_string()
}

fn runner(args: &[&str]) -> Runner {
    let mut argv = vec!["branch-export"];
    argv.extend_from_slice(args);
    Runner::new(Cli::parse_from(argv))
}

fn gzip_lines(records: &[Value]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for record in records {
        writeln!(encoder, "{record}").unwrap();
    }
    encoder.finish().unwrap()
}

async fn mount_export(server: &MockServer, records: &[Value]) {
    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .and(header("Access-Token", "api_app_token"))
        .and(query_param("app_id", "app-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data_ready": true})))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/logs/"))
        .and(header("Access-Token", "api_app_token"))
        .and(body_partial_json(json!({
            "report_type": "eo_open",
            "response_format": "json",
            "response_format_compression": "gz",
            "allow_multiple_files": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"handle": "job-42"})))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/logs/job-42/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "response_url": [format!("{}/exports/job-42-0.json.gz", server.uri())],
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/exports/job-42-0.json.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(gzip_lines(records)))
        .mount(server)
        .await;
}

fn read_state(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

/// `topic` of every readiness call, in order
async fn readiness_topics(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/v2/data/ready/")
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["topic"].as_str().unwrap().to_string()
        })
        .collect()
}

// ============================================================================
// End-to-end sync
// ============================================================================

#[tokio::test]
async fn test_export_sync_writes_records_and_state_file() {
    let server = MockServer::start().await;
    let first = Utc::now() - ChronoDuration::hours(30);
    let last = Utc::now() - ChronoDuration::hours(6);
    mount_export(
        &server,
        &[
            json!({"id": "evt-1", "name": "OPEN", "timestamp": first.timestamp_millis()}),
            json!({"id": "evt-2", "name": "OPEN", "timestamp": last.timestamp_millis()}),
        ],
    )
    .await;

    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_json(&server, json!({}));
    let runner = runner(&[
        "--config-json",
        &config,
        "--state",
        state_path.to_str().unwrap(),
        "sync",
    ]);

    let mut sink = MemorySink::new();
    let stats = runner.sync(Some("eo_open"), false, &mut sink).await.unwrap();

    assert_eq!(stats.records_synced, 2);
    assert_eq!(stats.windows, 1);
    assert_eq!(stats.jobs, 1);

    let records = sink.records("eo_open");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], "evt-1");
    assert!(records[0]["timestamp"].is_string());
    assert!(matches!(sink.messages()[0], Message::Schema { .. }));

    let expected_bookmark = format_iso8601(
        chrono::DateTime::from_timestamp_millis(last.timestamp_millis()).unwrap(),
    );
    assert_eq!(
        read_state(&state_path),
        json!({"bookmarks": {"eo_open": {"timestamp": expected_bookmark}}})
    );
    // per-window state plus the final one
    assert_eq!(sink.states().len(), 2);
    assert!(!state_path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_schema_dir_controls_requested_fields() {
    let server = MockServer::start().await;
    mount_export(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("shared")).unwrap();
    std::fs::write(
        dir.path().join("shared/branch_events.json"),
        json!({
            "type": ["null", "object"],
            "properties": {
                "id": {"type": ["null", "string"]},
                "timestamp": {"type": ["null", "string"], "format": "date-time"},
                "persona_identifiers": {"type": ["null", "string"]},
                "user_data_os": {"type": ["null", "string"]}
            }
        })
        .to_string(),
    )
    .unwrap();

    let config = config_json(&server, json!({}));
    let runner = runner(&[
        "--config-json",
        &config,
        "--schema-dir",
        dir.path().to_str().unwrap(),
        "sync",
    ]);
    let mut sink = MemorySink::new();
    runner.sync(Some("eo_open"), false, &mut sink).await.unwrap();

    let create = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.url.path() == "/v2/logs/")
        .unwrap();
    let body: Value = serde_json::from_slice(&create.body).unwrap();
    // persona_identifiers is on the denylist
    assert_eq!(body["fields"], json!(["id", "timestamp", "user_data_os"]));
}

#[tokio::test]
async fn test_unknown_stream_is_rejected() {
    let server = MockServer::start().await;
    let config = config_json(&server, json!({}));
    let runner = runner(&["--config-json", &config, "sync"]);

    let err = runner
        .sync(Some("eo_open,eo_nothing"), false, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StreamNotFound { stream } if stream == "eo_nothing"));
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_request() {
    let server = MockServer::start().await;
    let config = json!({"start_date": "2024-01-01", "base_url": server.uri()}).to_string();
    let runner = runner(&["--config-json", &config, "sync"]);

    let err = runner
        .sync(Some("eo_open"), false, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { .. }));
    assert!(server.received_requests().await.unwrap().is_empty());
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_fatal_rate_limit_aborts_whole_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "errors": [{"error_code": 7, "message": "Rate limit exceeded, retry after 3600 seconds."}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_json(&server, json!({}));
    let runner = runner(&["--config-json", &config, "sync"]);

    let err = runner
        .sync(Some("eo_open,eo_click"), false, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert!(err.is_fatal_rate_limit());
    assert_eq!(err.to_string(), "Retry time 3600s exceeds allowed limit of 60s");
}

#[tokio::test]
async fn test_failed_stream_does_not_stop_the_rest() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "Forbidden for this app"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/url"))
        .and(query_param("branch_key", "key_live_1"))
        .and(query_param("url", "https://demo.app.link/spring"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://demo.app.link/spring",
            "channel": "email",
            "data": {"$canonical_url": "https://demo.example/spring"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");
    let config = config_json(
        &server,
        json!({"branch_key": "key_live_1", "deeplink_urls": ["https://demo.app.link/spring"]}),
    );
    let runner = runner(&[
        "--config-json",
        &config,
        "--state",
        state_path.to_str().unwrap(),
        "sync",
    ]);

    let mut sink = MemorySink::new();
    let err = runner
        .sync(Some("eo_open,deeplink"), false, &mut sink)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("eo_open"));
    assert_eq!(sink.records("deeplink").len(), 1);
    assert_eq!(sink.records("deeplink")[0]["channel"], "email");
    assert!(read_state(&state_path).get("currently_syncing").is_none());
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_json(&server, json!({}));
    let runner = runner(&["--config-json", &config, "sync"]);

    let err = runner
        .sync(Some("eo_open,eo_click"), true, &mut MemorySink::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Api { status: 401, .. }));
    assert!(err
        .to_string()
        .starts_with("HTTP-error-code: 401, Error: The access token provided is expired"));
}

// ============================================================================
// Resume
// ============================================================================

#[tokio::test]
async fn test_interrupted_run_resumes_at_currently_syncing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/data/ready/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data_ready": false})))
        .mount(&server)
        .await;

    let config = config_json(&server, json!({}));
    let state = json!({"bookmarks": {}, "currently_syncing": "eo_click"}).to_string();
    let runner = runner(&["--config-json", &config, "--state-json", &state, "sync"]);

    let mut sink = MemorySink::new();
    runner
        .sync(Some("eo_open,eo_click,eo_install"), false, &mut sink)
        .await
        .unwrap();

    assert_eq!(
        readiness_topics(&server).await,
        vec!["eo_click", "eo_install", "eo_open"]
    );
    assert_eq!(sink.states(), vec![&json!({"bookmarks": {}})]);
}
