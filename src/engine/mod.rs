//! Execution engine module
//!
//! Drives one stream at a time.
//!
//! # Overview
//!
//! - `SyncEngine` - windowed export sync and full-table sync
//! - `SyncConfig` - poll interval, job timeout, window size, record limit
//! - `Message` - SCHEMA, RECORD and STATE output

mod full_table;
mod types;

pub use full_table::{app_config_request, deeplink_requests, response_records, FullTableRequest};
pub use types::{Message, SyncConfig, SyncPhase, SyncStats};

use crate::decode::decode;
use crate::error::{Error, Result};
use crate::export::{
    Clock, ExportCredentials, ExportJobClient, ExportJobPayload, ExportWindow, SystemClock,
};
use crate::http::HttpClient;
use crate::metrics::RecordCounter;
use crate::output::RecordSink;
use crate::schema::{EmbeddedSchemas, FieldSource, JsonSchema, RecordTransformer, SchemaTransformer};
use crate::state::StateManager;
use crate::streams::{StreamDefinition, EXPORT_REPLICATION_KEY};
use crate::types::{datetime_from_millis, format_iso8601, parse_datetime, truncate_to_seconds};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Sync engine for orchestrating data extraction
pub struct SyncEngine {
    http: Arc<HttpClient>,
    credentials: ExportCredentials,
    state: StateManager,
    clock: Arc<dyn Clock>,
    fields: Arc<dyn FieldSource>,
    transformer: Arc<dyn RecordTransformer>,
    config: SyncConfig,
    stats: SyncStats,
    phase: SyncPhase,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(http: Arc<HttpClient>, credentials: ExportCredentials, state: StateManager) -> Self {
        Self {
            http,
            credentials,
            state,
            clock: Arc::new(SystemClock),
            fields: Arc::new(EmbeddedSchemas),
            transformer: Arc::new(SchemaTransformer),
            config: SyncConfig::default(),
            stats: SyncStats::default(),
            phase: SyncPhase::Done,
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_field_source(mut self, fields: Arc<dyn FieldSource>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn with_transformer(mut self, transformer: Arc<dyn RecordTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Phase reached by the last (or current) stream sync
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Sync an export stream window by window from its bookmark (or
    /// `start_date`) up to now. Records are written only when `selected`;
    /// the bookmark advances either way. Returns the number of records
    /// written.
    pub async fn sync_export_stream(
        &mut self,
        stream: &StreamDefinition,
        start_date: DateTime<Utc>,
        selected: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<usize> {
        let started = Instant::now();
        let result = self.run_export(stream, start_date, selected, sink).await;

        match &result {
            Ok(count) => {
                self.stats.add_stream();
                info!(
                    "Completed sync for {}: {count} records in {:.1}s",
                    stream.stream_id,
                    started.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                self.phase = SyncPhase::Failed;
                info!("Sync for {} failed: {e}", stream.stream_id);
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        self.stats.set_duration(started.elapsed().as_millis() as u64);
        result
    }

    async fn run_export(
        &mut self,
        stream: &StreamDefinition,
        start_date: DateTime<Utc>,
        selected: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<usize> {
        let report_type = stream.report_type().ok_or_else(|| {
            Error::config(format!("{} is not an export stream", stream.stream_id))
        })?;
        let stream_id = stream.stream_id;
        let key = stream.replication_key().unwrap_or(EXPORT_REPLICATION_KEY);

        let schema = self.fields.load_schema(stream.schema_path)?;
        let fields = schema.field_names();
        if selected {
            sink.write(&schema_message(stream, &schema))?;
        }

        let bookmark = self
            .state
            .get_bookmark(stream_id, key, &format_iso8601(start_date))
            .await;
        let initial_bookmark = parse_datetime(&bookmark)
            .map_err(|e| Error::state(format!("Invalid bookmark for {stream_id}: {e}")))?;
        let job_run_start = truncate_to_seconds(self.clock.now());

        let jobs = ExportJobClient::new(
            Arc::clone(&self.http),
            Arc::clone(&self.clock),
            self.credentials.clone(),
        )
        .with_timing(self.config.poll_interval, self.config.job_timeout);

        self.phase = SyncPhase::ReadinessCheck;
        if !jobs.check_readiness(initial_bookmark, report_type.as_str()).await? {
            info!(
                "Data is not ready for the time period {} against the report_type {report_type}",
                format_iso8601(initial_bookmark)
            );
            self.phase = SyncPhase::Done;
            return Ok(0);
        }

        let window_size = chrono::Duration::days(i64::from(self.config.effective_window_days()));
        if self.config.window_days > self.config.effective_window_days() {
            info!(
                "Window size {} is greater than {}, setting to max",
                self.config.window_days,
                self.config.effective_window_days()
            );
        }

        let mut counter = RecordCounter::new(stream_id, self.config.job_timeout);
        let mut max_bookmark = initial_bookmark;
        let mut cursor = initial_bookmark;

        while cursor < job_run_start {
            let window_end = truncate_to_seconds((cursor + window_size).min(self.clock.now()));
            if window_end <= cursor {
                break;
            }
            let window = ExportWindow::new(cursor, window_end)?;
            debug!("Exporting {stream_id} for {window}");

            self.phase = SyncPhase::JobCycle;
            let payload = ExportJobPayload::new(report_type.as_str(), window, fields.clone())
                .with_limit(self.config.record_limit);
            let handle = jobs.create_job(&payload).await?;
            self.stats.jobs += 1;

            self.phase = SyncPhase::Polling;
            let completed = jobs.wait_for_completion(&handle).await?;
            self.stats.polls += completed.polls;

            self.phase = SyncPhase::Extracting;
            for url in completed.result_urls()? {
                let mut records = decode(&self.http, &url).await?;
                while let Some(raw) = records.try_next().await? {
                    let record = self.transformer.transform(raw, &schema)?;
                    let timestamp = record_timestamp(&record, key)?;
                    if timestamp < initial_bookmark {
                        self.stats.records_skipped += 1;
                        continue;
                    }
                    if selected {
                        sink.write(&Message::record(stream_id, record, self.clock.now()))?;
                        counter.increment();
                        self.stats.add_records(1);
                    }
                    max_bookmark = max_bookmark.max(timestamp);
                }
                debug!("Read {} lines from result file of {stream_id}", records.lines_read());
            }

            self.phase = SyncPhase::Advancing;
            self.state
                .set_bookmark(stream_id, key, format_iso8601(max_bookmark))
                .await;
            let snapshot = self.state.persist().await?;
            sink.write(&Message::state(snapshot))?;
            sink.flush()?;
            self.stats.windows += 1;

            cursor = window_end;
        }

        self.phase = SyncPhase::Done;
        Ok(counter.finish())
    }

    /// Sync a full-table stream: one GET per request, every record written
    pub async fn sync_full_table(
        &mut self,
        stream: &StreamDefinition,
        requests: Vec<FullTableRequest>,
        selected: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<usize> {
        let schema = self.fields.load_schema(stream.schema_path)?;
        if !selected {
            return Ok(0);
        }
        sink.write(&schema_message(stream, &schema))?;

        let mut counter = RecordCounter::new(stream.stream_id, self.config.job_timeout);
        for FullTableRequest { path, request } in requests {
            let response = self.http.get(&path, request).await?;
            for raw in response_records(response) {
                let record = self.transformer.transform(raw, &schema)?;
                sink.write(&Message::record(stream.stream_id, record, self.clock.now()))?;
                counter.increment();
            }
        }
        sink.flush()?;

        let count = counter.finish();
        self.stats.add_records(count);
        self.stats.add_stream();
        self.phase = SyncPhase::Done;
        Ok(count)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

/// SCHEMA message for a stream
pub fn schema_message(stream: &StreamDefinition, schema: &JsonSchema) -> Message {
    Message::Schema {
        stream: stream.stream_id.to_string(),
        schema: schema.to_json(),
        key_properties: stream.key_properties.iter().map(ToString::to_string).collect(),
        bookmark_properties: stream.replication_keys.iter().map(ToString::to_string).collect(),
    }
}

/// Replication-key timestamp of a record. Strings are parsed as ISO-8601,
/// numbers as epoch milliseconds.
pub fn record_timestamp(record: &Value, key: &str) -> Result<DateTime<Utc>> {
    let invalid = |message: String| Error::ReplicationKey {
        key: key.to_string(),
        message,
    };

    match record.get(key) {
        Some(Value::String(s)) => parse_datetime(s).map_err(|e| invalid(e.to_string())),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| invalid(format!("not an integer timestamp: {n}")))
            .and_then(|ms| datetime_from_millis(ms).map_err(|e| invalid(e.to_string()))),
        Some(other) => Err(invalid(format!("unexpected value {other}"))),
        None => Err(invalid("missing from record".to_string())),
    }
}
