//! Engine types
//!
//! Message types and configuration for the sync engine.

use crate::export::{
    DEFAULT_JOB_TIMEOUT, DEFAULT_POLL_INTERVAL, MAX_RECORDS_TO_FETCH, MAX_WINDOW_DAYS,
};
use crate::types::format_iso8601;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::time::Duration;

/// A message emitted during sync
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Stream schema, sent before the stream's first record
    Schema {
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
        bookmark_properties: Vec<String>,
    },
    /// One record
    Record {
        stream: String,
        record: Value,
        time_extracted: DateTime<Utc>,
    },
    /// Full state document
    State { value: Value },
}

impl Message {
    /// Create a record message
    pub fn record(stream: impl Into<String>, record: Value, time_extracted: DateTime<Utc>) -> Self {
        Self::Record {
            stream: stream.into(),
            record,
            time_extracted,
        }
    }

    /// Create a state message
    pub fn state(value: Value) -> Self {
        Self::State { value }
    }

    /// Check if this is a record message
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record { .. })
    }

    /// Check if this is a state message
    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Singer wire form
    pub fn to_json(&self) -> Value {
        match self {
            Self::Schema {
                stream,
                schema,
                key_properties,
                bookmark_properties,
            } => json!({
                "type": "SCHEMA",
                "stream": stream,
                "schema": schema,
                "key_properties": key_properties,
                "bookmark_properties": bookmark_properties,
            }),
            Self::Record {
                stream,
                record,
                time_extracted,
            } => json!({
                "type": "RECORD",
                "stream": stream,
                "record": record,
                "time_extracted": format_iso8601(*time_extracted),
            }),
            Self::State { value } => json!({
                "type": "STATE",
                "value": value,
            }),
        }
    }
}

/// Where an export stream sync currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ReadinessCheck,
    JobCycle,
    Polling,
    Extracting,
    Advancing,
    Done,
    Failed,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::ReadinessCheck => "readiness_check",
            SyncPhase::JobCycle => "job_cycle",
            SyncPhase::Polling => "polling",
            SyncPhase::Extracting => "extracting",
            SyncPhase::Advancing => "advancing",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Configuration for sync operation
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Time between job status polls
    pub poll_interval: Duration,
    /// Give up on a job after this long
    pub job_timeout: Duration,
    /// Days per export window, capped at 60
    pub window_days: u32,
    /// Record limit sent with every job
    pub record_limit: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            job_timeout: DEFAULT_JOB_TIMEOUT,
            window_days: MAX_WINDOW_DAYS,
            record_limit: MAX_RECORDS_TO_FETCH,
        }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Set window size; anything above 60 days is capped
    #[must_use]
    pub fn with_window_days(mut self, days: u32) -> Self {
        self.window_days = days;
        self
    }

    #[must_use]
    pub fn with_record_limit(mut self, limit: u64) -> Self {
        self.record_limit = limit;
        self
    }

    /// Window size actually used
    pub fn effective_window_days(&self) -> u32 {
        self.window_days.clamp(1, MAX_WINDOW_DAYS)
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records emitted downstream
    pub records_synced: usize,
    /// Records dropped for predating the initial bookmark
    pub records_skipped: usize,
    /// Export windows completed
    pub windows: usize,
    /// Export jobs created
    pub jobs: usize,
    /// Job status polls
    pub polls: usize,
    /// Streams synced
    pub streams_synced: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records
    pub fn add_records(&mut self, count: usize) {
        self.records_synced += count;
    }

    /// Add a stream
    pub fn add_stream(&mut self) {
        self.streams_synced += 1;
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}
