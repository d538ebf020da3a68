//! Request timers and record counters
//!
//! Metrics are reported as `tracing` events on the `metrics` target so any
//! subscriber can route them. Nothing here blocks or fails.

use std::time::{Duration, Instant};
use tracing::info;

/// Times a single HTTP request against an endpoint
#[derive(Debug)]
pub struct RequestTimer {
    endpoint: String,
    started: Instant,
}

impl RequestTimer {
    /// Start timing a request
    pub fn start(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            started: Instant::now(),
        }
    }

    /// Elapsed time so far
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Report the request outcome. `status` is `None` when no response arrived.
    pub fn finish(self, status: Option<u16>, succeeded: bool) -> Duration {
        let elapsed = self.elapsed();
        info!(
            target: "metrics",
            metric = "http_request_duration",
            endpoint = %self.endpoint,
            http_status_code = status.unwrap_or(0),
            status = if succeeded { "succeeded" } else { "failed" },
            seconds = elapsed.as_secs_f64(),
        );
        elapsed
    }
}

/// Counts records emitted for a stream
#[derive(Debug)]
pub struct RecordCounter {
    stream: String,
    value: usize,
    log_interval: Duration,
    last_logged: Instant,
}

impl RecordCounter {
    /// Create a counter that logs at most once per `log_interval`
    pub fn new(stream: impl Into<String>, log_interval: Duration) -> Self {
        Self {
            stream: stream.into(),
            value: 0,
            log_interval,
            last_logged: Instant::now(),
        }
    }

    /// Add one record
    pub fn increment(&mut self) {
        self.increment_by(1);
    }

    /// Add `n` records
    pub fn increment_by(&mut self, n: usize) {
        self.value += n;
        if self.last_logged.elapsed() >= self.log_interval {
            self.report();
            self.last_logged = Instant::now();
        }
    }

    /// Current count
    pub fn value(&self) -> usize {
        self.value
    }

    fn report(&self) {
        info!(
            target: "metrics",
            metric = "record_count",
            stream = %self.stream,
            value = self.value,
        );
    }

    /// Log the final count and return it
    pub fn finish(self) -> usize {
        self.report();
        self.value
    }
}
