//! Output module
//!
//! Messages leave the connector as Singer JSON lines on stdout.

mod sink;

pub use sink::{JsonLinesSink, MemorySink, RecordSink};
