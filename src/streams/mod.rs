//! Stream catalog
//!
//! One parameterized export stream per report type, plus the two
//! full-table streams.

mod types;

pub use types::{
    ReportType, StreamDefinition, StreamKind, EXPORT_REPLICATION_KEY, REPORT_TYPES,
};

use crate::error::{Error, Result};

/// Every known stream: export streams first, then full-table ones
pub fn all_streams() -> Vec<StreamDefinition> {
    REPORT_TYPES
        .iter()
        .copied()
        .map(StreamDefinition::export)
        .chain([StreamDefinition::app_config(), StreamDefinition::deeplink()])
        .collect()
}

/// Look up a stream by id
pub fn find_stream(stream_id: &str) -> Result<StreamDefinition> {
    all_streams()
        .into_iter()
        .find(|s| s.stream_id == stream_id)
        .ok_or_else(|| Error::StreamNotFound {
            stream: stream_id.to_string(),
        })
}

/// Look up a report type by name
pub fn find_report_type(name: &str) -> Option<ReportType> {
    REPORT_TYPES.iter().copied().find(|r| r.as_str() == name)
}
