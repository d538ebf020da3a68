//! Stream catalog types

use crate::schema::BRANCH_EVENTS_SCHEMA_PATH;
use crate::types::ReplicationMethod;
use std::fmt;

/// Replication key of every export stream
pub const EXPORT_REPLICATION_KEY: &str = "timestamp";

/// A report type the export API can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportType {
    name: &'static str,
    is_event: bool,
}

impl ReportType {
    const fn event(name: &'static str) -> Self {
        Self {
            name,
            is_event: true,
        }
    }

    const fn aggregate(name: &'static str) -> Self {
        Self {
            name,
            is_event: false,
        }
    }

    /// Name sent as `report_type`, also used as the stream id
    pub fn as_str(&self) -> &'static str {
        self.name
    }

    pub fn is_event(&self) -> bool {
        self.is_event
    }

    /// Blocked-traffic variant of another report type
    pub fn is_blocked(&self) -> bool {
        self.name.ends_with("_blocked")
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Every report type, in catalog order
pub const REPORT_TYPES: [ReportType; 30] = [
    ReportType::event("eo_impression"),
    ReportType::event("eo_click"),
    ReportType::event("eo_web_to_app_auto_redirect"),
    ReportType::event("eo_branch_cta_view"),
    ReportType::event("eo_open"),
    ReportType::event("eo_install"),
    ReportType::event("eo_reinstall"),
    ReportType::event("eo_web_session_start"),
    ReportType::event("eo_pageview"),
    ReportType::event("eo_commerce_event"),
    ReportType::event("eo_custom_event"),
    ReportType::event("eo_content_event"),
    ReportType::event("eo_dismissal"),
    ReportType::event("eo_user_lifecycle_event"),
    ReportType::aggregate("cost"),
    ReportType::aggregate("skadnetwork_valid_messages"),
    ReportType::event("eo_san_touch"),
    ReportType::event("eo_click_blocked"),
    ReportType::event("eo_impression_blocked"),
    ReportType::event("eo_install_blocked"),
    ReportType::event("eo_reinstall_blocked"),
    ReportType::event("eo_open_blocked"),
    ReportType::event("eo_web_session_start_blocked"),
    ReportType::event("eo_pageview_blocked"),
    ReportType::event("eo_custom_event_blocked"),
    ReportType::event("eo_content_event_blocked"),
    ReportType::event("eo_commerce_event_blocked"),
    ReportType::event("eo_user_lifecycle_event_blocked"),
    ReportType::event("eo_branch_cta_view_blocked"),
    ReportType::event("eo_web_to_app_auto_redirect_blocked"),
];

/// How a stream's records are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Windowed export jobs for one report type
    Export(ReportType),
    /// `GET v1/app/{branch_key}`, a single record
    AppConfig,
    /// `GET v1/url` once per configured deep link
    Deeplink,
}

/// Static description of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDefinition {
    pub stream_id: &'static str,
    pub key_properties: &'static [&'static str],
    pub replication_method: ReplicationMethod,
    pub replication_keys: &'static [&'static str],
    /// Path understood by a [`crate::schema::FieldSource`]
    pub schema_path: &'static str,
    pub kind: StreamKind,
}

impl StreamDefinition {
    pub const fn export(report_type: ReportType) -> Self {
        Self {
            stream_id: report_type.name,
            key_properties: &["id"],
            replication_method: ReplicationMethod::Incremental,
            replication_keys: &[EXPORT_REPLICATION_KEY],
            schema_path: BRANCH_EVENTS_SCHEMA_PATH,
            kind: StreamKind::Export(report_type),
        }
    }

    pub const fn app_config() -> Self {
        Self {
            stream_id: "app_config",
            key_properties: &["id"],
            replication_method: ReplicationMethod::FullTable,
            replication_keys: &[],
            schema_path: "app_config.json",
            kind: StreamKind::AppConfig,
        }
    }

    pub const fn deeplink() -> Self {
        Self {
            stream_id: "deeplink",
            key_properties: &["id"],
            replication_method: ReplicationMethod::FullTable,
            replication_keys: &[],
            schema_path: "deeplink.json",
            kind: StreamKind::Deeplink,
        }
    }

    /// Report type behind an export stream
    pub fn report_type(&self) -> Option<ReportType> {
        match self.kind {
            StreamKind::Export(report_type) => Some(report_type),
            _ => None,
        }
    }

    /// First replication key, if the stream is incremental
    pub fn replication_key(&self) -> Option<&'static str> {
        self.replication_keys.first().copied()
    }

    pub fn is_event(&self) -> bool {
        self.report_type().is_some_and(|r| r.is_event())
    }

    pub fn is_blocked(&self) -> bool {
        self.report_type().is_some_and(|r| r.is_blocked())
    }

    pub fn is_export(&self) -> bool {
        matches!(self.kind, StreamKind::Export(_))
    }
}
