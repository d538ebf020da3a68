//! Export job module
//!
//! The asynchronous export protocol the event streams are built on.
//!
//! # Overview
//!
//! - `ExportJobClient` - readiness check, job creation and polling
//! - `ExportJobPayload` / `DataReadyPayload` - request bodies
//! - `EndpointConfig` - static description of each export endpoint
//! - `Clock` - time source, swappable in tests

mod clock;
mod contract;
mod job;

pub use clock::{Clock, ManualClock, SystemClock};
pub use contract::{
    DataReadyPayload, EndpointConfig, ExportCredentials, ExportJobPayload, ExportWindow,
    ACCESS_TOKEN_HEADER, APP_ID_PARAM, CREATE_JOB_ENDPOINT, DATA_READY_ENDPOINT,
    GLOBAL_EXPORT_FIELD_DENYLIST, MAX_RECORDS_TO_FETCH, MAX_WINDOW_DAYS, POLL_JOB_ENDPOINT,
};
pub use job::{
    CompletedJob, ExportJobClient, ExportJobHandle, JobStatus, DEFAULT_JOB_TIMEOUT,
    DEFAULT_POLL_INTERVAL,
};

#[cfg(test)]
mod tests;
