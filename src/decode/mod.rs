//! Result file decoder module
//!
//! Export results are gzip-compressed JSON Lines files behind pre-signed
//! URLs. `decode` opens one as a lazy, forward-only stream of records;
//! calling it again re-fetches the file.

mod lines;

pub use lines::{parse_line, JsonLinesStream};

use crate::error::Result;
use crate::http::HttpClient;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::debug;

/// Records of one result file
pub type ResultRecords = JsonLinesStream<BoxStream<'static, reqwest::Result<Bytes>>>;

/// Open a result file and decode it record by record
pub async fn decode(client: &HttpClient, result_url: &str) -> Result<ResultRecords> {
    let url = url::Url::parse(result_url)?;
    debug!("Downloading export results from {}", url.host_str().unwrap_or("unknown host"));

    let response = client.download(url.as_str()).await?;
    Ok(JsonLinesStream::new(response.bytes_stream().boxed()))
}
