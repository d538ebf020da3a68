//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands};
use crate::config::TapConfig;
use crate::engine::{app_config_request, deeplink_requests, Message, SyncEngine, SyncStats};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::output::{JsonLinesSink, RecordSink};
use crate::schema::{EmbeddedSchemas, FieldSource, JsonSchemaFields};
use crate::state::StateManager;
use crate::streams::{all_streams, find_stream, StreamDefinition, StreamKind};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Sync { streams, fail_fast } => {
                let mut sink = JsonLinesSink::stdout();
                self.sync(streams.as_deref(), *fail_fast, &mut sink)
                    .await
                    .map(|_| ())
            }
            Commands::Streams => self.streams(),
        }
    }

    /// Load configuration; inline JSON takes precedence over the file
    fn load_config(&self) -> Result<TapConfig> {
        if let Some(json_str) = &self.cli.config_json {
            return TapConfig::from_json(json_str);
        }
        if let Some(path) = &self.cli.config {
            return TapConfig::from_file(path);
        }
        Err(Error::config("Either --config or --config-json is required"))
    }

    /// Load state
    fn load_state(&self) -> Result<StateManager> {
        // Inline state takes precedence
        if let Some(state_json) = &self.cli.state_json {
            StateManager::from_json(state_json)
        } else if let Some(path) = &self.cli.state {
            StateManager::from_file(path)
        } else {
            Ok(StateManager::in_memory())
        }
    }

    fn field_source(&self) -> Arc<dyn FieldSource> {
        match &self.cli.schema_dir {
            Some(dir) => Arc::new(JsonSchemaFields::new(dir)),
            None => Arc::new(EmbeddedSchemas),
        }
    }

    /// Sync the requested streams (all available ones when `streams` is
    /// empty) into `sink`.
    ///
    /// A failing stream is logged and the run moves on, unless `fail_fast`
    /// is set or the failure is a fatal rate limit. Any failure makes the
    /// run itself fail once the remaining streams are done.
    pub async fn sync(
        &self,
        streams: Option<&str>,
        fail_fast: bool,
        sink: &mut dyn RecordSink,
    ) -> Result<SyncStats> {
        let started = Instant::now();
        let config = self.load_config()?;
        let state = self.load_state()?;

        let selected = select_streams(streams, &config)?;
        if selected.iter().any(StreamDefinition::is_export) {
            config.validate()?;
        }
        let selected = resume_order(selected, state.currently_syncing().await.as_deref());

        let http = Arc::new(HttpClient::with_config(config.http_config()?)?);
        let mut engine = SyncEngine::new(http, config.credentials(), state.clone())
            .with_config(config.sync_config()?)
            .with_field_source(self.field_source());

        let mut failures = Vec::new();
        for stream in &selected {
            info!("Starting sync for stream: {}", stream.stream_id);
            state.set_currently_syncing(Some(stream.stream_id)).await;

            let result = sync_stream(&mut engine, stream, &config, sink).await;

            match result {
                Ok(count) => info!("Finished {}: {count} records", stream.stream_id),
                Err(e) if e.is_fatal_rate_limit() => {
                    error!("Aborting sync: {e}");
                    return Err(e);
                }
                Err(e) if fail_fast => return Err(e),
                Err(e) => {
                    error!("Stream {} failed: {e}", stream.stream_id);
                    failures.push(format!("{}: {e}", stream.stream_id));
                }
            }
        }

        state.set_currently_syncing(None).await;
        sink.write(&Message::state(state.persist().await?))?;
        sink.flush()?;

        let mut stats = engine.stats().clone();
        #[allow(clippy::cast_possible_truncation)]
        stats.set_duration(started.elapsed().as_millis() as u64);
        info!(
            "Sync finished: {} streams, {} records, {} windows, {} jobs, {} polls in {}ms",
            stats.streams_synced,
            stats.records_synced,
            stats.windows,
            stats.jobs,
            stats.polls,
            stats.duration_ms
        );

        if failures.is_empty() {
            Ok(stats)
        } else {
            Err(Error::Other(format!(
                "{} stream(s) failed: {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    /// List available stream names
    fn streams(&self) -> Result<()> {
        let streams: Vec<_> = all_streams()
            .iter()
            .map(|s| {
                json!({
                    "name": s.stream_id,
                    "replication_method": s.replication_method,
                    "replication_keys": s.replication_keys,
                    "key_properties": s.key_properties,
                })
            })
            .collect();

        println!(
            "{}",
            serde_json::to_string(&json!({"type": "STREAMS", "streams": streams}))?
        );
        Ok(())
    }
}

/// Run one stream with the request inputs its kind needs
async fn sync_stream(
    engine: &mut SyncEngine,
    stream: &StreamDefinition,
    config: &TapConfig,
    sink: &mut dyn RecordSink,
) -> Result<usize> {
    match stream.kind {
        StreamKind::Export(_) => {
            engine
                .sync_export_stream(stream, config.start_date()?, true, sink)
                .await
        }
        StreamKind::AppConfig => {
            let (key, secret) = config
                .app_config_keys()
                .ok_or_else(|| Error::missing_field("branch_secret"))?;
            let request = app_config_request(key, secret)?;
            engine.sync_full_table(stream, vec![request], true, sink).await
        }
        StreamKind::Deeplink => {
            let key = config
                .branch_key
                .as_deref()
                .ok_or_else(|| Error::missing_field("branch_key"))?;
            let requests = deeplink_requests(&config.deeplink_urls, key)?;
            engine.sync_full_table(stream, requests, true, sink).await
        }
    }
}

/// Streams named in `list`, or every stream the config can serve
pub fn select_streams(list: Option<&str>, config: &TapConfig) -> Result<Vec<StreamDefinition>> {
    let names: Vec<&str> = list
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() {
        return Ok(all_streams()
            .into_iter()
            .filter(|s| match s.kind {
                StreamKind::Export(_) => true,
                StreamKind::AppConfig => config.app_config_keys().is_some(),
                StreamKind::Deeplink => config.deeplink_key().is_some(),
            })
            .collect());
    }

    let mut selected: Vec<StreamDefinition> = Vec::new();
    for name in names {
        let stream = find_stream(name)?;
        if selected.iter().any(|s| s.stream_id == stream.stream_id) {
            warn!("Stream {name} listed more than once");
            continue;
        }
        selected.push(stream);
    }
    Ok(selected)
}

/// Start with the stream an interrupted run was working on
pub fn resume_order(
    mut streams: Vec<StreamDefinition>,
    currently_syncing: Option<&str>,
) -> Vec<StreamDefinition> {
    if let Some(pos) = currently_syncing
        .and_then(|id| streams.iter().position(|s| s.stream_id == id))
    {
        info!("Resuming interrupted sync at {}", streams[pos].stream_id);
        streams.rotate_left(pos);
    }
    streams
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(streams: &[StreamDefinition]) -> Vec<&'static str> {
        streams.iter().map(|s| s.stream_id).collect()
    }

    #[test]
    fn test_select_all_export_streams_by_default() {
        let config = TapConfig::default();
        let selected = select_streams(None, &config).unwrap();
        assert_eq!(selected.len(), 30);
        assert!(selected.iter().all(StreamDefinition::is_export));
    }

    #[test]
    fn test_select_includes_configured_full_table_streams() {
        let config = TapConfig {
            branch_key: Some("key_live_1".to_string()),
            branch_secret: Some("secret".to_string()),
            deeplink_urls: vec!["https://a.app.link/x".to_string()],
            ..TapConfig::default()
        };
        let selected = select_streams(Some(" "), &config).unwrap();
        assert_eq!(selected.len(), 32);
    }

    #[test]
    fn test_select_named_streams() {
        let config = TapConfig::default();
        let selected = select_streams(Some("eo_open, cost,eo_open"), &config).unwrap();
        assert_eq!(ids(&selected), vec!["eo_open", "cost"]);

        assert!(matches!(
            select_streams(Some("eo_open,nope"), &config),
            Err(Error::StreamNotFound { .. })
        ));
    }

    #[test]
    fn test_resume_order() {
        let streams = select_streams(Some("eo_open,eo_click,cost"), &TapConfig::default()).unwrap();

        assert_eq!(
            ids(&resume_order(streams.clone(), Some("eo_click"))),
            vec!["eo_click", "cost", "eo_open"]
        );
        assert_eq!(
            ids(&resume_order(streams.clone(), Some("deeplink"))),
            vec!["eo_open", "eo_click", "cost"]
        );
        assert_eq!(ids(&resume_order(streams, None)), vec!["eo_open", "eo_click", "cost"]);
    }
}
