//! Command-line watcher: syncs one patient against a live server and logs
//! each distinct state until Ctrl-C.

use std::sync::Arc;

use crate::config::{ConfigError, WatchConfig};
use crate::realtime::{RealtimeChannel, WsChannel};
use crate::source::{HttpTwinSource, SourceError};
use crate::synchronizer::{HealthTwinState, HealthTwinSynchronizer, SyncOptions};

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Failed to start async runtime: {0}")]
    Runtime(String),
}

pub async fn run_watcher(config: WatchConfig) -> Result<(), WatchError> {
    let source = Arc::new(HttpTwinSource::new(&config.api_url, config.api_token.clone())?);
    tracing::info!(api = source.base_url(), patient = %config.patient_id, "Watching health twin");

    let channel = connect_realtime(&config).await;
    let sync = HealthTwinSynchronizer::new(source, channel);
    let mut updates = sync.subscribe();
    sync.start(Some(&config.patient_id), SyncOptions::from(&config));

    let mut last_line = String::new();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                let line = status_line(&state, sync.is_data_fresh());
                if line != last_line {
                    tracing::info!("{line}");
                    if let Some(summary) = state.health_summary() {
                        tracing::debug!(insights = ?summary.key_insights, actions = ?summary.next_actions, "Summary");
                    }
                    last_line = line;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping");
                break;
            }
        }
    }

    sync.stop();
    Ok(())
}

/// Realtime is best effort: without it the watcher still fetches and polls.
async fn connect_realtime(config: &WatchConfig) -> Option<Arc<dyn RealtimeChannel>> {
    if !config.enable_realtime {
        return None;
    }
    let url = config.realtime_url.as_deref()?;
    match WsChannel::connect(url, config.api_token.as_deref()).await {
        Ok(channel) => Some(Arc::new(channel)),
        Err(e) => {
            tracing::warn!(error = %e, "Realtime unavailable, continuing without it");
            None
        }
    }
}

/// One-line rendering of a snapshot, e.g. `phase=ready score=82 status=stable fresh=true`.
pub fn status_line(state: &HealthTwinState, fresh: bool) -> String {
    let mut parts = vec![format!("phase={}", state.phase.as_str())];
    if let Some(summary) = state.health_summary() {
        parts.push(format!("score={}", summary.score));
        if !summary.status.is_empty() {
            parts.push(format!("status={}", summary.status));
        }
        parts.push(format!("fresh={fresh}"));
    }
    if let Some(error) = &state.error {
        parts.push(format!("error=\"{error}\""));
    }
    parts.join(" ")
}
