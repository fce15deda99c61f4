pub mod config;
pub mod models;
pub mod realtime; // Realtime invalidation (local hub + WebSocket)
pub mod source; // Remote health twin REST API
pub mod summary;
pub mod synchronizer;
pub mod watcher; // `healthtwin` CLI

pub use synchronizer::{HealthTwinState, HealthTwinSynchronizer, SyncError, SyncOptions, SyncPhase};

use tracing_subscriber::EnvFilter;

use watcher::WatchError;

pub fn run() -> Result<(), WatchError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::WatchConfig::from_env()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| WatchError::Runtime(e.to_string()))?;
    runtime.block_on(watcher::run_watcher(config))
}
