use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "HealthTwin";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Remote API used when `HEALTHTWIN_API_URL` is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Polling period when auto-refresh is on and no interval is given (5 minutes).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(300_000);

/// Maximum age of a twin snapshot before it counts as stale (24 hours).
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Connect timeout for HTTP calls. Request timeouts are left to the server.
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reconnection attempts after the realtime socket drops.
pub const REALTIME_RECONNECT_ATTEMPTS: u32 = 5;

/// First reconnection delay; doubles per attempt up to the max.
pub const REALTIME_RECONNECT_DELAY: Duration = Duration::from_secs(2);
pub const REALTIME_RECONNECT_DELAY_MAX: Duration = Duration::from_secs(10);

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "healthtwin=info,healthtwin_lib=info,warn"
}

/// Errors from reading environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },
    #[error("{var} has an invalid value: {value}")]
    Invalid { var: &'static str, value: String },
}

// ═══════════════════════════════════════════════════════════
// WatchConfig: settings for the command-line watcher
// ═══════════════════════════════════════════════════════════

/// Everything the `healthtwin` binary needs, read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub realtime_url: Option<String>,
    pub patient_id: String,
    pub comprehensive: bool,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
    pub enable_realtime: bool,
}

impl WatchConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let patient_id = get("HEALTHTWIN_PATIENT_ID").ok_or(ConfigError::Missing {
            var: "HEALTHTWIN_PATIENT_ID",
        })?;

        let refresh_interval = match get("HEALTHTWIN_REFRESH_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "HEALTHTWIN_REFRESH_MS",
                    value: raw.clone(),
                })?;
                if ms == 0 {
                    return Err(ConfigError::Invalid {
                        var: "HEALTHTWIN_REFRESH_MS",
                        value: raw,
                    });
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_REFRESH_INTERVAL,
        };

        Ok(Self {
            api_url: get("HEALTHTWIN_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_token: get("HEALTHTWIN_API_TOKEN"),
            realtime_url: get("HEALTHTWIN_WS_URL"),
            patient_id: patient_id.trim().to_string(),
            comprehensive: parse_flag(get("HEALTHTWIN_COMPREHENSIVE"), "HEALTHTWIN_COMPREHENSIVE", false)?,
            auto_refresh: parse_flag(get("HEALTHTWIN_AUTO_REFRESH"), "HEALTHTWIN_AUTO_REFRESH", false)?,
            refresh_interval,
            enable_realtime: parse_flag(get("HEALTHTWIN_REALTIME"), "HEALTHTWIN_REALTIME", true)?,
        })
    }
}

fn parse_flag(raw: Option<String>, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { var, value: raw }),
    }
}
