//! Typed view over the configuration store

use std::path::PathBuf;
use std::time::Duration;

use super::store::ConfigStore;

/// Shortest heartbeat interval the controller will honour
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_MAX_IDLE_MINUTES: f64 = 60.0;

/// Point-in-time, typed copy of the keys the controller consumes.
///
/// Loops take a fresh snapshot every iteration so that values pushed by the
/// config refresh loop take effect on the next wake-up.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Terminal name reported to the central server
    pub name: String,
    /// Base URL of the central server
    pub core_host: String,
    /// Access key for the central server (may be empty)
    pub access_key: String,
    /// Interval shared by the heartbeat and session monitor loops
    pub heartbeat_interval: Duration,
    /// Idle limit in minutes, fractions allowed
    pub max_idle_minutes: f64,
    /// UI language for messages shown to users
    pub language_code: String,
    /// Root of `<date>/<session>.<ext>.gz` replay files
    pub replay_dir: PathBuf,
    /// Re-upload leftover replays at startup
    pub upload_failed_replay_on_start: bool,
    /// Address gateways bind to
    pub bind_host: String,
    /// SSH gateway port, 0 disables it
    pub sshd_port: u16,
    /// WebSocket gateway port, 0 disables it
    pub httpd_port: u16,
    /// Timeout for requests to the central server
    pub request_timeout: Duration,
    /// Log filter from `LOG_LEVEL`, lower-cased
    pub log_level: String,
    /// Force debug logging
    pub debug: bool,
}

impl Settings {
    /// Read every key from `store` against a single remote document
    pub fn from_store(store: &ConfigStore) -> Self {
        let view = store.view();
        let secs = |key: &str, fallback: u64| view.get_u64(key).unwrap_or(fallback);
        let port = |key: &str, fallback: u16| {
            view.get_u64(key)
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(fallback)
        };
        let text = |key: &str| view.get_str(key).unwrap_or_default();

        Self {
            name: text("NAME"),
            core_host: text("CORE_HOST"),
            access_key: text("ACCESS_KEY"),
            heartbeat_interval: Duration::from_secs(secs("HEARTBEAT_INTERVAL", 20))
                .max(MIN_HEARTBEAT_INTERVAL),
            max_idle_minutes: view
                .get_f64("SECURITY_MAX_IDLE_TIME")
                .filter(|m| *m >= 0.0)
                .unwrap_or(DEFAULT_MAX_IDLE_MINUTES),
            language_code: text("LANGUAGE_CODE"),
            replay_dir: PathBuf::from(text("REPLAY_DIR")),
            upload_failed_replay_on_start: view
                .get_bool("UPLOAD_FAILED_REPLAY_ON_START")
                .unwrap_or(true),
            bind_host: text("BIND_HOST"),
            sshd_port: port("SSHD_PORT", 2222),
            httpd_port: port("HTTPD_PORT", 5000),
            request_timeout: Duration::from_secs(secs("SSH_TIMEOUT", 15).max(1)),
            log_level: text("LOG_LEVEL").to_lowercase(),
            debug: view.get_bool("DEBUG").unwrap_or(false),
        }
    }

    /// Idle limit as a duration
    pub fn max_idle(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_idle_minutes * 60.0).unwrap_or(Duration::MAX)
    }
}
