//! Server configuration.

use std::time::Duration;

use puzzlesync_session::SessionConfig;
use puzzlesync_transport::DEFAULT_UPGRADE_TIMEOUT;

/// Environment variable holding the DM secret.
pub const ENV_DM_PASSWORD: &str = "DM_PASSWORD";
/// Environment variable holding the bind address.
pub const ENV_BIND: &str = "PUZZLESYNC_BIND";
/// Environment variable holding the idle timeout in seconds (`0` disables).
pub const ENV_IDLE_TIMEOUT_SECS: &str = "PUZZLESYNC_IDLE_TIMEOUT_SECS";
/// Environment variable holding the session sweep interval in seconds
/// (`0` disables).
pub const ENV_SWEEP_INTERVAL_SECS: &str = "PUZZLESYNC_SWEEP_INTERVAL_SECS";

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// The single shared dungeon-master secret.
    pub dm_secret: String,

    /// Close connections that send nothing for this long. `None` disables.
    pub idle_timeout: Option<Duration>,

    /// Purge expired sessions this often. `None` leaves expiry lazy.
    pub sweep_interval: Option<Duration>,

    /// Drop peers that have not finished the WebSocket upgrade by then.
    pub upgrade_timeout: Duration,

    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            dm_secret: "dm123".to_string(),
            idle_timeout: Some(Duration::from_secs(300)),
            sweep_interval: Some(Duration::from_secs(600)),
            upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by whichever environment variables are set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads from `lookup`.
    ///
    /// Unparseable numbers are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(secret) = lookup(ENV_DM_PASSWORD) {
            config.dm_secret = secret;
        }
        if let Some(addr) = lookup(ENV_BIND).filter(|a| !a.trim().is_empty()) {
            config.bind_addr = addr.trim().to_string();
        }
        if let Some(secs) = parse_secs(&lookup, ENV_IDLE_TIMEOUT_SECS) {
            config.idle_timeout = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_SWEEP_INTERVAL_SECS) {
            config.sweep_interval = secs;
        }

        config
    }
}

/// `Some(None)` for `0`, `Some(Some(d))` for a positive number, `None` if
/// unset or unparseable.
fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<Option<Duration>> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) => Some(None),
        Ok(secs) => Some(Some(Duration::from_secs(secs))),
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "ignoring invalid duration");
            None
        }
    }
}
