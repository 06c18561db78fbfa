//! Environment-driven server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default grace period before an empty session is deleted
pub const DEFAULT_SESSION_GRACE: Duration = Duration::from_secs(60);

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP/WebSocket server listens on
    pub bind_addr: SocketAddr,
    /// How long an empty session survives before cleanup
    pub session_grace: Duration,
    /// How long a disconnected participant stays in the roster (None = forever)
    pub disconnect_timeout: Option<Duration>,
    /// Directory of static assets served as fallback (None = no static serving)
    pub static_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            session_grace: DEFAULT_SESSION_GRACE,
            disconnect_timeout: None,
            static_dir: None,
        }
    }
}

impl Config {
    /// Load config from environment variables.
    /// Invalid values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match non_empty_var("BIND_ADDR") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    "Invalid BIND_ADDR {:?} ({}), using {}",
                    v,
                    e,
                    DEFAULT_BIND_ADDR
                );
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        let session_grace = seconds_var("SESSION_GRACE_SECS").unwrap_or(defaults.session_grace);

        // Zero disables the reaper, same as leaving it unset
        let disconnect_timeout =
            seconds_var("DISCONNECT_TIMEOUT_SECS").filter(|timeout| !timeout.is_zero());

        let static_dir = non_empty_var("STATIC_DIR").map(PathBuf::from);

        tracing::info!(
            %bind_addr,
            session_grace_secs = session_grace.as_secs(),
            disconnect_timeout_secs = disconnect_timeout.map(|d| d.as_secs()),
            static_dir = ?static_dir,
            "Config loaded"
        );

        Self {
            bind_addr,
            session_grace,
            disconnect_timeout,
            static_dir,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn seconds_var(key: &str) -> Option<Duration> {
    let raw = non_empty_var(key)?;
    match raw.parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(e) => {
            tracing::warn!("Ignoring invalid {}={:?}: {}", key, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "BIND_ADDR",
        "SESSION_GRACE_SECS",
        "DISCONNECT_TIMEOUT_SECS",
        "STATIC_DIR",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_when_unset() {
        clear_env();
        let config = Config::from_env();

        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.session_grace, Duration::from_secs(60));
        assert!(config.disconnect_timeout.is_none());
        assert!(config.static_dir.is_none());
    }

    #[test]
    #[serial]
    fn test_reads_values() {
        clear_env();
        std::env::set_var("BIND_ADDR", "127.0.0.1:8080");
        std::env::set_var("SESSION_GRACE_SECS", "10");
        std::env::set_var("DISCONNECT_TIMEOUT_SECS", "300");
        std::env::set_var("STATIC_DIR", "public");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.session_grace, Duration::from_secs(10));
        assert_eq!(config.disconnect_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.static_dir, Some(PathBuf::from("public")));
    }

    #[test]
    #[serial]
    fn test_invalid_values_fall_back() {
        clear_env();
        std::env::set_var("BIND_ADDR", "not-an-address");
        std::env::set_var("SESSION_GRACE_SECS", "soon");
        std::env::set_var("DISCONNECT_TIMEOUT_SECS", "0");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.session_grace, DEFAULT_SESSION_GRACE);
        assert!(config.disconnect_timeout.is_none());
    }
}
