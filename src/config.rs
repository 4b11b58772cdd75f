//! Bridge configuration
//!
//! Everything is read from `NUEVA_*` environment variables with the
//! defaults below; the CLI can override individual values afterwards.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_TEMP_DIR: &str = "/tmp/nueva";

/// Runtime configuration for the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Base URL of the ACE-Step API
    pub upstream_url: String,
    /// Launch ACE-Step when it is not answering
    pub auto_start: bool,
    /// Timeout for a single processing call
    pub timeout_ms: u64,
    /// How long a launched engine may take to become healthy
    pub startup_timeout: Duration,
    /// Poll interval while waiting for the engine
    pub health_check_interval: Duration,
    /// Explicit engine command line; discovered from PATH when unset
    pub engine_command: Option<String>,
    /// ACE-Step installation directory, used as the engine's working dir
    pub ace_step_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Log filter directive (`info`, `debug`, `nueva_bridge=trace`, ...)
    pub log_level: String,
    /// Staging directory for uploads
    pub temp_dir: PathBuf,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            auto_start: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            health_check_interval: Duration::from_secs(DEFAULT_HEALTH_INTERVAL_SECS),
            engine_command: None,
            ace_step_path: default_ace_step_path(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
        }
    }
}

fn default_ace_step_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ACE-Step-1.5")
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(key, value = %value, "unparseable setting, using default");
                default
            }
        },
        None => default,
    }
}

fn parse_bool_or(key: &str, raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|v| v.trim().to_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        Some(v) => {
            warn!(key, value = %v, "unparseable boolean setting, using default");
            default
        }
        None => default,
    }
}

impl BridgeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            upstream_url: non_empty("NUEVA_ACESTEP_UPSTREAM_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.upstream_url),
            auto_start: parse_bool_or(
                "NUEVA_ACESTEP_AUTO_START",
                non_empty("NUEVA_ACESTEP_AUTO_START"),
                defaults.auto_start,
            ),
            timeout_ms: parse_or(
                "NUEVA_ACESTEP_TIMEOUT_MS",
                non_empty("NUEVA_ACESTEP_TIMEOUT_MS"),
                defaults.timeout_ms,
            ),
            startup_timeout: Duration::from_secs(parse_or(
                "NUEVA_ACESTEP_STARTUP_TIMEOUT_S",
                non_empty("NUEVA_ACESTEP_STARTUP_TIMEOUT_S"),
                DEFAULT_STARTUP_TIMEOUT_SECS,
            )),
            health_check_interval: Duration::from_secs(parse_or(
                "NUEVA_ACESTEP_HEALTH_INTERVAL_S",
                non_empty("NUEVA_ACESTEP_HEALTH_INTERVAL_S"),
                DEFAULT_HEALTH_INTERVAL_SECS,
            )),
            engine_command: non_empty("NUEVA_ACESTEP_COMMAND"),
            ace_step_path: non_empty("NUEVA_ACE_STEP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ace_step_path),
            host: non_empty("NUEVA_BRIDGE_HOST").unwrap_or(defaults.host),
            port: parse_or(
                "NUEVA_BRIDGE_PORT",
                non_empty("NUEVA_BRIDGE_PORT"),
                defaults.port,
            ),
            log_level: non_empty("NUEVA_LOG_LEVEL").unwrap_or(defaults.log_level),
            temp_dir: non_empty("NUEVA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port` for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[]));

        assert_eq!(config.upstream_url, "http://localhost:8000");
        assert!(config.auto_start);
        assert_eq!(config.timeout_ms, 300_000);
        assert_eq!(config.startup_timeout, Duration::from_secs(120));
        assert_eq!(config.health_check_interval, Duration::from_secs(5));
        assert_eq!(config.bind_address(), "127.0.0.1:8001");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/nueva"));
        assert!(config.engine_command.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("NUEVA_ACESTEP_UPSTREAM_URL", "http://gpu-box:9000/"),
            ("NUEVA_ACESTEP_AUTO_START", "FALSE"),
            ("NUEVA_ACESTEP_TIMEOUT_MS", "1500"),
            ("NUEVA_BRIDGE_PORT", "9100"),
            ("NUEVA_ACESTEP_COMMAND", "acestep-api --port 9000"),
        ]));

        assert_eq!(config.upstream_url, "http://gpu-box:9000");
        assert!(!config.auto_start);
        assert_eq!(config.timeout(), Duration::from_millis(1500));
        assert_eq!(config.port, 9100);
        assert_eq!(config.engine_command.as_deref(), Some("acestep-api --port 9000"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("NUEVA_ACESTEP_TIMEOUT_MS", "soon"),
            ("NUEVA_BRIDGE_PORT", "70000"),
            ("NUEVA_ACESTEP_AUTO_START", "maybe"),
            ("NUEVA_BRIDGE_HOST", "  "),
        ]));

        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.auto_start);
        assert_eq!(config.host, DEFAULT_HOST);
    }
}
