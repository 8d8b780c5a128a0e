//! Server configuration from environment variables.
//!
//! All knobs are read from `MCP_*` variables with validated defaults,
//! mirroring how the collector is deployed (no config file; the MCP
//! host passes environment through).

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Known log levels accepted by `LOG_LEVEL`.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug"];

/// Runtime configuration for the feedback-collector server core.
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    /// Preferred web port (`MCP_WEB_PORT`, default 5000).
    pub web_port: u16,

    /// Per-session feedback timeout in seconds
    /// (`MCP_DIALOG_TIMEOUT`, default 60).
    pub dialog_timeout_secs: u64,

    /// Insist on the preferred port instead of falling back
    /// (`MCP_FORCE_PORT`, default false).
    pub force_port: bool,

    /// Allow killing a safe process occupying the preferred port
    /// (`MCP_KILL_PORT_PROCESS`, default false).
    pub kill_process_on_port_conflict: bool,

    /// Run the advisory port cleanup before binding
    /// (`MCP_CLEANUP_PORT_ON_START`, default true).
    pub cleanup_port_on_start: bool,

    /// Session expiry sweep interval in milliseconds
    /// (`MCP_SESSION_SWEEP_MS`, default 60000).
    pub session_sweep_interval_ms: u64,

    /// Log level (`LOG_LEVEL`, default "info").
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            web_port: 5000,
            dialog_timeout_secs: 60,
            force_port: false,
            kill_process_on_port_conflict: false,
            cleanup_port_on_start: true,
            session_sweep_interval_ms: 60_000,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load and validate configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            web_port: env_number("MCP_WEB_PORT", defaults.web_port),
            dialog_timeout_secs: env_number("MCP_DIALOG_TIMEOUT", defaults.dialog_timeout_secs),
            force_port: env_bool("MCP_FORCE_PORT", defaults.force_port),
            kill_process_on_port_conflict: env_bool(
                "MCP_KILL_PORT_PROCESS",
                defaults.kill_process_on_port_conflict,
            ),
            cleanup_port_on_start: env_bool(
                "MCP_CLEANUP_PORT_ON_START",
                defaults.cleanup_port_on_start,
            ),
            session_sweep_interval_ms: env_number(
                "MCP_SESSION_SWEEP_MS",
                defaults.session_sweep_interval_ms,
            ),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and enumerations.
    pub fn validate(&self) -> Result<()> {
        if self.web_port < 1024 {
            return Err(Error::Config(format!(
                "invalid port {}: must be between 1024 and 65535",
                self.web_port
            )));
        }

        if !(10..=60_000).contains(&self.dialog_timeout_secs) {
            return Err(Error::Config(format!(
                "invalid dialog timeout {}: must be between 10 and 60000 seconds",
                self.dialog_timeout_secs
            )));
        }

        if self.session_sweep_interval_ms == 0 {
            return Err(Error::Config(
                "session sweep interval must be non-zero".to_string(),
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(Error::Config(format!(
                "invalid log level {:?}: must be one of {}",
                self.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Per-session feedback timeout as a [`Duration`].
    pub fn dialog_timeout(&self) -> Duration {
        Duration::from_secs(self.dialog_timeout_secs)
    }

    /// Session sweep interval as a [`Duration`].
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.session_sweep_interval_ms)
    }

    /// JSON rendering of the effective configuration, logged once at
    /// startup.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Read a numeric environment variable, keeping the default on absence
/// or parse failure.
fn env_number<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a boolean environment variable; only the literal "true"
/// (case-insensitive) enables it.
fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => value.trim().eq_ignore_ascii_case("true"),
        Err(_) => default,
    }
}
