//! Worker configuration, loaded from an optional TOML base layer plus the
//! environment. Field names follow `xxx_seconds` / `xxx_ms` suffix
//! conventions so a `Duration` accessor can stay next to the raw value,
//! the same shape `tasker-worker`'s event-driven config structs use.

use std::time::Duration;

use config::Config;
use sysinfo::{Pid, System};

use crate::error::ConfigError;

/// Deployment environment passed through to the store's claim RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl From<&str> for Environment {
    /// Any value other than `"dev"` normalizes to `Prod`.
    fn from(value: &str) -> Self {
        if value.eq_ignore_ascii_case("dev") {
            Environment::Dev
        } else {
            Environment::Prod
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 800,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WorkerConfig {
    pub consumer_id: String,
    pub environment: Environment,
    pub agent_orch: String,
    pub database_url: String,
    pub idle_poll_interval_seconds: u64,
    pub cancel_poll_interval_ms: u64,
    pub coalesce_batch: usize,
    pub coalesce_delay_seconds: f64,
    pub retry: RetryConfig,
}

impl WorkerConfig {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval_seconds)
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }

    pub fn coalesce_delay(&self) -> Duration {
        Duration::from_secs_f64(self.coalesce_delay_seconds)
    }

    /// Loads configuration from an optional `dispatcher.{toml,yaml,json,...}`
    /// base layer (searched in the current working directory) overridden by
    /// the process environment, matching `tasker-shared`'s `config` module
    /// layering. `AGENT_ORCH` and `DATABASE_URL` are required; everything
    /// else falls back to a sensible default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("dispatcher").required(false))
            .add_source(config::Environment::default())
            .build()?;

        let agent_orch = required(&settings, "agent_orch")?;
        let database_url = required(&settings, "database_url")?;

        let consumer_id = optional_string(&settings, "consumer_id")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_consumer_id);

        let environment = optional_string(&settings, "env")
            .map(|v| Environment::from(v.as_str()))
            .unwrap_or(Environment::Prod);

        let coalesce_delay_seconds = parse_or(&settings, "event_coalesce_delay_sec", 1.0)?;
        let coalesce_batch = parse_or(&settings, "event_coalesce_batch", 3usize)?;
        let idle_poll_interval_seconds = parse_or(&settings, "idle_poll_interval_seconds", 10u64)?;
        let cancel_poll_interval_ms = parse_or(&settings, "cancel_poll_interval_ms", 500u64)?;
        let attempts = parse_or(&settings, "retry_attempts", 3u32)?;
        let base_delay_ms = parse_or(&settings, "retry_base_delay_ms", 800u64)?;

        Ok(Self {
            consumer_id,
            environment,
            agent_orch,
            database_url,
            idle_poll_interval_seconds,
            cancel_poll_interval_ms,
            coalesce_batch,
            coalesce_delay_seconds,
            retry: RetryConfig {
                attempts,
                base_delay_ms,
            },
        })
    }
}

fn optional_string(settings: &Config, key: &str) -> Option<String> {
    settings.get_string(key).ok()
}

fn required(settings: &Config, key: &str) -> Result<String, ConfigError> {
    optional_string(settings, key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::missing(&key.to_uppercase()))
}

fn parse_or<T: std::str::FromStr>(settings: &Config, key: &str, default: T) -> Result<T, ConfigError> {
    match settings.get_string(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::invalid(&key.to_uppercase(), &raw)),
        Err(config::ConfigError::NotFound(_)) => Ok(default),
        Err(error) => Err(ConfigError::from(error)),
    }
}

/// `hostname:pid`, matching the original's consumer-id default.
fn default_consumer_id() -> String {
    let hostname = System::host_name().unwrap_or_else(|| "unknown-host".to_string());
    let pid = Pid::from_u32(std::process::id());
    format!("{hostname}:{pid}")
}
