//! Event bus and subscription manager configuration structures.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, SubscribeOptions, DEFAULT_BUFFER_SIZE, DEFAULT_QUEUE_CAPACITY};

/// Environment variable overriding [`BusConfig::default_buffer_size`].
pub const ENV_BUS_BUFFER_SIZE: &str = "PUBSUB_BUS_BUFFER_SIZE";
/// Environment variable overriding [`BusConfig::default_timeout_ms`].
pub const ENV_BUS_TIMEOUT_MS: &str = "PUBSUB_BUS_TIMEOUT_MS";
/// Environment variable overriding [`ManagerConfig::queue_capacity`].
pub const ENV_MANAGER_QUEUE_CAPACITY: &str = "PUBSUB_MANAGER_QUEUE_CAPACITY";
/// Environment variable overriding [`ManagerConfig::delivery_timeout_ms`].
pub const ENV_MANAGER_TIMEOUT_MS: &str = "PUBSUB_MANAGER_TIMEOUT_MS";

/// Event bus defaults applied by `EventBus::subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Topic queue capacity.
    pub default_buffer_size: usize,
    /// Per-send delivery timeout in milliseconds; `None` waits forever.
    pub default_timeout_ms: Option<u64>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: DEFAULT_BUFFER_SIZE,
            default_timeout_ms: None,
        }
    }
}

impl BusConfig {
    /// Validate bus configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_buffer_size == 0 {
            return Err("default_buffer_size must be greater than 0".into());
        }
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Subscribe options carrying these defaults.
    #[must_use]
    pub fn subscribe_options(&self) -> SubscribeOptions {
        let opts = SubscribeOptions::new().with_buffer_size(self.default_buffer_size);
        match self.default_timeout_ms {
            Some(ms) => opts.with_timeout(Duration::from_millis(ms)),
            None => opts,
        }
    }
}

/// Subscription manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the shared event queue.
    pub queue_capacity: usize,
    /// Per-send delivery timeout in milliseconds.
    pub delivery_timeout_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            delivery_timeout_ms: 1000,
        }
    }
}

impl ManagerConfig {
    /// Validate manager configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.delivery_timeout_ms == 0 {
            return Err("delivery_timeout_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Delivery timeout as a `Duration`.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

/// Root pub/sub configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    /// Event bus defaults.
    pub bus: BusConfig,
    /// Subscription manager settings.
    pub manager: ManagerConfig,
}

impl PubSubConfig {
    /// Validate both sections.
    ///
    /// # Errors
    ///
    /// Returns a message prefixed with the offending section.
    pub fn validate(&self) -> Result<(), String> {
        self.bus.validate().map_err(|e| format!("bus invalid: {e}"))?;
        self.manager
            .validate()
            .map_err(|e| format!("manager invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by environment variables,
    /// loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Fails if a variable is present but not a valid number, or if the
    /// resulting configuration does not validate.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Some(size) = read_var(ENV_BUS_BUFFER_SIZE)? {
            cfg.bus.default_buffer_size = size;
        }
        if let Some(ms) = read_var(ENV_BUS_TIMEOUT_MS)? {
            cfg.bus.default_timeout_ms = Some(ms);
        }
        if let Some(capacity) = read_var(ENV_MANAGER_QUEUE_CAPACITY)? {
            cfg.manager.queue_capacity = capacity;
        }
        if let Some(ms) = read_var(ENV_MANAGER_TIMEOUT_MS)? {
            cfg.manager.delivery_timeout_ms = ms;
        }

        cfg.validate().map_err(|e| anyhow!(e))?;
        Ok(cfg)
    }
}

fn read_var<N>(name: &str) -> AppResult<Option<N>>
where
    N: FromStr,
    N::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<N>()
            .map(Some)
            .with_context(|| format!("{name} must be a number, got `{raw}`")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {name}")),
    }
}
