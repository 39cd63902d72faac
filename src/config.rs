use crate::netflow::Protocol;
use crate::pool::PoolConfig;

use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_BUFFER_FACTOR: usize = 2;
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ill-formed configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no {0} given, neither on the command line nor in the configuration file")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Settings of the generator. Every field is optional so that a file and the
/// command line can each provide a part of them.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Collector host name or IP address
    pub target: Option<String>,
    pub port: Option<u16>,
    pub num_per_sec: Option<usize>,
    pub workers: Option<usize>,
    /// Queue capacity, as a multiple of num_per_sec
    pub buffer_factor: Option<usize>,
    pub spike: Option<Protocol>,
    pub false_index: Option<bool>,
    pub connect_retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub seed: Option<u64>,
}

/// Fully resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub target: String,
    pub port: u16,
    pub num_per_sec: usize,
    pub spike: Option<Protocol>,
    pub false_index: bool,
    pub seed: u64,
    pub pool: PoolConfig,
}

/// Import settings from a TOML string
pub fn import_config(config: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = toml::from_str(config)?;
    log::trace!("Configuration: {settings:?}");
    Ok(settings)
}

impl Settings {
    /// Fill the missing fields with those of `other`
    pub fn or(self, other: Settings) -> Settings {
        Settings {
            target: self.target.or(other.target),
            port: self.port.or(other.port),
            num_per_sec: self.num_per_sec.or(other.num_per_sec),
            workers: self.workers.or(other.workers),
            buffer_factor: self.buffer_factor.or(other.buffer_factor),
            spike: self.spike.or(other.spike),
            false_index: self.false_index.or(other.false_index),
            connect_retries: self.connect_retries.or(other.connect_retries),
            retry_delay_ms: self.retry_delay_ms.or(other.retry_delay_ms),
            seed: self.seed.or(other.seed),
        }
    }

    /// Check the settings and apply the defaults. `default_seed` is used when
    /// no seed is given.
    pub fn resolve(self, default_seed: u64) -> Result<GeneratorConfig, ConfigError> {
        let target = self.target.ok_or(ConfigError::Missing("target"))?;
        if target.is_empty() {
            return Err(ConfigError::Invalid("target", "empty host".to_string()));
        }
        let port = self.port.ok_or(ConfigError::Missing("port"))?;
        let num_per_sec = self.num_per_sec.ok_or(ConfigError::Missing("num_per_sec"))?;
        if num_per_sec == 0 {
            return Err(ConfigError::Invalid(
                "num_per_sec",
                "at least one packet per second is needed".to_string(),
            ));
        }
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::Invalid(
                "workers",
                "at least one worker is needed".to_string(),
            ));
        }
        let buffer_factor = self.buffer_factor.unwrap_or(DEFAULT_BUFFER_FACTOR).max(1);
        let retry_delay_ms = self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS);
        if retry_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry_delay",
                "connection attempts must be at least 1ms apart".to_string(),
            ));
        }
        Ok(GeneratorConfig {
            target,
            port,
            num_per_sec,
            spike: self.spike,
            false_index: self.false_index.unwrap_or(false),
            seed: self.seed.unwrap_or(default_seed),
            pool: PoolConfig {
                workers,
                buffer_size: buffer_factor.saturating_mul(num_per_sec),
                connect_retries: self.connect_retries.unwrap_or(DEFAULT_CONNECT_RETRIES),
                retry_delay: Duration::from_millis(retry_delay_ms),
            },
        })
    }
}
