//! rollgate.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or interpreting configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    Duration { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollgateConfig {
    pub state: StateSettings,
    pub lock: LockSettings,
    pub retry: RetrySettings,
    pub scheduler: SchedulerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSettings {
    /// Path to the redb database file.
    pub path: PathBuf,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/rollgate/rollgate.redb"),
        }
    }
}

/// Distributed lock acquisition knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Acquisition attempts before giving up.
    pub attempts: u32,
    /// Delay between acquisition attempts (e.g. "500ms").
    pub retry_delay: String,
    /// How long a held lock stays valid without being released.
    pub ttl: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: "500ms".to_string(),
            ttl: "60s".to_string(),
        }
    }
}

impl LockSettings {
    pub fn retry_delay(&self) -> ConfigResult<Duration> {
        duration_field("lock.retry_delay", &self.retry_delay)
    }

    pub fn ttl(&self) -> ConfigResult<Duration> {
        duration_field("lock.ttl", &self.ttl)
    }
}

/// Store-call retry ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts for transient conflicts.
    pub conflict_attempts: u32,
    /// Attempts with the skip-review flag after a review rejection.
    pub skip_review_attempts: u32,
    /// Pause between retried attempts.
    pub retry_delay: String,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            conflict_attempts: 4,
            skip_review_attempts: 3,
            retry_delay: "1s".to_string(),
        }
    }
}

impl RetrySettings {
    pub fn retry_delay(&self) -> ConfigResult<Duration> {
        duration_field("retry.retry_delay", &self.retry_delay)
    }
}

/// Automatic rollout scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// How often the scheduler looks for due rollouts.
    pub tick_interval: String,
    /// Time spent at each stage before an automatic advance.
    pub stage_interval: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: "60s".to_string(),
            stage_interval: "24h".to_string(),
        }
    }
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> ConfigResult<Duration> {
        duration_field("scheduler.tick_interval", &self.tick_interval)
    }

    pub fn stage_interval(&self) -> ConfigResult<Duration> {
        duration_field("scheduler.stage_interval", &self.stage_interval)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,rollgate=debug".to_string(),
            json: false,
        }
    }
}

impl RollgateConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: RollgateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every duration parses and every ceiling is usable.
    pub fn validate(&self) -> ConfigResult<()> {
        self.lock.retry_delay()?;
        self.lock.ttl()?;
        self.retry.retry_delay()?;
        self.scheduler.tick_interval()?;
        self.scheduler.stage_interval()?;

        if self.lock.attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "lock.attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.conflict_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.conflict_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

/// Parse a duration string like "500ms", "5s", "2m", "24h".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim().parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
