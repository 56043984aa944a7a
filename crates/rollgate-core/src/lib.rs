//! rollgate-core: shared configuration and telemetry for Rollgate crates.
//!
//! The `rollgate.toml` file drives the lock, retry, scheduler, and logging
//! knobs of every other crate. Each section is optional and falls back to
//! the defaults documented on its settings struct.

pub mod config;
pub mod telemetry;

pub use config::{
    parse_duration, ConfigError, LockSettings, LoggingSettings, RetrySettings, RollgateConfig,
    SchedulerSettings, StateSettings,
};
