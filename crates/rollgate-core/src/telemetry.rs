//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Returns an error if a
/// global subscriber is already installed or the filter does not parse.
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter)?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.json {
        builder
            .json()
            .try_init()
            .map_err(|e| anyhow::anyhow!("{e}"))?;
    } else {
        builder.try_init().map_err(|e| anyhow::anyhow!("{e}"))?;
    }

    tracing::debug!(json = settings.json, "tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_fails() {
        let settings = LoggingSettings::default();
        // The first call may race another test binary-wide; only the second matters.
        let _ = init(&settings);
        assert!(init(&settings).is_err());
    }
}
