//! Logging initialization for the signalpost daemon.
//!
//! Configures `tracing-subscriber` from the `system` section of the
//! configuration file. Supports JSON structured logging and a
//! human-readable pretty format. `RUST_LOG` takes precedence over
//! the configured level.

use std::path::Path;

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logging settings resolved before the core is up.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Log level filter (e.g. "info", "debug").
    pub level: String,
    /// Output format: "json" or "pretty".
    pub format: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
        }
    }
}

/// Read `system.log_level` / `system.log_format` from the config file
/// without going through the core config store (logging must come up
/// before anything else).
pub fn settings_from_config_file(path: Option<&Path>) -> LogSettings {
    let mut settings = LogSettings::default();
    let Some(path) = path else {
        return settings;
    };
    let Ok(data) = std::fs::read(path) else {
        return settings;
    };
    let Ok(root) = serde_json::from_slice::<serde_json::Value>(&data) else {
        return settings;
    };

    if let Some(level) = root
        .get("system")
        .and_then(|s| s.get("log_level"))
        .and_then(serde_json::Value::as_str)
    {
        settings.level = level.to_owned();
    }
    if let Some(format) = root
        .get("system")
        .and_then(|s| s.get("log_format"))
        .and_then(serde_json::Value::as_str)
    {
        settings.format = format.to_owned();
    }
    settings
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
pub fn init_tracing(settings: &LogSettings) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    match settings.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))?;
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ));
        }
    }

    Ok(())
}
