//! Subscriber setup for the engine's `tracing` events.
//!
//! Task-path selection and pool activity are logged at `debug`, per-task
//! dispatch at `trace`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default `ndengine=info`)
//! - `NDENGINE_LOG_FORMAT`: `pretty`, `compact` or `json` (default `pretty`)
//!
//! ```ignore
//! use ndengine::logging::{init_tracing, LoggingConfig};
//!
//! init_tracing(LoggingConfig::from_env()).unwrap();
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{EngineError, Result};

const DEFAULT_FILTER: &str = "ndengine=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to [`LogFormat::Pretty`].
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// `EnvFilter` directives, e.g. `"ndengine=debug,warn"`.
    pub filter: String,
    pub with_ansi: bool,
    pub with_thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: DEFAULT_FILTER.to_string(),
            with_ansi: true,
            with_thread_names: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(format) = lookup("NDENGINE_LOG_FORMAT") {
            config.format = LogFormat::parse(&format);
        }
        if let Some(filter) = lookup("RUST_LOG") {
            config.filter = filter;
        }
        config
    }
}

/// Installs a global subscriber. Fails if the filter does not parse or a
/// subscriber is already installed.
pub fn init_tracing(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| EngineError::Config(format!("RUST_LOG: {e}")))?;

    let layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.with_ansi)
            .with_thread_names(config.with_thread_names)
            .with_filter(filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(config.with_ansi)
            .with_thread_names(config.with_thread_names)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_thread_names(config.with_thread_names)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| EngineError::Config(format!("tracing subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("verbose"), LogFormat::Pretty);
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> =
            [("NDENGINE_LOG_FORMAT", "json"), ("RUST_LOG", "ndengine=trace")].into();
        let config = LoggingConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "ndengine=trace");

        let config = LoggingConfig::from_lookup(|_| None);
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_bad_filter_is_config_error() {
        let config = LoggingConfig {
            filter: "ndengine=loud".into(),
            ..Default::default()
        };
        assert!(matches!(init_tracing(config), Err(EngineError::Config(_))));
    }
}
