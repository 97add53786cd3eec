//! Logging configuration and initialization.
//!
//! The filter comes from the first of these that is present:
//! - the `RUST_LOG` environment variable
//! - the `[logging]` section of the config file
//! - the built-in `info` default
//!
//! The `format` key picks the renderer; `json` emits one object per line.

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// `[logging]` section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl LogConfig {
    /// `info` level with pretty output.
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the global tracing subscriber.
///
/// Level selection, highest priority first:
/// 1. `RUST_LOG`, when set
/// 2. `config.level`, when a config is given
/// 3. `info`
///
/// An unknown format falls back to pretty. Only the first call installs a
/// subscriber; later calls are no-ops.
///
/// # Examples
///
/// ```ignore
/// // RUST_LOG=arpsentry=debug arpsentry run -c arpsentry.toml
/// init_logging(None);
///
/// // settings from the config file
/// let config = LogConfig { level: "debug".into(), format: "json".into() };
/// init_logging(Some(&config));
/// ```
pub fn init_logging(config: Option<&LogConfig>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        // per-target directives from the environment win
        EnvFilter::from_default_env()
    } else if let Some(cfg) = config {
        EnvFilter::new(parse_level(&cfg.level).as_str())
    } else {
        EnvFilter::new("info")
    };

    let format = config.map(|c| c.format.as_str()).unwrap_or("pretty");

    // set_global_default fails once a subscriber exists; keep the first one
    match format {
        "json" => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        "compact" => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact());
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        _ => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer());
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Parses a log level string, falling back to INFO.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("error"), Level::ERROR);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("info"), Level::INFO);
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("trace"), Level::TRACE);

        // case-insensitive
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("Warn"), Level::WARN);

        // unknown levels fall back to info
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "pretty");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let config = LogConfig {
            level: "debug".into(),
            format: "compact".into(),
        };
        init_logging(Some(&config));
        init_logging(None);
    }

    #[test]
    fn test_log_config_partial_section() {
        let config: LogConfig = toml::from_str("format = \"compact\"").unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, "compact");
    }
}
