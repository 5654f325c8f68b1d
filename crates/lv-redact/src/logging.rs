//! Diagnostic logging setup.
//!
//! The engine itself only emits `tracing` events. Hosts that have no
//! subscriber of their own can install one here; output goes to stderr,
//! human-readable or as JSON lines.
//!
//! Environment:
//! - `LV_LOG`: level for this crate (`trace` .. `off`), wins over `RUST_LOG`
//! - `RUST_LOG`: standard directives; an `lv_redact=<level>` directive or a
//!   bare level is honoured
//! - `LV_LOG_FORMAT`: `human` or `jsonl`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CRATE_TARGET: &str = "lv_redact";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Human,
    /// One JSON object per line.
    Jsonl,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Human => "human",
            LogFormat::Jsonl => "jsonl",
        })
    }
}

/// Minimum level of diagnostics emitted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    /// Rate-limit notices, failing predicates.
    #[default]
    Warn,
    Error,
    Off,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        })
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Timestamps on human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Human,
            level: LogLevel::Warn,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Resolve from the environment; explicit arguments win.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        let env_level = std::env::var("LV_LOG")
            .ok()
            .and_then(|v| v.parse().ok())
            .or_else(|| {
                std::env::var("RUST_LOG")
                    .ok()
                    .and_then(|v| level_from_directives(&v))
            });
        let env_format = std::env::var("LV_LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok());

        let defaults = Self::default();
        Self {
            format: cli_format.or(env_format).unwrap_or(defaults.format),
            level: cli_level.or(env_level).unwrap_or(defaults.level),
            timestamps: defaults.timestamps,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }
}

/// Pick this crate's level out of a `RUST_LOG` style directive list.
///
/// A crate-specific directive beats a bare global level.
pub fn level_from_directives(directives: &str) -> Option<LogLevel> {
    let mut global = None;
    for directive in directives.split(',').map(str::trim) {
        match directive.split_once('=') {
            Some((target, level)) if target == CRATE_TARGET => {
                if let Ok(level) = level.parse() {
                    return Some(level);
                }
            }
            Some(_) => {}
            None => {
                if let Ok(level) = directive.parse() {
                    global = Some(level);
                }
            }
        }
    }
    global
}

/// Install a global subscriber writing to stderr.
///
/// Returns `false` when a subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> bool {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(config.level).into())
        .parse_lossy(format!("{}={}", CRATE_TARGET, config.level));

    let installed = match config.format {
        LogFormat::Human => {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(std::io::stderr().is_terminal());
            if config.timestamps {
                tracing_subscriber::registry().with(filter).with(layer).try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => {
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(layer).try_init()
        }
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse_and_display() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Jsonl.to_string(), "jsonl");
    }

    #[test]
    fn test_level_parse_and_display() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(" quiet ".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert!(LogLevel::Trace < LogLevel::Error);
    }

    #[test]
    fn test_level_from_directives() {
        assert_eq!(level_from_directives("debug"), Some(LogLevel::Debug));
        assert_eq!(
            level_from_directives("info,lv_redact=trace,hyper=warn"),
            Some(LogLevel::Trace)
        );
        assert_eq!(level_from_directives("lv_redact=error,debug"), Some(LogLevel::Error));
        assert_eq!(level_from_directives("hyper=warn"), None);
        assert_eq!(level_from_directives(""), None);
    }

    #[test]
    fn test_explicit_arguments_win() {
        let config = LogConfig::from_env(Some(LogLevel::Trace), Some(LogFormat::Jsonl));
        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn test_second_init_reports_false() {
        let config = LogConfig::default().with_level(LogLevel::Off).with_timestamps(false);
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
