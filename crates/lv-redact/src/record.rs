//! Log record shape consumed and produced by the engine.

use crate::value::ValueMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "notice" => Ok(Level::Notice),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            "alert" => Ok(Level::Alert),
            "emergency" => Ok(Level::Emergency),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Notice => "notice",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
            Level::Alert => "alert",
            Level::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// A structured log record.
///
/// Owned by the caller. The engine never mutates a record in place; it hands
/// back a new one with message and context replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub channel: String,
    pub level: Level,
    pub message: String,
    #[serde(default)]
    pub context: ValueMap,
}

impl Record {
    /// Create a record stamped with the current time.
    pub fn new(channel: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            channel: channel.into(),
            level,
            message: message.into(),
            context: ValueMap::new(),
        }
    }

    pub fn with_context(mut self, context: ValueMap) -> Self {
        self.context = context;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}
