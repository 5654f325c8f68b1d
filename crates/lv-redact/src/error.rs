//! Error types for the redaction engine.
//!
//! Only configuration errors escape construction. Everything raised while a
//! record is being masked is caught close to where it happened and turned
//! into an audit event instead.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Result type for redaction operations.
pub type Result<T> = std::result::Result<T, RedactError>;

/// Error type returned by user-supplied callbacks, predicates and sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Maximum length of an error message forwarded to the audit sink.
pub const MAX_SANITIZED_LEN: usize = 200;

/// Errors that can occur while configuring or running the engine.
#[derive(Error, Debug)]
pub enum RedactError {
    /// A pattern is malformed or does not compile.
    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A pattern was flagged by the ReDoS heuristics.
    #[error("pattern {pattern:?} may cause catastrophic backtracking (ReDoS)")]
    UnsafePattern { pattern: String },

    /// A field path is empty or has empty segments.
    #[error("invalid field path {path:?}: {reason}")]
    InvalidFieldPath { path: String, reason: String },

    /// A data type mask refers to an unknown kind or has a bad spec.
    #[error("invalid data type mask for {kind:?}: {reason}")]
    InvalidDataTypeMask { kind: String, reason: String },

    /// Maximum recursion depth outside the accepted range.
    #[error("max_depth must be between {min} and {max}, got {value}")]
    InvalidMaxDepth { value: usize, min: usize, max: usize },

    /// A strategy refused registration.
    #[error("strategy {name:?} failed validation")]
    InvalidStrategy { name: String },

    /// Rate limiter settings are unusable.
    #[error("invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    /// A compiled pattern failed while masking.
    #[error("pattern {pattern:?} failed during evaluation: {message}")]
    PatternEvaluation { pattern: String, message: String },

    /// A value could not be masked.
    #[error("cannot mask {path:?}: {message}")]
    MaskingOperation { path: String, message: String },

    /// A strategy failed while masking a value.
    #[error("strategy {strategy:?} failed at {path:?}: {message}")]
    Strategy {
        strategy: String,
        path: String,
        message: String,
    },

    /// The audit sink rejected an event.
    #[error("audit sink error: {0}")]
    AuditSink(String),

    /// Failed to load or generate key material.
    #[error("key error: {0}")]
    Key(String),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RedactError {
    /// Whether this error belongs to the construction-time class.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RedactError::InvalidPattern { .. }
                | RedactError::UnsafePattern { .. }
                | RedactError::InvalidFieldPath { .. }
                | RedactError::InvalidDataTypeMask { .. }
                | RedactError::InvalidMaxDepth { .. }
                | RedactError::InvalidStrategy { .. }
                | RedactError::InvalidRateLimit(_)
                | RedactError::Key(_)
        )
    }

    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            RedactError::InvalidPattern { .. } => 10,
            RedactError::UnsafePattern { .. } => 11,
            RedactError::InvalidFieldPath { .. } => 12,
            RedactError::InvalidDataTypeMask { .. } => 13,
            RedactError::InvalidMaxDepth { .. } => 14,
            RedactError::InvalidStrategy { .. } => 15,
            RedactError::InvalidRateLimit(_) => 16,
            RedactError::Key(_) => 17,
            RedactError::PatternEvaluation { .. } => 20,
            RedactError::MaskingOperation { .. } => 21,
            RedactError::Strategy { .. } => 22,
            RedactError::AuditSink(_) => 30,
            RedactError::Json(_) => 40,
        }
    }

    pub(crate) fn masking(path: impl Into<String>, message: impl Into<String>) -> Self {
        RedactError::MaskingOperation {
            path: path.into(),
            message: message.into(),
        }
    }
}

static CREDENTIAL_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|auth)\s*[=:]\s*\S+")
        .expect("static regex")
});

static ABSOLUTE_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:/[\w.\-]+){2,}").expect("static regex"));

/// Strip an error message down to something safe for the audit trail.
///
/// Keeps the first line, hides credential-looking pairs and filesystem paths,
/// and truncates to [`MAX_SANITIZED_LEN`] characters.
pub fn sanitize_error_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim();
    let masked = CREDENTIAL_PAIR.replace_all(first_line, "$1=[REDACTED]");
    let masked = ABSOLUTE_PATH.replace_all(&masked, "[PATH]");

    if masked.chars().count() <= MAX_SANITIZED_LEN {
        return masked.into_owned();
    }
    let truncated: String = masked.chars().take(MAX_SANITIZED_LEN).collect();
    format!("{}...", truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        let err = RedactError::UnsafePattern {
            pattern: "/(a+)+/".to_string(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("catastrophic backtracking"));

        let err = RedactError::masking("user.email", "unsupported");
        assert!(!err.is_configuration());
        assert_eq!(err.code(), 21);

        let err = RedactError::AuditSink("sink down".to_string());
        assert!(!err.is_configuration());
        assert_eq!(err.code(), 30);
        assert_eq!(err.to_string(), "audit sink error: sink down");
    }

    #[test]
    fn test_sanitize_keeps_first_line() {
        let sanitized = sanitize_error_message("boom\n  at frame 1\n  at frame 2");
        assert_eq!(sanitized, "boom");
    }

    #[test]
    fn test_sanitize_masks_credentials_and_paths() {
        let sanitized = sanitize_error_message("login failed password=hunter2 in /srv/app/config.php");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("/srv/app"));
        assert!(sanitized.contains("password=[REDACTED]"));
        assert!(sanitized.contains("[PATH]"));
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "x".repeat(500);
        let sanitized = sanitize_error_message(&long);
        assert_eq!(sanitized.chars().count(), MAX_SANITIZED_LEN + 3);
        assert!(sanitized.ends_with("..."));
    }
}
