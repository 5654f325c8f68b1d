//! Audit events and sinks.
//!
//! Every mutation the engine performs is reported as an [`AuditEvent`]. The
//! engine never stores events itself; it hands them to an [`AuditLogger`].
//! Sink failures are swallowed: auditing is best-effort and must never abort
//! masking.

use crate::error::{sanitize_error_message, BoxError, RedactError, Result};
use crate::rate_limit::{RateLimitConfig, RateLimitStats, SlidingWindowRateLimiter};
use crate::value::{Value, ValueMap};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Well-known audit paths emitted by the engine itself.
pub mod paths {
    pub const MAX_DEPTH_REACHED: &str = "max_depth_reached";
    pub const CONDITIONAL_SKIP: &str = "conditional_skip";
    pub const CONDITIONAL_ERROR: &str = "conditional_error";
    pub const JSON_MASKED: &str = "json_masked";
    pub const JSON_ENCODE_ERROR: &str = "json_encode_error";
    pub const REGEX_ERROR: &str = "regex_error";
    pub const GLOBAL_PATTERNS_ERROR: &str = "global_patterns_error";
    pub const STRATEGY_ERROR: &str = "strategy_error";
    pub const RATE_LIMIT_EXCEEDED: &str = "rate_limit_exceeded";
    /// Suffix appended to a field path when its callback fails.
    pub const CALLBACK_ERROR_SUFFIX: &str = "_callback_error";
}

/// One masking mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    /// Field path or engine event name.
    pub path: String,
    /// Value before masking.
    pub original: Value,
    /// Value after masking; `None` when the field was removed.
    pub masked: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(path: impl Into<String>, original: Value, masked: Option<Value>) -> Self {
        Self {
            path: path.into(),
            original,
            masked,
            timestamp: Utc::now(),
        }
    }
}

/// Receiver of audit events.
///
/// Any `Fn(&AuditEvent) + Send + Sync` closure is an audit logger.
pub trait AuditLogger: Send + Sync {
    fn log(&self, event: &AuditEvent) -> std::result::Result<(), BoxError>;
}

impl<F> AuditLogger for F
where
    F: Fn(&AuditEvent) + Send + Sync,
{
    fn log(&self, event: &AuditEvent) -> std::result::Result<(), BoxError> {
        self(event);
        Ok(())
    }
}

/// Engine-side handle used to emit events.
///
/// Cloning the original value only happens when a logger is configured.
#[derive(Clone, Default)]
pub(crate) struct Auditor {
    logger: Option<Arc<dyn AuditLogger>>,
}

impl Auditor {
    pub(crate) fn new(logger: Option<Arc<dyn AuditLogger>>) -> Self {
        Self { logger }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.logger.is_some()
    }

    pub(crate) fn emit(&self, path: &str, original: &Value, masked: Option<&Value>) {
        let Some(logger) = &self.logger else {
            return;
        };
        let event = AuditEvent::new(path, original.clone(), masked.cloned());
        match catch_unwind(AssertUnwindSafe(|| logger.log(&event))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let err = RedactError::AuditSink(sanitize_error_message(&e.to_string()));
                debug!(path, error = %err, code = err.code(), "audit sink rejected event");
            }
            Err(_) => debug!(path, "audit sink panicked"),
        }
    }

    /// Emit an error event; the message is sanitized before it leaves.
    pub(crate) fn emit_error(&self, path: &str, original: &Value, error: &dyn fmt::Display) {
        if !self.is_enabled() {
            return;
        }
        let message = Value::String(sanitize_error_message(&error.to_string()));
        self.emit(path, original, Some(&message));
    }
}

impl fmt::Debug for Auditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auditor")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Audit logger that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event received so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with the given path.
    pub fn events_for(&self, path: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.path == path)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: &AuditEvent) -> std::result::Result<(), BoxError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Audit logger that forwards events to `tracing`.
///
/// Original values are never logged; only their kind and length are.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: &AuditEvent) -> std::result::Result<(), BoxError> {
        let masked = match &event.masked {
            Some(value) => value.to_text(),
            None => "<removed>".to_string(),
        };
        info!(
            target: "lv_redact::audit",
            path = %event.path,
            original_kind = %event.original.kind(),
            original_len = event.original.to_text().chars().count(),
            masked = %masked,
            "masked value"
        );
        Ok(())
    }
}

/// Operation type buckets used for audit rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Json,
    Conditional,
    Regex,
    Error,
    General,
}

impl OperationType {
    pub const ALL: [OperationType; 5] = [
        OperationType::Json,
        OperationType::Conditional,
        OperationType::Regex,
        OperationType::Error,
        OperationType::General,
    ];

    /// Classify an audit path into its bucket.
    pub fn classify(path: &str) -> Self {
        if path.starts_with("json_") {
            OperationType::Json
        } else if path.starts_with("conditional_") {
            OperationType::Conditional
        } else if path.starts_with("regex_") || path.starts_with("preg_replace_") {
            OperationType::Regex
        } else if path.contains("error") {
            OperationType::Error
        } else {
            OperationType::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Json => "json_operations",
            OperationType::Conditional => "conditional_operations",
            OperationType::Regex => "regex_operations",
            OperationType::Error => "error_operations",
            OperationType::General => "general_operations",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit logger wrapper that rate limits events per operation type.
///
/// Dropped events trigger a single `rate_limit_exceeded` notice per
/// operation type per window.
pub struct RateLimitedAuditLogger {
    inner: Arc<dyn AuditLogger>,
    limiter: SlidingWindowRateLimiter,
    warnings: SlidingWindowRateLimiter,
}

impl RateLimitedAuditLogger {
    pub fn new(inner: Arc<dyn AuditLogger>, config: RateLimitConfig) -> Result<Self> {
        let warning_config = RateLimitConfig {
            max_requests: 1,
            ..config
        };
        Ok(Self {
            inner,
            limiter: SlidingWindowRateLimiter::new(config)?,
            warnings: SlidingWindowRateLimiter::new(warning_config)?,
        })
    }

    /// Whether an event for `path` would currently be forwarded, recording it
    /// if so.
    pub fn is_allowed(&self, path: &str) -> bool {
        self.limiter.is_allowed(OperationType::classify(path).as_str())
    }

    /// Usage per operation type.
    pub fn stats(&self) -> HashMap<OperationType, RateLimitStats> {
        OperationType::ALL
            .iter()
            .map(|op| (*op, self.limiter.stats(op.as_str())))
            .collect()
    }

    pub fn limiter(&self) -> &SlidingWindowRateLimiter {
        &self.limiter
    }

    /// Forget all recorded events, including warning state.
    pub fn reset(&self) {
        self.limiter.reset();
        self.warnings.reset();
    }

    fn report_exceeded(&self, op: OperationType) {
        if !self.warnings.is_allowed(op.as_str()) {
            return;
        }
        let stats = self.limiter.stats(op.as_str());
        warn!(
            operation = %op,
            limit = stats.limit,
            reset_in_ms = stats.reset_in.as_millis() as u64,
            "audit rate limit exceeded, dropping events"
        );

        let mut details = ValueMap::new();
        details.insert("operation", Value::from(op.as_str()));
        details.insert("limit", Value::Int(stats.limit as i64));
        details.insert(
            "window_secs",
            Value::Int(self.limiter.config().window.as_secs() as i64),
        );
        let notice = AuditEvent::new(
            crate::audit::paths::RATE_LIMIT_EXCEEDED,
            Value::from(op.as_str()),
            Some(Value::Map(details)),
        );
        // Best-effort: the notice itself must not fail the dropped event.
        let _ = self.inner.log(&notice);
    }
}

impl AuditLogger for RateLimitedAuditLogger {
    fn log(&self, event: &AuditEvent) -> std::result::Result<(), BoxError> {
        let op = OperationType::classify(&event.path);
        if self.limiter.is_allowed(op.as_str()) {
            self.inner.log(event)
        } else {
            self.report_exceeded(op);
            Ok(())
        }
    }
}

impl fmt::Debug for RateLimitedAuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitedAuditLogger")
            .field("config", self.limiter.config())
            .finish()
    }
}
