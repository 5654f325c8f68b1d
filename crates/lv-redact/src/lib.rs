//! PII redaction for structured log records.
//!
//! Every record passing through a [`RedactionEngine`] has its message and
//! context scrubbed according to configured rules before it is persisted or
//! shipped.
//!
//! # Key Features
//!
//! - **Ordered patterns**: regex substitutions applied in configuration
//!   order, screened for catastrophic backtracking before they are accepted.
//! - **JSON-aware messages**: JSON embedded in free text is parsed, masked
//!   structurally and re-encoded in place.
//! - **Field rules**: dot paths with `*` wildcards that remove, replace,
//!   regex-mask, hash or run a callback on a single field.
//! - **Type masks**: per-kind replacements that keep the value's type.
//! - **Conditional gate**: predicates deciding whether a record is masked.
//! - **Audit trail**: every mutation reported to an optional, rate-limited
//!   audit logger.
//!
//! Only construction can fail. Errors while masking are reported to the
//! audit logger and never reach the logging call.
//!
//! # Example
//!
//! ```
//! use lv_redact::{FieldMaskConfig, Level, Record, RedactionEngine, Value, ValueMap};
//!
//! let engine = RedactionEngine::builder()
//!     .pattern(r"/\d{3}-\d{2}-\d{4}/", "***SSN***")
//!     .field_path("user.password", FieldMaskConfig::remove())
//!     .build()
//!     .unwrap();
//!
//! let mut user = ValueMap::new();
//! user.insert("password", Value::from("hunter2"));
//! let mut context = ValueMap::new();
//! context.insert("user", Value::Map(user));
//!
//! let record = Record::new("app", Level::Info, "SSN: 123-45-6789").with_context(context);
//! let masked = engine.process(&record);
//! assert_eq!(masked.message, "SSN: ***SSN***");
//! ```

pub mod audit;
pub mod conditional;
pub mod config;
pub mod context;
pub mod datatype;
pub mod defaults;
pub mod engine;
pub mod error;
pub mod field;
pub mod hash;
pub mod json;
pub mod logging;
pub mod path;
pub mod pattern;
pub mod plugin;
pub mod rate_limit;
pub mod record;
pub mod recursive;
pub mod strategy;
pub mod value;

pub use audit::{
    AuditEvent, AuditLogger, MemoryAuditLogger, OperationType, RateLimitedAuditLogger,
    TracingAuditLogger,
};
pub use conditional::{rules, ConditionalRule, GateDecision, OnPredicateError};
pub use config::{validate_config, RedactionConfig, RedactionEngineBuilder};
pub use context::{coerce_literal, FieldCallback};
pub use datatype::{DataTypeMasker, DataTypeOutcome};
pub use defaults::{default_pattern, default_patterns, DEFAULT_PATTERNS};
pub use engine::RedactionEngine;
pub use error::{sanitize_error_message, BoxError, RedactError, Result};
pub use field::{FieldMaskConfig, FieldRule};
pub use hash::KeyMaterial;
pub use json::{extract_balanced_structure, find_json_structures};
pub use path::FieldPath;
pub use pattern::{CompiledPattern, PatternRule, PatternSet, PatternValidator};
pub use plugin::RedactionPlugin;
pub use rate_limit::{RateLimitConfig, RateLimitProfile, RateLimitStats, SlidingWindowRateLimiter};
pub use record::{Level, Record};
pub use recursive::{DEFAULT_MAX_DEPTH, MAX_MAX_DEPTH, MIN_MAX_DEPTH};
pub use strategy::{
    ConditionalStrategy, DataTypeStrategy, FieldPathStrategy, MaskingStrategy, RegexStrategy,
    StrategyManager, StrategyStats,
};
pub use value::{Resource, Value, ValueKind, ValueMap};
