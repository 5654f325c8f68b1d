//! Engine configuration.
//!
//! [`RedactionConfig`] is the full option surface. Its data-only fields
//! round-trip through serde; closures, plugins and key material are attached
//! in code, usually through [`RedactionEngineBuilder`].

use crate::audit::AuditLogger;
use crate::conditional::{ConditionalRule, OnPredicateError};
use crate::context::FieldCallback;
use crate::defaults::default_patterns;
use crate::engine::RedactionEngine;
use crate::error::{BoxError, RedactError, Result};
use crate::field::{FieldMaskConfig, FieldRule};
use crate::hash::KeyMaterial;
use crate::path::FieldPath;
use crate::pattern::{PatternRule, PatternValidator};
use crate::plugin::RedactionPlugin;
use crate::rate_limit::RateLimitConfig;
use crate::recursive::{DEFAULT_MAX_DEPTH, MAX_MAX_DEPTH, MIN_MAX_DEPTH};
use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

/// Everything the engine is built from.
#[derive(Clone, Serialize, Deserialize)]
pub struct RedactionConfig {
    /// Ordered substitution rules; later rules see earlier output.
    #[serde(default)]
    pub patterns: Vec<PatternRule>,

    #[serde(default)]
    pub field_paths: Vec<FieldRule>,

    /// Maximum container nesting that is masked; must be in `1..=1000`.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Kind name to mask spec, e.g. `{"integer": "0"}`.
    #[serde(default)]
    pub data_type_masks: BTreeMap<String, String>,

    #[serde(default)]
    pub on_predicate_error: OnPredicateError,

    #[serde(skip)]
    pub callbacks: Vec<(String, FieldCallback)>,

    #[serde(skip)]
    pub conditional_rules: Vec<ConditionalRule>,

    #[serde(skip)]
    pub audit_logger: Option<Arc<dyn AuditLogger>>,

    /// Wrap the audit logger in a per-operation rate limiter.
    #[serde(skip)]
    pub audit_rate_limit: Option<RateLimitConfig>,

    #[serde(skip)]
    pub plugins: Vec<Arc<dyn RedactionPlugin>>,

    /// Key for `hash` field rules; generated per engine when absent.
    #[serde(skip)]
    pub hash_key: Option<KeyMaterial>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            field_paths: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            data_type_masks: BTreeMap::new(),
            on_predicate_error: OnPredicateError::default(),
            callbacks: Vec::new(),
            conditional_rules: Vec::new(),
            audit_logger: None,
            audit_rate_limit: None,
            plugins: Vec::new(),
            hash_key: None,
        }
    }
}

impl RedactionConfig {
    /// Configuration preloaded with the built-in pattern set.
    pub fn with_default_patterns() -> Self {
        Self {
            patterns: default_patterns(),
            ..Self::default()
        }
    }

    /// Whether any field rule needs key material.
    pub fn uses_hashing(&self) -> bool {
        self.field_paths
            .iter()
            .any(|rule| matches!(rule.mask, FieldMaskConfig::Hash))
    }
}

impl fmt::Debug for RedactionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionConfig")
            .field("patterns", &self.patterns.len())
            .field("field_paths", &self.field_paths)
            .field("max_depth", &self.max_depth)
            .field("data_type_masks", &self.data_type_masks)
            .field("on_predicate_error", &self.on_predicate_error)
            .field(
                "callbacks",
                &self.callbacks.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            )
            .field("conditional_rules", &self.conditional_rules)
            .field("audit_logger", &self.audit_logger.is_some())
            .field("audit_rate_limit", &self.audit_rate_limit)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .field("hash_key", &self.hash_key)
            .finish()
    }
}

/// Check every entry of a configuration, failing on the first bad one.
pub fn validate_config(config: &RedactionConfig) -> Result<()> {
    validate_with(config, &PatternValidator::new())
}

pub(crate) fn validate_with(config: &RedactionConfig, validator: &PatternValidator) -> Result<()> {
    if !(MIN_MAX_DEPTH..=MAX_MAX_DEPTH).contains(&config.max_depth) {
        return Err(RedactError::InvalidMaxDepth {
            value: config.max_depth,
            min: MIN_MAX_DEPTH,
            max: MAX_MAX_DEPTH,
        });
    }

    let plugin_patterns = config.plugins.iter().flat_map(|p| p.patterns());
    for rule in config.patterns.iter().cloned().chain(plugin_patterns) {
        check_pattern(&rule.pattern, validator)?;
    }

    for rule in &config.field_paths {
        FieldPath::parse(&rule.path)?;
        if let Some(pattern) = rule.mask.pattern() {
            check_pattern(pattern, validator)?;
        }
    }

    for (path, _) in &config.callbacks {
        if FieldPath::parse(path)?.is_wildcard() {
            return Err(RedactError::InvalidFieldPath {
                path: path.clone(),
                reason: "callbacks must be bound to an exact path".to_string(),
            });
        }
    }

    for kind in config.data_type_masks.keys() {
        kind.parse::<ValueKind>()
            .map_err(|reason| RedactError::InvalidDataTypeMask {
                kind: kind.clone(),
                reason,
            })?;
    }

    if let Some(limit) = &config.audit_rate_limit {
        limit.validate()?;
    }

    Ok(())
}

fn check_pattern(pattern: &str, validator: &PatternValidator) -> Result<()> {
    if pattern.is_empty() {
        return Err(RedactError::InvalidPattern {
            pattern: String::new(),
            reason: "pattern is empty".to_string(),
        });
    }
    validator.check(pattern).map(|_| ())
}

/// Fluent construction of a [`RedactionEngine`].
#[derive(Debug, Default)]
pub struct RedactionEngineBuilder {
    config: RedactionConfig,
}

impl RedactionEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn from_config(config: RedactionConfig) -> Self {
        Self { config }
    }

    pub fn pattern(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.config.patterns.push(PatternRule::new(pattern, replacement));
        self
    }

    pub fn patterns(mut self, rules: impl IntoIterator<Item = PatternRule>) -> Self {
        self.config.patterns.extend(rules);
        self
    }

    /// Append the built-in pattern set after any patterns added so far.
    pub fn with_default_patterns(self) -> Self {
        self.patterns(default_patterns())
    }

    pub fn field_path(mut self, path: impl Into<String>, mask: FieldMaskConfig) -> Self {
        self.config.field_paths.push(FieldRule::new(path, mask));
        self
    }

    /// Bind a callback to an exact path. It takes precedence over field rules.
    pub fn callback<F>(mut self, path: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.config.callbacks.push((path.into(), Arc::new(callback)));
        self
    }

    pub fn audit_logger(mut self, logger: impl AuditLogger + 'static) -> Self {
        self.config.audit_logger = Some(Arc::new(logger));
        self
    }

    pub fn audit_logger_arc(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.config.audit_logger = Some(logger);
        self
    }

    pub fn audit_rate_limit(mut self, limit: RateLimitConfig) -> Self {
        self.config.audit_rate_limit = Some(limit);
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn data_type_mask(mut self, kind: impl Into<String>, spec: impl Into<String>) -> Self {
        self.config.data_type_masks.insert(kind.into(), spec.into());
        self
    }

    pub fn conditional_rule(mut self, rule: ConditionalRule) -> Self {
        self.config.conditional_rules.push(rule);
        self
    }

    pub fn on_predicate_error(mut self, policy: OnPredicateError) -> Self {
        self.config.on_predicate_error = policy;
        self
    }

    pub fn plugin(mut self, plugin: impl RedactionPlugin + 'static) -> Self {
        self.config.plugins.push(Arc::new(plugin));
        self
    }

    pub fn hash_key(mut self, key: KeyMaterial) -> Self {
        self.config.hash_key = Some(key);
        self
    }

    pub fn config(&self) -> &RedactionConfig {
        &self.config
    }

    pub fn build(self) -> Result<RedactionEngine> {
        RedactionEngine::new(self.config)
    }
}
