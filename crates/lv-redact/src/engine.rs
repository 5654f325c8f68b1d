//! Per-record redaction pipeline.
//!
//! The engine is built once from a [`RedactionConfig`] and then shared. For
//! each record it runs:
//!
//! 1. the conditional gate (a failing rule returns the record untouched),
//! 2. plugin pre-hooks,
//! 3. the message through the JSON-aware text masker,
//! 4. the context through field rules, then the recursive masker over every
//!    path the field rules did not claim,
//! 5. plugin post-hooks.
//!
//! Nothing after construction returns an error. Failures while masking are
//! reported to the audit logger and the affected value is left as it was.

use crate::audit::{AuditLogger, Auditor, RateLimitedAuditLogger};
use crate::conditional::{ConditionalGate, GateDecision};
use crate::config::{validate_with, RedactionConfig, RedactionEngineBuilder};
use crate::context::FieldMasker;
use crate::datatype::DataTypeMasker;
use crate::error::Result;
use crate::hash::{KeyMaterial, EPHEMERAL_KEY_ID};
use crate::json;
use crate::pattern::{PatternSet, PatternValidator};
use crate::plugin::PluginChain;
use crate::record::Record;
use crate::recursive::RecursiveMasker;
use crate::value::{Value, ValueMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Depth at which a single value handed to [`RedactionEngine::mask_value`]
/// sits, matching a top-level context entry.
const VALUE_DEPTH: usize = 1;

/// The redaction engine.
pub struct RedactionEngine {
    validator: PatternValidator,
    patterns: PatternSet,
    fields: FieldMasker,
    datatypes: DataTypeMasker,
    gate: ConditionalGate,
    plugins: PluginChain,
    auditor: Auditor,
    max_depth: usize,
}

impl RedactionEngine {
    pub fn builder() -> RedactionEngineBuilder {
        RedactionEngineBuilder::new()
    }

    /// Validate and compile a configuration.
    ///
    /// Any invalid entry rejects the whole configuration.
    pub fn new(config: RedactionConfig) -> Result<Self> {
        let validator = PatternValidator::new();
        validate_with(&config, &validator)?;
        let uses_hashing = config.uses_hashing();

        let plugins = PluginChain::new(config.plugins);
        let mut rules = config.patterns;
        rules.extend(plugins.patterns());
        let patterns = PatternSet::compile(&rules, &validator)?;

        let key = match config.hash_key {
            Some(key) => Some(key),
            None if uses_hashing => Some(KeyMaterial::generate(EPHEMERAL_KEY_ID)?),
            None => None,
        };

        let fields = FieldMasker::compile(&config.field_paths, &config.callbacks, &validator, key)?;
        let datatypes = DataTypeMasker::from_specs(&config.data_type_masks)?;
        let gate = ConditionalGate::new(config.conditional_rules, config.on_predicate_error);

        let logger: Option<Arc<dyn AuditLogger>> = match (config.audit_logger, config.audit_rate_limit) {
            (Some(inner), Some(limit)) => Some(Arc::new(RateLimitedAuditLogger::new(inner, limit)?)),
            (logger, _) => logger,
        };

        debug!(
            patterns = patterns.len(),
            field_rules = config.field_paths.len(),
            callbacks = config.callbacks.len(),
            data_type_masks = config.data_type_masks.len(),
            conditional_rules = !gate.is_empty(),
            plugins = ?plugins.names(),
            max_depth = config.max_depth,
            audit = logger.is_some(),
            "redaction engine ready"
        );

        Ok(Self {
            validator,
            patterns,
            fields,
            datatypes,
            gate,
            plugins,
            auditor: Auditor::new(logger),
            max_depth: config.max_depth,
        })
    }

    /// Mask a record, returning a new one.
    pub fn process(&self, record: &Record) -> Record {
        if let GateDecision::Skip { rule } = self.gate.evaluate(record, &self.auditor) {
            trace!(rule = %rule, channel = %record.channel, "record skipped by conditional rule");
            return record.clone();
        }

        let mut message = record.message.clone();
        self.plugins.pre_message(&mut message, record);
        let mut message = json::process_message(&message, &self.masker());
        self.plugins.post_message(&mut message, record);

        let mut context = record.context.clone();
        self.plugins.pre_context(&mut context, record);
        let mut context = self.mask_context_owned(context);
        self.plugins.post_context(&mut context, record);

        Record {
            timestamp: record.timestamp,
            channel: record.channel.clone(),
            level: record.level,
            message,
            context,
        }
    }

    /// Whether the conditional rules let this record be masked.
    pub fn should_mask(&self, record: &Record) -> bool {
        self.gate.evaluate(record, &self.auditor) == GateDecision::Proceed
    }

    /// Mask free text: embedded JSON first, then the ordered patterns.
    pub fn mask_message(&self, message: &str) -> String {
        json::process_message(message, &self.masker())
    }

    /// Apply field rules and then recursive masking to a context map.
    pub fn mask_context(&self, context: &ValueMap) -> ValueMap {
        self.mask_context_owned(context.clone())
    }

    /// Recursively mask one value as if it sat at `path` in a context.
    ///
    /// Field rules are not consulted.
    pub fn mask_value(&self, value: Value, path: &str) -> Value {
        self.masker().mask(value, path, VALUE_DEPTH)
    }

    pub fn validator(&self) -> &PatternValidator {
        &self.validator
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn mask_context_owned(&self, mut context: ValueMap) -> ValueMap {
        let processed = self.fields.apply(&mut context, &self.patterns, &self.auditor);
        self.masker().with_processed(&processed).mask_context(context)
    }

    fn masker(&self) -> RecursiveMasker<'_> {
        RecursiveMasker::new(&self.patterns, &self.datatypes, &self.auditor, self.max_depth)
    }
}

impl fmt::Debug for RedactionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionEngine")
            .field("patterns", &self.patterns.len())
            .field("field_rules", &!self.fields.is_empty())
            .field("datatypes", &self.datatypes)
            .field("gate", &self.gate)
            .field("plugins", &self.plugins)
            .field("auditor", &self.auditor)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}
