//! Built-in strategies.

use super::MaskingStrategy;
use crate::audit::Auditor;
use crate::conditional::ConditionalRule;
use crate::context::coerce_literal;
use crate::datatype::{DataTypeMasker, DataTypeOutcome};
use crate::error::{RedactError, Result};
use crate::field::{FieldMaskConfig, FieldRule};
use crate::hash::KeyMaterial;
use crate::path::FieldPath;
use crate::pattern::{CompiledPattern, PatternRule, PatternSet, PatternValidator};
use crate::record::Record;
use crate::value::Value;
use std::fmt;

/// Ordered patterns over string values, optionally limited to some paths.
#[derive(Debug)]
pub struct RegexStrategy {
    patterns: PatternSet,
    include: Vec<FieldPath>,
    exclude: Vec<FieldPath>,
    priority: i32,
}

impl RegexStrategy {
    pub const DEFAULT_PRIORITY: i32 = 60;

    pub fn new(rules: &[PatternRule]) -> Result<Self> {
        Ok(Self {
            patterns: PatternSet::compile(rules, &PatternValidator::new())?,
            include: Vec::new(),
            exclude: Vec::new(),
            priority: Self::DEFAULT_PRIORITY,
        })
    }

    /// Only apply to paths matching one of `paths`.
    pub fn include_paths<S: AsRef<str>>(mut self, paths: &[S]) -> Result<Self> {
        self.include = parse_paths(paths)?;
        Ok(self)
    }

    /// Never apply to paths matching one of `paths`.
    pub fn exclude_paths<S: AsRef<str>>(mut self, paths: &[S]) -> Result<Self> {
        self.exclude = parse_paths(paths)?;
        Ok(self)
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn path_allowed(&self, path: &str) -> bool {
        if self.exclude.iter().any(|p| p.matches(path)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| p.matches(path))
    }
}

impl MaskingStrategy for RegexStrategy {
    fn name(&self) -> &str {
        "regex"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, value: &Value, path: &str, _record: &Record) -> bool {
        match value {
            Value::String(text) => self.path_allowed(path) && self.patterns.is_match(text),
            _ => false,
        }
    }

    fn mask(&self, value: &Value, path: &str, _record: &Record) -> Result<Value> {
        match value {
            Value::String(text) => Ok(Value::String(self.patterns.apply(text, &Auditor::default()))),
            other => Err(RedactError::masking(
                path,
                format!("regex strategy cannot mask a {} value", other.kind()),
            )),
        }
    }

    fn validate(&self) -> bool {
        !self.patterns.is_empty()
    }
}

enum StrategyMask {
    Remove,
    Replace(String),
    RegexMask(CompiledPattern),
    Hash,
    Unsupported,
}

/// Field path rules applied to individual values.
///
/// A strategy can only hand back a value, so `Remove` yields `null`.
/// `UseGlobalPatterns` has no global pattern list to delegate to here and
/// makes the strategy fail validation, as does `Hash` without a key.
pub struct FieldPathStrategy {
    rules: Vec<(FieldPath, StrategyMask)>,
    key: Option<KeyMaterial>,
    priority: i32,
}

impl FieldPathStrategy {
    pub const DEFAULT_PRIORITY: i32 = 80;

    pub fn new(rules: &[FieldRule]) -> Result<Self> {
        let validator = PatternValidator::new();
        let rules = rules
            .iter()
            .map(|rule| {
                let path = FieldPath::parse(&rule.path)?;
                let mask = match &rule.mask {
                    FieldMaskConfig::Remove => StrategyMask::Remove,
                    FieldMaskConfig::Replace { value } => StrategyMask::Replace(value.clone()),
                    FieldMaskConfig::RegexMask {
                        pattern,
                        replacement,
                    } => StrategyMask::RegexMask(
                        validator.compile_rule(&PatternRule::new(pattern, replacement))?,
                    ),
                    FieldMaskConfig::Hash => StrategyMask::Hash,
                    FieldMaskConfig::UseGlobalPatterns => StrategyMask::Unsupported,
                };
                Ok((path, mask))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            key: None,
            priority: Self::DEFAULT_PRIORITY,
        })
    }

    pub fn with_key(mut self, key: KeyMaterial) -> Self {
        self.key = Some(key);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Exact paths win over wildcards.
    fn rule_for(&self, path: &str) -> Option<&StrategyMask> {
        self.rules
            .iter()
            .find(|(p, _)| !p.is_wildcard() && p.as_str() == path)
            .or_else(|| self.rules.iter().find(|(p, _)| p.matches(path)))
            .map(|(_, mask)| mask)
    }
}

impl MaskingStrategy for FieldPathStrategy {
    fn name(&self) -> &str {
        "field_path"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, _value: &Value, path: &str, _record: &Record) -> bool {
        self.rule_for(path).is_some()
    }

    fn mask(&self, value: &Value, path: &str, _record: &Record) -> Result<Value> {
        let rule = self
            .rule_for(path)
            .ok_or_else(|| RedactError::masking(path, "no rule for path"))?;
        match rule {
            StrategyMask::Remove => Ok(Value::Null),
            StrategyMask::Replace(literal) => Ok(coerce_literal(literal, value)),
            StrategyMask::RegexMask(pattern) => Ok(pattern
                .replace(&value.to_text())
                .map(Value::String)
                .unwrap_or_else(|| value.clone())),
            StrategyMask::Hash => {
                if let Value::Unsupported(resource) = value {
                    return Err(RedactError::masking(
                        path,
                        format!("cannot hash {} handle", resource.type_name),
                    ));
                }
                let key = self
                    .key
                    .as_ref()
                    .ok_or_else(|| RedactError::masking(path, "no key material"))?;
                Ok(key.hash_value(value))
            }
            StrategyMask::Unsupported => Err(RedactError::masking(
                path,
                "use_global_patterns is not available to strategies",
            )),
        }
    }

    fn validate(&self) -> bool {
        !self.rules.is_empty()
            && self.rules.iter().all(|(_, mask)| match mask {
                StrategyMask::Unsupported => false,
                StrategyMask::Hash => self.key.is_some(),
                _ => true,
            })
    }
}

impl fmt::Debug for FieldPathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPathStrategy")
            .field(
                "paths",
                &self.rules.iter().map(|(p, _)| p.as_str()).collect::<Vec<_>>(),
            )
            .field("priority", &self.priority)
            .finish()
    }
}

/// Data type masks applied to individual values.
#[derive(Debug)]
pub struct DataTypeStrategy {
    masker: DataTypeMasker,
    priority: i32,
}

impl DataTypeStrategy {
    pub const DEFAULT_PRIORITY: i32 = 40;

    pub fn new(masker: DataTypeMasker) -> Self {
        Self {
            masker,
            priority: Self::DEFAULT_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl MaskingStrategy for DataTypeStrategy {
    fn name(&self) -> &str {
        "data_type"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn should_apply(&self, value: &Value, _path: &str, _record: &Record) -> bool {
        matches!(self.masker.apply(value), DataTypeOutcome::Replaced(_))
    }

    fn mask(&self, value: &Value, _path: &str, _record: &Record) -> Result<Value> {
        Ok(match self.masker.apply(value) {
            DataTypeOutcome::Replaced(masked) => masked,
            DataTypeOutcome::Unchanged | DataTypeOutcome::Recurse => value.clone(),
        })
    }

    fn validate(&self) -> bool {
        !self.masker.is_empty()
    }
}

/// Another strategy behind record predicates.
pub struct ConditionalStrategy {
    inner: Box<dyn MaskingStrategy>,
    rules: Vec<ConditionalRule>,
    name: String,
}

impl ConditionalStrategy {
    pub fn new(inner: impl MaskingStrategy + 'static, rules: Vec<ConditionalRule>) -> Self {
        let name = format!("conditional_{}", inner.name());
        Self {
            inner: Box::new(inner),
            rules,
            name,
        }
    }

    /// Failing predicates count as unsatisfied.
    fn conditions_hold(&self, record: &Record) -> bool {
        self.rules
            .iter()
            .all(|rule| rule.evaluate(record).unwrap_or(false))
    }
}

impl MaskingStrategy for ConditionalStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.inner.priority()
    }

    fn should_apply(&self, value: &Value, path: &str, record: &Record) -> bool {
        self.conditions_hold(record) && self.inner.should_apply(value, path, record)
    }

    fn mask(&self, value: &Value, path: &str, record: &Record) -> Result<Value> {
        self.inner.mask(value, path, record)
    }

    fn validate(&self) -> bool {
        self.inner.validate()
    }
}

impl fmt::Debug for ConditionalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalStrategy")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .finish()
    }
}

fn parse_paths<S: AsRef<str>>(paths: &[S]) -> Result<Vec<FieldPath>> {
    paths.iter().map(|p| FieldPath::parse(p.as_ref())).collect()
}
