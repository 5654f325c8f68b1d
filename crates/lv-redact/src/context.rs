//! Field-path rules and callbacks over a record's context.
//!
//! Targets are resolved in this order, first claim wins per concrete path:
//! callbacks (exact paths), exact field rules, then wildcard field rules.
//! Every resolved path is reported back as processed, whether or not its
//! value changed, so later stages leave it alone.

use crate::audit::{paths, Auditor};
use crate::error::{BoxError, RedactError, Result};
use crate::field::{FieldMaskConfig, FieldRule};
use crate::hash::KeyMaterial;
use crate::path::{self, FieldPath};
use crate::pattern::{CompiledPattern, PatternRule, PatternSet, PatternValidator};
use crate::value::{Value, ValueMap};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// User function computing the masked value of one field.
pub type FieldCallback = Arc<dyn Fn(&Value) -> std::result::Result<Value, BoxError> + Send + Sync>;

#[derive(Debug)]
enum CompiledMask {
    Remove,
    Replace(String),
    RegexMask(CompiledPattern),
    UseGlobalPatterns,
    Hash,
}

enum Action<'r> {
    Callback(&'r FieldCallback),
    Mask(&'r CompiledMask),
}

/// Compiled field rules and callbacks.
#[derive(Default)]
pub(crate) struct FieldMasker {
    exact: Vec<(String, CompiledMask)>,
    wildcard: Vec<(FieldPath, CompiledMask)>,
    callbacks: Vec<(String, FieldCallback)>,
    key: Option<KeyMaterial>,
}

impl FieldMasker {
    /// Compile rules; any bad path or pattern rejects the whole set.
    pub(crate) fn compile(
        rules: &[FieldRule],
        callbacks: &[(String, FieldCallback)],
        validator: &PatternValidator,
        key: Option<KeyMaterial>,
    ) -> Result<Self> {
        let mut masker = Self {
            key,
            ..Self::default()
        };

        for rule in rules {
            let parsed = FieldPath::parse(&rule.path)?;
            let mask = match &rule.mask {
                FieldMaskConfig::Remove => CompiledMask::Remove,
                FieldMaskConfig::Replace { value } => CompiledMask::Replace(value.clone()),
                FieldMaskConfig::RegexMask {
                    pattern,
                    replacement,
                } => CompiledMask::RegexMask(
                    validator.compile_rule(&PatternRule::new(pattern, replacement))?,
                ),
                FieldMaskConfig::UseGlobalPatterns => CompiledMask::UseGlobalPatterns,
                FieldMaskConfig::Hash => {
                    if masker.key.is_none() {
                        return Err(RedactError::Key(format!(
                            "hash rule for {:?} needs key material",
                            rule.path
                        )));
                    }
                    CompiledMask::Hash
                }
            };
            if parsed.is_wildcard() {
                masker.wildcard.push((parsed, mask));
            } else {
                masker.exact.push((rule.path.clone(), mask));
            }
        }

        for (callback_path, callback) in callbacks {
            let parsed = FieldPath::parse(callback_path)?;
            if parsed.is_wildcard() {
                return Err(RedactError::InvalidFieldPath {
                    path: callback_path.clone(),
                    reason: "callbacks must be bound to an exact path".to_string(),
                });
            }
            masker.callbacks.push((callback_path.clone(), Arc::clone(callback)));
        }

        Ok(masker)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty() && self.callbacks.is_empty()
    }

    /// Apply every rule to `context`, returning the processed paths.
    pub(crate) fn apply(
        &self,
        context: &mut ValueMap,
        patterns: &PatternSet,
        auditor: &Auditor,
    ) -> HashSet<String> {
        let mut processed = HashSet::new();
        if self.is_empty() {
            return processed;
        }

        let mut removals = Vec::new();
        for (target, action) in self.targets(context) {
            let Some(original) = path::get(context, &target).cloned() else {
                continue;
            };
            if matches!(action, Action::Mask(CompiledMask::Remove))
                && in_sequence(context, &target)
            {
                removals.push((target, original));
                continue;
            }
            match action {
                Action::Callback(callback) => {
                    self.run_callback(context, &target, original, callback, auditor)
                }
                Action::Mask(mask) => {
                    self.apply_mask(context, &target, original, mask, patterns, auditor)
                }
            }
            processed.insert(target);
        }

        if !removals.is_empty() {
            remove_elements(context, &mut removals, auditor);
            let removed: Vec<&str> = removals.iter().map(|(t, _)| t.as_str()).collect();
            processed = processed
                .into_iter()
                .filter_map(|p| shift_path(&p, &removed))
                .collect();
        }

        processed
    }

    /// Concrete paths present in `context` with the action that claims them.
    fn targets(&self, context: &ValueMap) -> Vec<(String, Action<'_>)> {
        let mut claimed = HashSet::new();
        let mut targets = Vec::new();

        for (target, callback) in &self.callbacks {
            if path::contains(context, target) && claimed.insert(target.clone()) {
                targets.push((target.clone(), Action::Callback(callback)));
            }
        }
        for (target, mask) in &self.exact {
            if path::contains(context, target) && claimed.insert(target.clone()) {
                targets.push((target.clone(), Action::Mask(mask)));
            }
        }
        for (pattern, mask) in &self.wildcard {
            for target in pattern.expand(context) {
                if claimed.insert(target.clone()) {
                    targets.push((target, Action::Mask(mask)));
                }
            }
        }

        targets
    }

    fn run_callback(
        &self,
        context: &mut ValueMap,
        target: &str,
        original: Value,
        callback: &FieldCallback,
        auditor: &Auditor,
    ) {
        let outcome = match catch_unwind(AssertUnwindSafe(|| callback(&original))) {
            Ok(outcome) => outcome,
            Err(_) => Err("callback panicked".into()),
        };
        match outcome {
            Ok(masked) => {
                auditor.emit(target, &original, Some(&masked));
                path::set(context, target, masked);
            }
            Err(e) => {
                let err = RedactError::masking(target, e.to_string());
                auditor.emit_error(
                    &format!("{}{}", target, paths::CALLBACK_ERROR_SUFFIX),
                    &original,
                    &err,
                );
            }
        }
    }

    fn apply_mask(
        &self,
        context: &mut ValueMap,
        target: &str,
        original: Value,
        mask: &CompiledMask,
        patterns: &PatternSet,
        auditor: &Auditor,
    ) {
        let masked = match mask {
            CompiledMask::Remove => {
                path::remove(context, target);
                auditor.emit(target, &original, None);
                return;
            }
            CompiledMask::Replace(literal) => coerce_literal(literal, &original),
            CompiledMask::RegexMask(rule) => match rule.replace(&original.to_text()) {
                Some(replaced) => Value::String(replaced),
                None => return,
            },
            CompiledMask::UseGlobalPatterns => {
                if patterns.is_empty() {
                    let err = RedactError::masking(
                        target,
                        "use_global_patterns rule but no global patterns are configured",
                    );
                    error!(path = target, "{}", err);
                    auditor.emit_error(paths::GLOBAL_PATTERNS_ERROR, &Value::from(target), &err);
                    return;
                }
                let text = original.to_text();
                let replaced = patterns.apply(&text, auditor);
                if replaced == text {
                    return;
                }
                Value::String(replaced)
            }
            CompiledMask::Hash => match self.hash(target, &original) {
                Ok(hashed) => hashed,
                Err(err) => {
                    auditor.emit_error(target, &original, &err);
                    return;
                }
            },
        };

        auditor.emit(target, &original, Some(&masked));
        path::set(context, target, masked);
    }

    fn hash(&self, target: &str, original: &Value) -> Result<Value> {
        if let Value::Unsupported(resource) = original {
            return Err(RedactError::masking(
                target,
                format!("cannot hash {} handle", resource.type_name),
            ));
        }
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| RedactError::masking(target, "no key material"))?;
        Ok(key.hash_value(original))
    }
}

impl fmt::Debug for FieldMasker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMasker")
            .field("exact", &self.exact)
            .field("wildcard", &self.wildcard)
            .field(
                "callbacks",
                &self.callbacks.iter().map(|(p, _)| p).collect::<Vec<_>>(),
            )
            .field("key", &self.key)
            .finish()
    }
}

fn in_sequence(context: &ValueMap, target: &str) -> bool {
    target.rsplit_once('.').is_some_and(|(parent, _)| {
        matches!(path::get(context, parent), Some(Value::Sequence(_)))
    })
}

/// Delete sequence elements addressed by their original indices.
///
/// Runs highest index first and deepest first, so every earlier removal
/// leaves the remaining targets in place.
fn remove_elements(context: &mut ValueMap, removals: &mut [(String, Value)], auditor: &Auditor) {
    removals.sort_by(|a, b| compare_paths(&b.0, &a.0));
    for (target, original) in removals.iter() {
        if path::remove(context, target).is_some() {
            auditor.emit(target, original, None);
        }
    }
}

fn compare_paths(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (Some(x), Some(y)) => {
                let order = match (x.parse::<usize>(), y.parse::<usize>()) {
                    (Ok(i), Ok(j)) => i.cmp(&j),
                    _ => x.cmp(y),
                };
                if order != Ordering::Equal {
                    return order;
                }
            }
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
        }
    }
}

/// Rewrite a path given in original indices to the indices left after
/// `removed` elements are gone. `None` if the path itself was removed.
fn shift_path(path: &str, removed: &[&str]) -> Option<String> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut shifted = Vec::with_capacity(segments.len());

    for (depth, segment) in segments.iter().enumerate() {
        let Ok(index) = segment.parse::<usize>() else {
            shifted.push(segment.to_string());
            continue;
        };
        let prefix = &segments[..depth];
        let mut below = 0;
        for target in removed {
            let target: Vec<&str> = target.split('.').collect();
            let Some((last, parent)) = target.split_last() else {
                continue;
            };
            if parent != prefix {
                continue;
            }
            match last.parse::<usize>() {
                Ok(i) if i == index => return None,
                Ok(i) if i < index => below += 1,
                _ => {}
            }
        }
        shifted.push((index - below).to_string());
    }

    Some(shifted.join("."))
}

/// Parse a replacement literal back into the original value's kind when it
/// fits, otherwise keep it as a string.
pub fn coerce_literal(literal: &str, original: &Value) -> Value {
    let trimmed = literal.trim();
    match original {
        Value::Int(_) => {
            if let Ok(i) = trimmed.parse::<i64>() {
                return Value::Int(i);
            }
        }
        Value::Float(_) => {
            if let Ok(f) = trimmed.parse::<f64>() {
                if f.is_finite() {
                    return Value::Float(f);
                }
            }
        }
        Value::Bool(_) => match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        },
        _ => {}
    }
    Value::String(literal.to_string())
}
