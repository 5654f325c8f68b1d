//! Record-level gate deciding whether masking runs at all.
//!
//! All rules must hold for masking to proceed. The first rule returning
//! `false` stops evaluation and the record passes through untouched. A rule
//! that errors or panics is resolved by [`OnPredicateError`].

use crate::audit::{paths, Auditor};
use crate::error::{sanitize_error_message, BoxError};
use crate::record::Record;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

type Predicate = dyn Fn(&Record) -> Result<bool, BoxError> + Send + Sync;

/// A named predicate over a record.
#[derive(Clone)]
pub struct ConditionalRule {
    name: String,
    predicate: Arc<Predicate>,
}

impl ConditionalRule {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        Self::fallible(name, move |record| Ok(predicate(record)))
    }

    /// A predicate that can report an error instead of an answer.
    pub fn fallible<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate, turning a panic into an error.
    pub fn evaluate(&self, record: &Record) -> Result<bool, BoxError> {
        match catch_unwind(AssertUnwindSafe(|| (self.predicate)(record))) {
            Ok(outcome) => outcome,
            Err(_) => Err(format!("conditional rule {:?} panicked", self.name).into()),
        }
    }
}

impl fmt::Debug for ConditionalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// What a failing predicate means for the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnPredicateError {
    /// Treat the rule as satisfied; masking proceeds.
    #[default]
    Mask,
    /// Treat the rule as unsatisfied; the record passes through unmasked.
    Skip,
}

/// Gate verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Skip { rule: String },
}

/// AND-combined rule set.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConditionalGate {
    rules: Vec<ConditionalRule>,
    on_error: OnPredicateError,
}

impl ConditionalGate {
    pub(crate) fn new(rules: Vec<ConditionalRule>, on_error: OnPredicateError) -> Self {
        Self { rules, on_error }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn evaluate(&self, record: &Record, auditor: &Auditor) -> GateDecision {
        for rule in &self.rules {
            let satisfied = match rule.evaluate(record) {
                Ok(satisfied) => satisfied,
                Err(e) => {
                    let message = sanitize_error_message(&e.to_string());
                    warn!(rule = rule.name(), error = %message, policy = ?self.on_error, "conditional rule failed");
                    auditor.emit(
                        paths::CONDITIONAL_ERROR,
                        &Value::from(rule.name()),
                        Some(&Value::String(message)),
                    );
                    self.on_error == OnPredicateError::Mask
                }
            };

            if !satisfied {
                auditor.emit(paths::CONDITIONAL_SKIP, &Value::from(rule.name()), None);
                return GateDecision::Skip {
                    rule: rule.name().to_string(),
                };
            }
        }
        GateDecision::Proceed
    }
}

/// Ready-made rules.
pub mod rules {
    use super::ConditionalRule;
    use crate::path;
    use crate::record::Level;
    use crate::value::Value;
    use std::collections::HashSet;

    /// Records at `level` or more severe.
    pub fn level_at_least(level: Level) -> ConditionalRule {
        ConditionalRule::new(format!("level_at_least_{}", level), move |record| {
            record.level >= level
        })
    }

    /// Records whose level is one of `levels`.
    pub fn level_in(levels: impl IntoIterator<Item = Level>) -> ConditionalRule {
        let levels: Vec<Level> = levels.into_iter().collect();
        let name = format!(
            "level_in_{}",
            levels
                .iter()
                .map(Level::to_string)
                .collect::<Vec<_>>()
                .join("_")
        );
        ConditionalRule::new(name, move |record| levels.contains(&record.level))
    }

    /// Records logged on one of `channels`.
    pub fn channel_in<S: Into<String>>(channels: impl IntoIterator<Item = S>) -> ConditionalRule {
        let channels: HashSet<String> = channels.into_iter().map(Into::into).collect();
        ConditionalRule::new("channel_in", move |record| channels.contains(&record.channel))
    }

    /// Records whose context has a value at `field`.
    pub fn context_field_present(field: impl Into<String>) -> ConditionalRule {
        let field = field.into();
        ConditionalRule::new(format!("context_has_{}", field), move |record| {
            path::contains(&record.context, &field)
        })
    }

    /// Records whose context holds `expected` at `field`.
    pub fn context_field_equals(field: impl Into<String>, expected: Value) -> ConditionalRule {
        let field = field.into();
        ConditionalRule::new(format!("context_{}_equals", field), move |record| {
            path::get(&record.context, &field) == Some(&expected)
        })
    }
}
