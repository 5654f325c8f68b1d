//! Ordered strategy collection.

use super::MaskingStrategy;
use crate::error::{RedactError, Result};
use crate::record::Record;
use crate::recursive::{child_path, MAX_MAX_DEPTH};
use crate::value::{Value, ValueMap};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

/// Summary of registered strategies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyStats {
    pub total: usize,
    /// Strategy names, highest priority first.
    pub order: Vec<String>,
    /// Counts per priority band (`high`, `medium`, `low`).
    pub bands: BTreeMap<&'static str, usize>,
}

fn band(priority: i32) -> &'static str {
    match priority {
        p if p >= 80 => "high",
        p if p >= 50 => "medium",
        _ => "low",
    }
}

/// Strategies ordered by descending priority.
///
/// The sorted view is computed on first use and dropped whenever the
/// collection changes. Ties keep registration order.
#[derive(Default)]
pub struct StrategyManager {
    strategies: Vec<Arc<dyn MaskingStrategy>>,
    sorted: OnceLock<Vec<Arc<dyn MaskingStrategy>>>,
}

impl StrategyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy; it must pass its own `validate`.
    pub fn add(&mut self, strategy: impl MaskingStrategy + 'static) -> Result<()> {
        self.add_arc(Arc::new(strategy))
    }

    pub fn add_arc(&mut self, strategy: Arc<dyn MaskingStrategy>) -> Result<()> {
        if !strategy.validate() {
            return Err(RedactError::InvalidStrategy {
                name: strategy.name().to_string(),
            });
        }
        self.strategies.push(strategy);
        self.sorted = OnceLock::new();
        Ok(())
    }

    /// Remove every strategy with this name.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.strategies.len();
        self.strategies.retain(|s| s.name() != name);
        let removed = self.strategies.len() != before;
        if removed {
            self.sorted = OnceLock::new();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.strategies.clear();
        self.sorted = OnceLock::new();
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategies, highest priority first.
    pub fn sorted(&self) -> &[Arc<dyn MaskingStrategy>] {
        self.sorted.get_or_init(|| {
            let mut sorted = self.strategies.clone();
            sorted.sort_by_key(|s| std::cmp::Reverse(s.priority()));
            sorted
        })
    }

    /// Strategies that want this value, in application order.
    pub fn applicable(
        &self,
        value: &Value,
        path: &str,
        record: &Record,
    ) -> Vec<Arc<dyn MaskingStrategy>> {
        self.sorted()
            .iter()
            .filter(|s| s.should_apply(value, path, record))
            .cloned()
            .collect()
    }

    /// Mask with the first applicable strategy; unchanged when none applies.
    pub fn mask_value(&self, value: &Value, path: &str, record: &Record) -> Result<Value> {
        let Some(strategy) = self
            .sorted()
            .iter()
            .find(|s| s.should_apply(value, path, record))
        else {
            return Ok(value.clone());
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| strategy.mask(value, path, record)))
            .unwrap_or_else(|_| Err(RedactError::masking(path, "strategy panicked")));
        outcome.map_err(|e| RedactError::Strategy {
            strategy: strategy.name().to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    /// Walk a context map, offering every value to the strategies.
    ///
    /// A value claimed by a strategy is replaced as a whole; unclaimed
    /// containers are descended into.
    pub fn mask_context(&self, context: &ValueMap, record: &Record) -> Result<ValueMap> {
        self.mask_map(context, "", record, 0)
    }

    fn mask_map(&self, map: &ValueMap, path: &str, record: &Record, depth: usize) -> Result<ValueMap> {
        map.iter()
            .map(|(key, value)| -> Result<(String, Value)> {
                let masked = self.mask_node(value, &child_path(path, key), record, depth + 1)?;
                Ok((key.clone(), masked))
            })
            .collect()
    }

    fn mask_node(&self, value: &Value, path: &str, record: &Record, depth: usize) -> Result<Value> {
        if self.sorted().iter().any(|s| s.should_apply(value, path, record)) {
            return self.mask_value(value, path, record);
        }
        if depth >= MAX_MAX_DEPTH {
            return Ok(value.clone());
        }
        match value {
            Value::Map(map) => Ok(Value::Map(self.mask_map(map, path, record, depth)?)),
            Value::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.mask_node(item, &child_path(path, &i.to_string()), record, depth + 1))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
            leaf => Ok(leaf.clone()),
        }
    }

    pub fn stats(&self) -> StrategyStats {
        let mut bands = BTreeMap::from([("high", 0), ("medium", 0), ("low", 0)]);
        for strategy in &self.strategies {
            *bands.entry(band(strategy.priority())).or_default() += 1;
        }
        StrategyStats {
            total: self.strategies.len(),
            order: self.sorted().iter().map(|s| s.name().to_string()).collect(),
            bands,
        }
    }
}

impl fmt::Debug for StrategyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyManager")
            .field(
                "strategies",
                &self
                    .strategies
                    .iter()
                    .map(|s| (s.name().to_string(), s.priority()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::DataTypeMasker;
    use crate::field::{FieldMaskConfig, FieldRule};
    use crate::pattern::PatternRule;
    use crate::record::Level;
    use crate::strategy::{DataTypeStrategy, FieldPathStrategy, RegexStrategy};

    struct Fixed {
        name: &'static str,
        priority: i32,
        valid: bool,
    }

    impl MaskingStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn should_apply(&self, _: &Value, _: &str, _: &Record) -> bool {
            true
        }
        fn mask(&self, _: &Value, path: &str, _: &Record) -> Result<Value> {
            if self.name == "broken" {
                return Err(RedactError::masking(path, "nope"));
            }
            Ok(Value::from(self.name))
        }
        fn validate(&self) -> bool {
            self.valid
        }
    }

    fn fixed(name: &'static str, priority: i32) -> Fixed {
        Fixed {
            name,
            priority,
            valid: true,
        }
    }

    fn record() -> Record {
        Record::new("app", Level::Info, "msg")
    }

    #[test]
    fn test_first_applicable_by_priority_wins() {
        let mut manager = StrategyManager::new();
        manager.add(fixed("low", 10)).unwrap();
        manager.add(fixed("high", 90)).unwrap();
        manager.add(fixed("mid", 50)).unwrap();

        let names: Vec<&str> = manager.sorted().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["high", "mid", "low"]);
        assert_eq!(
            manager.mask_value(&Value::Int(1), "x", &record()).unwrap(),
            Value::from("high")
        );
        assert_eq!(manager.applicable(&Value::Int(1), "x", &record()).len(), 3);
    }

    #[test]
    fn test_sorted_view_invalidated_on_mutation() {
        let mut manager = StrategyManager::new();
        manager.add(fixed("a", 10)).unwrap();
        assert_eq!(manager.sorted().len(), 1);

        manager.add(fixed("b", 20)).unwrap();
        assert_eq!(manager.sorted()[0].name(), "b");

        assert!(manager.remove("b"));
        assert!(!manager.remove("b"));
        assert_eq!(manager.sorted()[0].name(), "a");

        manager.clear();
        assert!(manager.sorted().is_empty());
    }

    #[test]
    fn test_invalid_strategy_rejected() {
        let mut manager = StrategyManager::new();
        let err = manager
            .add(Fixed {
                name: "bad",
                priority: 1,
                valid: false,
            })
            .unwrap_err();
        assert!(matches!(err, RedactError::InvalidStrategy { ref name } if name == "bad"));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_failure_names_strategy_and_path() {
        let mut manager = StrategyManager::new();
        manager.add(fixed("broken", 10)).unwrap();
        let err = manager.mask_value(&Value::Null, "user.email", &record()).unwrap_err();
        match err {
            RedactError::Strategy { strategy, path, .. } => {
                assert_eq!(strategy, "broken");
                assert_eq!(path, "user.email");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_no_strategy_leaves_value() {
        let manager = StrategyManager::new();
        assert_eq!(
            manager.mask_value(&Value::from("x"), "p", &record()).unwrap(),
            Value::from("x")
        );
    }

    #[test]
    fn test_mask_context_with_builtins() {
        let mut manager = StrategyManager::new();
        manager
            .add(FieldPathStrategy::new(&[FieldRule::new("user.password", FieldMaskConfig::replace("***"))]).unwrap())
            .unwrap();
        manager
            .add(RegexStrategy::new(&[PatternRule::new(r"/\d{3}-\d{2}-\d{4}/", "***SSN***")]).unwrap())
            .unwrap();
        manager
            .add(DataTypeStrategy::new(DataTypeMasker::from_specs([("integer", "0")]).unwrap()))
            .unwrap();

        let context = match Value::from_json_str(
            r#"{"user": {"password": "pw", "ssn": "123-45-6789", "age": 40}, "tags": ["123-45-6789", "ok"]}"#,
        )
        .unwrap()
        {
            Value::Map(map) => map,
            other => panic!("expected map, got {:?}", other),
        };

        let masked = manager.mask_context(&context, &record()).unwrap();
        let expected = Value::from_json_str(
            r#"{"user": {"password": "***", "ssn": "***SSN***", "age": 0}, "tags": ["***SSN***", "ok"]}"#,
        )
        .unwrap();
        assert_eq!(Value::Map(masked), expected);

        let stats = manager.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.order, vec!["field_path", "regex", "data_type"]);
        assert_eq!(stats.bands["high"], 1);
        assert_eq!(stats.bands["medium"], 1);
        assert_eq!(stats.bands["low"], 1);
    }
}
