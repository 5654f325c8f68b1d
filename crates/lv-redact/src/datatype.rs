//! Masking by value kind.
//!
//! Each configured kind carries a mask string. The mask is parsed the
//! first time a value of that kind is seen and the parsed form is reused
//! afterwards. Parsing is type-directed:
//!
//! | kind             | mask                          | result                         |
//! |------------------|-------------------------------|--------------------------------|
//! | integer / double | numeric                       | number in the original kind    |
//! | boolean          | `preserve` / `true` / `false` | original / coerced             |
//! | null             | empty                         | null                           |
//! | array            | `[]`, JSON array, `a,b,c`     | substituted sequence           |
//! | object           | `{}`, JSON object             | substituted map                |
//! | array / object   | `recursive`                   | descend into children          |
//! | any              | anything else                 | the mask as a string (arrays   |
//! |                  |                               | and objects wrap it)           |

use crate::error::{RedactError, Result};
use crate::value::{Value, ValueKind, ValueMap};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Sentinel: keep the original boolean.
pub const PRESERVE: &str = "preserve";
/// Sentinel: descend into the container instead of replacing it.
pub const RECURSIVE: &str = "recursive";
/// Key used when an object mask falls back to a wrapper map.
pub const OBJECT_FALLBACK_KEY: &str = "masked";

#[derive(Debug, Clone, PartialEq)]
enum MaskSpec {
    Fixed(Value),
    Preserve,
    Recursive,
}

#[derive(Debug)]
struct KindMask {
    spec: String,
    parsed: OnceLock<MaskSpec>,
}

impl KindMask {
    fn new(spec: String) -> Self {
        Self {
            spec,
            parsed: OnceLock::new(),
        }
    }

    fn parsed(&self, kind: ValueKind) -> &MaskSpec {
        self.parsed.get_or_init(|| parse_spec(kind, &self.spec))
    }
}

impl Clone for KindMask {
    fn clone(&self) -> Self {
        Self::new(self.spec.clone())
    }
}

/// Result of applying a data type mask.
#[derive(Debug, Clone, PartialEq)]
pub enum DataTypeOutcome {
    /// No mask for this kind, or the mask keeps the original.
    Unchanged,
    /// Use this value instead.
    Replaced(Value),
    /// The container should be masked element by element.
    Recurse,
}

/// Per-kind mask table.
#[derive(Debug, Clone, Default)]
pub struct DataTypeMasker {
    masks: BTreeMap<ValueKind, KindMask>,
}

impl DataTypeMasker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(kind name, spec)` pairs. Unknown kind names are rejected.
    pub fn from_specs<I, K, S>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, S)>,
        K: AsRef<str>,
        S: Into<String>,
    {
        let mut masker = Self::new();
        for (kind, spec) in specs {
            let kind_name = kind.as_ref();
            let parsed = kind_name
                .parse::<ValueKind>()
                .map_err(|reason| RedactError::InvalidDataTypeMask {
                    kind: kind_name.to_string(),
                    reason,
                })?;
            masker.masks.insert(parsed, KindMask::new(spec.into()));
        }
        Ok(masker)
    }

    pub fn with_mask(mut self, kind: ValueKind, spec: impl Into<String>) -> Self {
        self.masks.insert(kind, KindMask::new(spec.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn has_mask(&self, kind: ValueKind) -> bool {
        self.masks.contains_key(&kind)
    }

    /// Raw spec configured for a kind.
    pub fn spec(&self, kind: ValueKind) -> Option<&str> {
        self.masks.get(&kind).map(|m| m.spec.as_str())
    }

    /// Apply the mask configured for the value's kind.
    pub fn apply(&self, value: &Value) -> DataTypeOutcome {
        let kind = value.kind();
        let Some(mask) = self.masks.get(&kind) else {
            return DataTypeOutcome::Unchanged;
        };
        match mask.parsed(kind) {
            MaskSpec::Fixed(replacement) => DataTypeOutcome::Replaced(replacement.clone()),
            MaskSpec::Preserve => DataTypeOutcome::Unchanged,
            MaskSpec::Recursive => DataTypeOutcome::Recurse,
        }
    }
}

fn parse_spec(kind: ValueKind, spec: &str) -> MaskSpec {
    let text = || MaskSpec::Fixed(Value::String(spec.to_string()));
    match kind {
        ValueKind::Integer => {
            let trimmed = spec.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                MaskSpec::Fixed(Value::Int(i))
            } else if let Some(f) = parse_finite(trimmed) {
                MaskSpec::Fixed(Value::Int(f as i64))
            } else {
                text()
            }
        }
        ValueKind::Double => match parse_finite(spec.trim()) {
            Some(f) => MaskSpec::Fixed(Value::Float(f)),
            None => text(),
        },
        ValueKind::Boolean => match spec.trim().to_ascii_lowercase().as_str() {
            PRESERVE => MaskSpec::Preserve,
            "true" => MaskSpec::Fixed(Value::Bool(true)),
            "false" => MaskSpec::Fixed(Value::Bool(false)),
            _ => text(),
        },
        ValueKind::Null => {
            if spec.is_empty() {
                MaskSpec::Fixed(Value::Null)
            } else {
                text()
            }
        }
        ValueKind::Array => parse_array_spec(spec),
        ValueKind::Object => parse_object_spec(spec),
        ValueKind::String | ValueKind::Resource => text(),
    }
}

fn parse_finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn parse_array_spec(spec: &str) -> MaskSpec {
    let trimmed = spec.trim();
    if trimmed == RECURSIVE {
        return MaskSpec::Recursive;
    }
    if trimmed == "[]" {
        return MaskSpec::Fixed(Value::Sequence(Vec::new()));
    }
    if trimmed.starts_with('[') {
        if let Ok(parsed @ Value::Sequence(_)) = Value::from_json_str(trimmed) {
            return MaskSpec::Fixed(parsed);
        }
    }
    if trimmed.contains(',') {
        let items = trimmed
            .split(',')
            .map(|item| Value::String(item.trim().to_string()))
            .collect();
        return MaskSpec::Fixed(Value::Sequence(items));
    }
    MaskSpec::Fixed(Value::Sequence(vec![Value::String(spec.to_string())]))
}

fn parse_object_spec(spec: &str) -> MaskSpec {
    let trimmed = spec.trim();
    if trimmed == RECURSIVE {
        return MaskSpec::Recursive;
    }
    if trimmed == "{}" {
        return MaskSpec::Fixed(Value::Map(ValueMap::new()));
    }
    if trimmed.starts_with('{') {
        if let Ok(parsed @ Value::Map(_)) = Value::from_json_str(trimmed) {
            return MaskSpec::Fixed(parsed);
        }
    }
    let mut wrapper = ValueMap::with_capacity(1);
    wrapper.insert(OBJECT_FALLBACK_KEY, Value::String(spec.to_string()));
    MaskSpec::Fixed(Value::Map(wrapper))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masker(kind: &str, spec: &str) -> DataTypeMasker {
        DataTypeMasker::from_specs([(kind, spec)]).unwrap()
    }

    fn replaced(masker: &DataTypeMasker, value: Value) -> Value {
        match masker.apply(&value) {
            DataTypeOutcome::Replaced(v) => v,
            other => panic!("expected replacement, got {:?}", other),
        }
    }

    #[test]
    fn test_integer_keeps_kind() {
        let m = masker("integer", "0");
        assert_eq!(replaced(&m, Value::Int(42)), Value::Int(0));
        assert_eq!(replaced(&masker("int", "7.9"), Value::Int(1)), Value::Int(7));
        assert_eq!(
            replaced(&masker("integer", "***"), Value::Int(1)),
            Value::from("***")
        );
        // Other kinds pass through
        assert_eq!(m.apply(&Value::Float(1.5)), DataTypeOutcome::Unchanged);
    }

    #[test]
    fn test_double() {
        assert_eq!(replaced(&masker("double", "0.0"), Value::Float(3.2)), Value::Float(0.0));
        assert_eq!(replaced(&masker("float", "-1"), Value::Float(3.2)), Value::Float(-1.0));
        assert_eq!(replaced(&masker("double", "NaN"), Value::Float(3.2)), Value::from("NaN"));
    }

    #[test]
    fn test_boolean() {
        assert_eq!(masker("boolean", "preserve").apply(&Value::Bool(true)), DataTypeOutcome::Unchanged);
        assert_eq!(replaced(&masker("bool", "false"), Value::Bool(true)), Value::Bool(false));
        assert_eq!(replaced(&masker("boolean", "TRUE"), Value::Bool(false)), Value::Bool(true));
        assert_eq!(replaced(&masker("boolean", "hidden"), Value::Bool(true)), Value::from("hidden"));
    }

    #[test]
    fn test_null() {
        assert_eq!(replaced(&masker("null", ""), Value::Null), Value::Null);
        assert_eq!(replaced(&masker("NULL", "none"), Value::Null), Value::from("none"));
    }

    #[test]
    fn test_array_specs() {
        let input = Value::Sequence(vec![Value::from("a")]);
        assert_eq!(replaced(&masker("array", "[]"), input.clone()), Value::Sequence(vec![]));
        assert_eq!(
            replaced(&masker("array", "[1, \"x\"]"), input.clone()),
            Value::Sequence(vec![Value::Int(1), Value::from("x")])
        );
        assert_eq!(
            replaced(&masker("array", "a, b"), input.clone()),
            Value::Sequence(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            replaced(&masker("array", "***"), input.clone()),
            Value::Sequence(vec![Value::from("***")])
        );
        assert_eq!(masker("array", "recursive").apply(&input), DataTypeOutcome::Recurse);
    }

    #[test]
    fn test_object_specs() {
        let mut map = ValueMap::new();
        map.insert("k", Value::from("v"));
        let input = Value::Map(map);

        assert_eq!(replaced(&masker("object", "{}"), input.clone()), Value::Map(ValueMap::new()));

        let parsed = replaced(&masker("object", r#"{"redacted": true}"#), input.clone());
        assert_eq!(
            parsed.as_map().and_then(|m| m.get("redacted")),
            Some(&Value::Bool(true))
        );

        let wrapped = replaced(&masker("object", "***"), input.clone());
        assert_eq!(
            wrapped.as_map().and_then(|m| m.get("masked")),
            Some(&Value::from("***"))
        );
        assert_eq!(masker("object", "recursive").apply(&input), DataTypeOutcome::Recurse);
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = DataTypeMasker::from_specs([("widget", "x")]).unwrap_err();
        assert!(matches!(err, RedactError::InvalidDataTypeMask { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_spec_parsed_once() {
        let m = masker("string", "[redacted]");
        let mask = &m.masks[&ValueKind::String];
        assert!(mask.parsed.get().is_none());
        m.apply(&Value::from("a"));
        assert!(mask.parsed.get().is_some());
        assert_eq!(m.spec(ValueKind::String), Some("[redacted]"));
    }
}
