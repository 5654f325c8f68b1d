//! Value model for log context data.
//!
//! A closed tagged union over everything a context may hold. Maps keep
//! insertion order, which matters both for processed-path tracking and for
//! deterministic output.

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::str::FromStr;

/// Opaque handle to a native resource (file handle, socket, ...).
///
/// Carried through masking untouched unless a `resource` data type mask is
/// configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Resource type name, e.g. `stream`.
    pub type_name: String,
    /// Host-assigned identifier.
    pub id: u64,
}

impl Resource {
    pub fn new(type_name: impl Into<String>, id: u64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[resource {}#{}]", self.type_name, self.id)
    }
}

/// Any leaf or container a log context may hold.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    #[default]
    Null,
    Sequence(Vec<Value>),
    Map(ValueMap),
    Unsupported(Resource),
}

/// Kind tag of a [`Value`], used to key data type masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueKind {
    String,
    Integer,
    Double,
    Boolean,
    Null,
    Array,
    Object,
    Resource,
}

impl ValueKind {
    /// All kinds, in canonical order.
    pub const ALL: [ValueKind; 8] = [
        ValueKind::String,
        ValueKind::Integer,
        ValueKind::Double,
        ValueKind::Boolean,
        ValueKind::Null,
        ValueKind::Array,
        ValueKind::Object,
        ValueKind::Resource,
    ];

    /// Canonical name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Double => "double",
            ValueKind::Boolean => "boolean",
            ValueKind::Null => "null",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
            ValueKind::Resource => "resource",
        }
    }

    /// Whether values of this kind hold children.
    pub fn is_container(&self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Object)
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(ValueKind::String),
            "integer" | "int" => Ok(ValueKind::Integer),
            "double" | "float" => Ok(ValueKind::Double),
            "boolean" | "bool" => Ok(ValueKind::Boolean),
            "null" | "NULL" => Ok(ValueKind::Null),
            "array" => Ok(ValueKind::Array),
            "object" => Ok(ValueKind::Object),
            "resource" => Ok(ValueKind::Resource),
            _ => Err(format!("unknown value kind: {}", s)),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::String,
            Value::Int(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Double,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Null => ValueKind::Null,
            Value::Sequence(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Object,
            Value::Unsupported(_) => ValueKind::Resource,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::Sequence(_) | Value::Map(_))
    }

    /// Number of direct children of a container, zero for leaves.
    pub fn len(&self) -> usize {
        match self {
            Value::Sequence(items) => items.len(),
            Value::Map(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the value as plain text.
    ///
    /// Containers render as compact JSON, `Null` as the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            Value::Sequence(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
            Value::Unsupported(resource) => resource.to_string(),
        }
    }

    /// Parse JSON text into a value, keeping object key order.
    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as compact JSON.
    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Sequence(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Sequence(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// String-keyed map that preserves insertion order.
///
/// Replacing an existing key keeps its original position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValueMap {
    entries: Vec<(String, Value)>,
}

impl ValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a key, keeping the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.entries.iter_mut().map(|(k, v)| (&*k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub(crate) fn into_entries(self) -> Vec<(String, Value)> {
        self.entries
    }

    pub(crate) fn from_entries(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut map = ValueMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for ValueMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Null => serializer.serialize_unit(),
            Value::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => map.serialize(serializer),
            Value::Unsupported(resource) => serializer.serialize_str(&resource.to_string()),
        }
    }
}

impl Serialize for ValueMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON-compatible value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Int))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        Deserialize::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Value, A::Error> {
        let mut map = ValueMap::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            map.insert(k, v);
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        d.deserialize_any(ValueVisitor)
    }
}

impl<'de> Deserialize<'de> for ValueMap {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        match Value::deserialize(d)? {
            Value::Map(map) => Ok(map),
            other => Err(de::Error::custom(format!(
                "expected an object, found {}",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_and_aliases() {
        for kind in ValueKind::ALL {
            assert_eq!(kind.as_str().parse::<ValueKind>().unwrap(), kind);
        }
        assert_eq!("int".parse::<ValueKind>().unwrap(), ValueKind::Integer);
        assert_eq!("NULL".parse::<ValueKind>().unwrap(), ValueKind::Null);
        assert!("callable".parse::<ValueKind>().is_err());
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let mut map = ValueMap::new();
        map.insert("zeta", Value::Int(1));
        map.insert("alpha", Value::Int(2));
        map.insert("mid", Value::Int(3));
        map.insert("zeta", Value::Int(4));

        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
        assert_eq!(map.get("zeta"), Some(&Value::Int(4)));

        map.remove("alpha");
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["zeta", "mid"]);
    }

    #[test]
    fn test_json_keeps_key_order() {
        let value = Value::from_json_str(r#"{"b":1,"a":{"z":true,"y":null},"c":[1,2.5,"x"]}"#)
            .unwrap();
        assert_eq!(
            value.to_json_string().unwrap(),
            r#"{"b":1,"a":{"z":true,"y":null},"c":[1,2.5,"x"]}"#
        );
    }

    #[test]
    fn test_empty_containers_are_distinct() {
        let value = Value::from_json_str(r#"{"o":{},"a":[]}"#).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.get("o"), Some(&Value::Map(ValueMap::new())));
        assert_eq!(map.get("a"), Some(&Value::Sequence(Vec::new())));
        assert_eq!(value.to_json_string().unwrap(), r#"{"o":{},"a":[]}"#);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Int(42).to_text(), "42");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(
            Value::Sequence(vec![Value::Int(1), Value::from("a")]).to_text(),
            r#"[1,"a"]"#
        );
        assert_eq!(
            Value::Unsupported(Resource::new("stream", 3)).to_text(),
            "[resource stream#3]"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let value = Value::from(serde_json::json!({"n": 1, "f": 1.5, "s": "x"}));
        let map = value.as_map().unwrap();
        assert_eq!(map.get("n"), Some(&Value::Int(1)));
        assert_eq!(map.get("f"), Some(&Value::Float(1.5)));
        assert_eq!(map.get("s"), Some(&Value::from("x")));
    }
}
