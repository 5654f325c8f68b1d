//! Dot-path addressing into nested context values.
//!
//! A path such as `user.address.city` walks map keys; numeric segments also
//! index into sequences (`items.0.sku`). A `*` segment matches exactly one
//! segment of any name, so `users.*.email` matches `users.0.email` and
//! `users.bob.email` but not `users.email` or `users.a.b.email`.

use crate::error::{RedactError, Result};
use crate::value::{Value, ValueMap};
use std::fmt;

/// Wildcard segment.
pub const WILDCARD: &str = "*";

/// One path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Any,
}

impl Segment {
    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Key(key) => key == name,
            Segment::Any => true,
        }
    }
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    /// Parse a dot path. Empty paths and empty segments are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| RedactError::InvalidFieldPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let segments = path
            .split('.')
            .map(|segment| match segment {
                "" => Err(invalid("path has an empty segment")),
                WILDCARD => Ok(Segment::Any),
                key => Ok(Segment::Key(key.to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_wildcard(&self) -> bool {
        self.segments.iter().any(|s| *s == Segment::Any)
    }

    /// Whether a concrete dot path matches this path segment for segment.
    pub fn matches(&self, concrete: &str) -> bool {
        let mut parts = concrete.split('.');
        for segment in &self.segments {
            match parts.next() {
                Some(part) if segment.matches(part) => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }

    /// Concrete paths present in `map` that this path matches, in the map's
    /// iteration order.
    pub fn expand(&self, map: &ValueMap) -> Vec<String> {
        let mut found = Vec::new();
        let mut prefix = Vec::with_capacity(self.segments.len());
        expand_map(map, &self.segments, &mut prefix, &mut found);
        found
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for FieldPath {
    type Err = RedactError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn expand_map(map: &ValueMap, rest: &[Segment], prefix: &mut Vec<String>, found: &mut Vec<String>) {
    let Some((head, tail)) = rest.split_first() else {
        return;
    };
    match head {
        Segment::Key(key) => {
            if let Some(child) = map.get(key) {
                descend(key.clone(), child, tail, prefix, found);
            }
        }
        Segment::Any => {
            for (key, child) in map.iter() {
                descend(key.clone(), child, tail, prefix, found);
            }
        }
    }
}

fn expand_sequence(
    items: &[Value],
    rest: &[Segment],
    prefix: &mut Vec<String>,
    found: &mut Vec<String>,
) {
    let Some((head, tail)) = rest.split_first() else {
        return;
    };
    match head {
        Segment::Key(key) => {
            if let Some(child) = key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                descend(key.clone(), child, tail, prefix, found);
            }
        }
        Segment::Any => {
            for (i, child) in items.iter().enumerate() {
                descend(i.to_string(), child, tail, prefix, found);
            }
        }
    }
}

fn descend(
    name: String,
    child: &Value,
    tail: &[Segment],
    prefix: &mut Vec<String>,
    found: &mut Vec<String>,
) {
    prefix.push(name);
    if tail.is_empty() {
        found.push(prefix.join("."));
    } else {
        match child {
            Value::Map(map) => expand_map(map, tail, prefix, found),
            Value::Sequence(items) => expand_sequence(items, tail, prefix, found),
            _ => {}
        }
    }
    prefix.pop();
}

fn child<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Map(map) => map.get(segment),
        Value::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'a>(value: &'a mut Value, segment: &str) -> Option<&'a mut Value> {
    match value {
        Value::Map(map) => map.get_mut(segment),
        Value::Sequence(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(move |i| items.get_mut(i)),
        _ => None,
    }
}

/// Resolve a concrete dot path.
pub fn get<'a>(map: &'a ValueMap, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = child(current, part)?;
    }
    Some(current)
}

/// Resolve a concrete dot path mutably.
pub fn get_mut<'a>(map: &'a mut ValueMap, path: &str) -> Option<&'a mut Value> {
    let mut parts = path.split('.');
    let mut current = map.get_mut(parts.next()?)?;
    for part in parts {
        current = child_mut(current, part)?;
    }
    Some(current)
}

/// Whether a concrete dot path resolves.
pub fn contains(map: &ValueMap, path: &str) -> bool {
    get(map, path).is_some()
}

/// Write a value at a concrete dot path.
///
/// Missing intermediate maps are created. Returns `false` when the path runs
/// through a leaf or past the end of a sequence.
pub fn set(map: &mut ValueMap, path: &str, value: Value) -> bool {
    let (parent_path, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (Some(parent), last),
        None => (None, path),
    };

    let Some(parent_path) = parent_path else {
        map.insert(last, value);
        return true;
    };

    let mut parts = parent_path.split('.');
    let Some(first) = parts.next() else {
        return false;
    };
    if !map.contains_key(first) {
        map.insert(first, Value::Map(ValueMap::new()));
    }
    let Some(mut current) = map.get_mut(first) else {
        return false;
    };
    for part in parts {
        if let Value::Map(inner) = current {
            if !inner.contains_key(part) {
                inner.insert(part, Value::Map(ValueMap::new()));
            }
        }
        current = match child_mut(current, part) {
            Some(next) => next,
            None => return false,
        };
    }

    match current {
        Value::Map(inner) => {
            inner.insert(last, value);
            true
        }
        Value::Sequence(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        },
        _ => false,
    }
}

/// Remove the value at a concrete dot path.
///
/// Removing a sequence element shifts later elements down.
pub fn remove(map: &mut ValueMap, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => map.remove(path),
        Some((parent, last)) => match get_mut(map, parent)? {
            Value::Map(inner) => inner.remove(last),
            Value::Sequence(items) => {
                let index = last.parse::<usize>().ok()?;
                (index < items.len()).then(|| items.remove(index))
            }
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ValueMap {
        let json = r#"{
            "user": {"name": "Bob", "password": "secret"},
            "users": [
                {"email": "a@example.com"},
                {"email": "b@example.com", "phone": "123"}
            ],
            "teams": {"red": {"lead": "x"}, "blue": {"lead": "y"}}
        }"#;
        match Value::from_json_str(json).unwrap() {
            Value::Map(map) => map,
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(FieldPath::parse("").is_err());
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.*.b").unwrap().is_wildcard());
        assert!(!FieldPath::parse("a.b").unwrap().is_wildcard());
    }

    #[test]
    fn test_wildcard_matches_exactly_one_segment() {
        let path = FieldPath::parse("users.*.email").unwrap();
        assert!(path.matches("users.0.email"));
        assert!(path.matches("users.bob.email"));
        assert!(!path.matches("users.email"));
        assert!(!path.matches("users.a.b.email"));

        let path = FieldPath::parse("*.*").unwrap();
        assert!(path.matches("a.b"));
        assert!(!path.matches("a"));
    }

    #[test]
    fn test_get_through_maps_and_sequences() {
        let ctx = context();
        assert_eq!(get(&ctx, "user.name"), Some(&Value::from("Bob")));
        assert_eq!(get(&ctx, "users.1.phone"), Some(&Value::from("123")));
        assert_eq!(get(&ctx, "users.5.phone"), None);
        assert_eq!(get(&ctx, "user.name.first"), None);
        assert!(contains(&ctx, "teams.red.lead"));
    }

    #[test]
    fn test_expand_in_order() {
        let ctx = context();
        let path = FieldPath::parse("users.*.email").unwrap();
        assert_eq!(path.expand(&ctx), vec!["users.0.email", "users.1.email"]);

        let path = FieldPath::parse("teams.*.lead").unwrap();
        assert_eq!(path.expand(&ctx), vec!["teams.red.lead", "teams.blue.lead"]);

        let path = FieldPath::parse("user.password").unwrap();
        assert_eq!(path.expand(&ctx), vec!["user.password"]);

        let path = FieldPath::parse("user.missing").unwrap();
        assert!(path.expand(&ctx).is_empty());
    }

    #[test]
    fn test_set_creates_intermediate_maps() {
        let mut ctx = context();
        assert!(set(&mut ctx, "user.name", Value::from("Alice")));
        assert_eq!(get(&ctx, "user.name"), Some(&Value::from("Alice")));

        assert!(set(&mut ctx, "meta.trace.id", Value::Int(7)));
        assert_eq!(get(&ctx, "meta.trace.id"), Some(&Value::Int(7)));

        assert!(set(&mut ctx, "users.0.email", Value::Null));
        assert_eq!(get(&ctx, "users.0.email"), Some(&Value::Null));

        // Cannot descend through a leaf or past a sequence end
        assert!(!set(&mut ctx, "user.name.first", Value::Null));
        assert!(!set(&mut ctx, "users.9", Value::Null));
    }

    #[test]
    fn test_remove() {
        let mut ctx = context();
        assert_eq!(remove(&mut ctx, "user.password"), Some(Value::from("secret")));
        assert!(!contains(&ctx, "user.password"));
        assert!(contains(&ctx, "user.name"));

        assert!(remove(&mut ctx, "users.0").is_some());
        assert_eq!(get(&ctx, "users.0.phone"), Some(&Value::from("123")));

        assert_eq!(remove(&mut ctx, "nope.nothing"), None);
    }
}
