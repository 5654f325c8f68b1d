//! Depth-limited traversal of nested values.
//!
//! Strings go through the ordered pattern set first and fall back to the
//! data type table when no pattern matched. Containers are offered to the
//! data type table as a whole; if that leaves them untouched the traversal
//! descends into each child. Containers at or below `max_depth` are returned
//! as they are and reported once as `max_depth_reached`.
//!
//! Values are moved through the traversal, so an untouched subtree is handed
//! back without copying.

use crate::audit::{paths, Auditor};
use crate::datatype::{DataTypeMasker, DataTypeOutcome};
use crate::pattern::PatternSet;
use crate::value::{Value, ValueMap};
use std::collections::HashSet;
use tracing::trace;

/// Default nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 100;
/// Smallest accepted nesting limit.
pub const MIN_MAX_DEPTH: usize = 1;
/// Largest accepted nesting limit.
pub const MAX_MAX_DEPTH: usize = 1000;

/// Containers with more children than this are walked in chunks.
pub const CHUNK_SIZE: usize = 1000;
/// Containers with more children than this report progress per chunk.
pub const LARGE_CONTAINER_THRESHOLD: usize = 10_000;

/// Join a parent path and a child key.
pub(crate) fn child_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        let mut path = String::with_capacity(parent.len() + key.len() + 1);
        path.push_str(parent);
        path.push('.');
        path.push_str(key);
        path
    }
}

/// Borrowed view over the engine's masking state for one traversal.
pub(crate) struct RecursiveMasker<'a> {
    patterns: &'a PatternSet,
    datatypes: &'a DataTypeMasker,
    auditor: &'a Auditor,
    max_depth: usize,
    chunk_size: usize,
    processed: Option<&'a HashSet<String>>,
}

impl<'a> RecursiveMasker<'a> {
    pub(crate) fn new(
        patterns: &'a PatternSet,
        datatypes: &'a DataTypeMasker,
        auditor: &'a Auditor,
        max_depth: usize,
    ) -> Self {
        Self {
            patterns,
            datatypes,
            auditor,
            max_depth,
            chunk_size: CHUNK_SIZE,
            processed: None,
        }
    }

    /// Skip every path in `processed`, along with everything below it.
    pub(crate) fn with_processed(mut self, processed: &'a HashSet<String>) -> Self {
        self.processed = Some(processed);
        self
    }

    #[cfg(test)]
    pub(crate) fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub(crate) fn auditor(&self) -> &Auditor {
        self.auditor
    }

    /// Mask a value found at `path`, `depth` levels below the root.
    pub(crate) fn mask(&self, value: Value, path: &str, depth: usize) -> Value {
        if self.is_processed(path) {
            return value;
        }
        match value {
            Value::String(text) => self.mask_string(text, path),
            Value::Sequence(_) | Value::Map(_) => self.mask_container(value, path, depth),
            leaf => self.mask_leaf(leaf, path),
        }
    }

    /// Mask the children of a context map. The map itself is the root.
    pub(crate) fn mask_context(&self, context: ValueMap) -> ValueMap {
        self.mask_map(context, "", 0)
    }

    /// Run only the ordered patterns over a piece of text.
    pub(crate) fn apply_patterns(&self, text: &str) -> String {
        self.patterns.apply(text, self.auditor)
    }

    fn is_processed(&self, path: &str) -> bool {
        self.processed.is_some_and(|set| set.contains(path))
    }

    fn mask_string(&self, text: String, path: &str) -> Value {
        let masked = self.apply_patterns(&text);
        if masked == text {
            return self.mask_leaf(Value::String(text), path);
        }
        let original = Value::String(text);
        let masked = Value::String(masked);
        self.auditor.emit(path, &original, Some(&masked));
        masked
    }

    fn mask_leaf(&self, value: Value, path: &str) -> Value {
        match self.datatypes.apply(&value) {
            DataTypeOutcome::Replaced(masked) if masked != value => {
                self.auditor.emit(path, &value, Some(&masked));
                masked
            }
            _ => value,
        }
    }

    fn mask_container(&self, value: Value, path: &str, depth: usize) -> Value {
        if depth >= self.max_depth {
            self.auditor.emit(
                paths::MAX_DEPTH_REACHED,
                &Value::String(path.to_string()),
                Some(&Value::Int(depth as i64)),
            );
            return value;
        }

        if let DataTypeOutcome::Replaced(masked) = self.datatypes.apply(&value) {
            if masked != value {
                self.auditor.emit(path, &value, Some(&masked));
                return masked;
            }
        }

        match value {
            Value::Sequence(items) => Value::Sequence(self.mask_sequence(items, path, depth)),
            Value::Map(map) => Value::Map(self.mask_map(map, path, depth)),
            other => other,
        }
    }

    fn mask_sequence(&self, items: Vec<Value>, path: &str, depth: usize) -> Vec<Value> {
        let total = items.len();
        self.chunked(items.into_iter().enumerate(), total, path, |(i, item)| {
            self.mask(item, &child_path(path, &i.to_string()), depth + 1)
        })
    }

    fn mask_map(&self, map: ValueMap, path: &str, depth: usize) -> ValueMap {
        let total = map.len();
        let entries = self.chunked(map.into_entries().into_iter(), total, path, |(key, item)| {
            let masked = self.mask(item, &child_path(path, &key), depth + 1);
            (key, masked)
        });
        ValueMap::from_entries(entries)
    }

    fn chunked<T, U, I, F>(&self, items: I, total: usize, path: &str, mut f: F) -> Vec<U>
    where
        I: Iterator<Item = T>,
        F: FnMut(T) -> U,
    {
        let mut out = Vec::with_capacity(total);
        if total <= self.chunk_size {
            out.extend(items.map(f));
            return out;
        }

        let mut items = items;
        loop {
            let before = out.len();
            out.extend(items.by_ref().take(self.chunk_size).map(&mut f));
            if out.len() == before {
                break;
            }
            if total > LARGE_CONTAINER_THRESHOLD {
                trace!(path, masked = out.len(), total, "masked chunk");
            }
        }
        out
    }
}
