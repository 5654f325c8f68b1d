//! Per-field masking rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Replacement used by [`FieldMaskConfig::RegexMask`] when none is given.
pub const DEFAULT_REGEX_REPLACEMENT: &str = "***MASKED***";

fn default_regex_replacement() -> String {
    DEFAULT_REGEX_REPLACEMENT.to_string()
}

/// What to do with a field selected by a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMaskConfig {
    /// Delete the key.
    Remove,
    /// Substitute a literal, coerced back to the original numeric or
    /// boolean kind when it parses as one.
    Replace { value: String },
    /// Apply one ad-hoc pattern to the field's text form.
    RegexMask {
        pattern: String,
        #[serde(default = "default_regex_replacement")]
        replacement: String,
    },
    /// Run the configured global patterns over the field's text form.
    UseGlobalPatterns,
    /// Replace with a keyed pseudonym `[HASH:<key_id>:<hex>]`.
    Hash,
}

impl FieldMaskConfig {
    pub fn remove() -> Self {
        FieldMaskConfig::Remove
    }

    pub fn replace(value: impl Into<String>) -> Self {
        FieldMaskConfig::Replace {
            value: value.into(),
        }
    }

    pub fn regex_mask(pattern: impl Into<String>) -> Self {
        Self::regex_mask_with(pattern, DEFAULT_REGEX_REPLACEMENT)
    }

    pub fn regex_mask_with(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        FieldMaskConfig::RegexMask {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    pub fn use_global_patterns() -> Self {
        FieldMaskConfig::UseGlobalPatterns
    }

    pub fn hash() -> Self {
        FieldMaskConfig::Hash
    }

    /// Pattern this rule needs compiled, if any.
    pub fn pattern(&self) -> Option<&str> {
        match self {
            FieldMaskConfig::RegexMask { pattern, .. } => Some(pattern),
            _ => None,
        }
    }
}

impl fmt::Display for FieldMaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldMaskConfig::Remove => write!(f, "remove"),
            FieldMaskConfig::Replace { .. } => write!(f, "replace"),
            FieldMaskConfig::RegexMask { .. } => write!(f, "regex_mask"),
            FieldMaskConfig::UseGlobalPatterns => write!(f, "use_global_patterns"),
            FieldMaskConfig::Hash => write!(f, "hash"),
        }
    }
}

/// A field path bound to a mask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub path: String,
    pub mask: FieldMaskConfig,
}

impl FieldRule {
    pub fn new(path: impl Into<String>, mask: FieldMaskConfig) -> Self {
        Self {
            path: path.into(),
            mask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_mask_default_replacement() {
        assert_eq!(
            FieldMaskConfig::regex_mask(r"/\d+/"),
            FieldMaskConfig::RegexMask {
                pattern: r"/\d+/".to_string(),
                replacement: "***MASKED***".to_string(),
            }
        );
    }

    #[test]
    fn test_serde_shape() {
        let rule: FieldMaskConfig =
            serde_json::from_str(r#"{"type": "regex_mask", "pattern": "/x/"}"#).unwrap();
        assert_eq!(rule, FieldMaskConfig::regex_mask("/x/"));

        let json = serde_json::to_string(&FieldMaskConfig::replace("***")).unwrap();
        assert_eq!(json, r#"{"type":"replace","value":"***"}"#);

        let rule: FieldMaskConfig = serde_json::from_str(r#"{"type": "remove"}"#).unwrap();
        assert_eq!(rule, FieldMaskConfig::Remove);
    }

    #[test]
    fn test_pattern_accessor() {
        assert_eq!(FieldMaskConfig::regex_mask("/a/").pattern(), Some("/a/"));
        assert_eq!(FieldMaskConfig::hash().pattern(), None);
        assert_eq!(FieldMaskConfig::use_global_patterns().to_string(), "use_global_patterns");
    }
}
