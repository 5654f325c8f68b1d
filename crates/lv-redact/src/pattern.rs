//! Pattern rules, the ReDoS guard, and ordered pattern substitution.
//!
//! Patterns use delimited syntax (`/body/flags`). Before a pattern is
//! compiled it runs through a fixed battery of heuristics looking for
//! constructs that backtrack catastrophically in backtracking engines.
//!
//! The `regex` crate guarantees linear-time matching, so the heuristics are
//! defense in depth here rather than the only thing standing between a bad
//! pattern and a hung logging call. They are kept so that configurations
//! stay portable to backtracking engines and so that dangerous shapes are
//! rejected consistently.

use crate::audit::{paths, Auditor};
use crate::error::{RedactError, Result};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Compiled size limit for user patterns.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// An ordered pattern → replacement rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Delimited pattern, e.g. `/\d{3}-\d{2}-\d{4}/`.
    pub pattern: String,
    /// Replacement text; `$1`/`${name}` refer to capture groups.
    pub replacement: String,
}

impl PatternRule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

/// A validated, compiled pattern rule.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub replacement: String,
    regex: Regex,
}

impl CompiledPattern {
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Replace every match, returning `None` when nothing matched.
    pub fn replace(&self, text: &str) -> Option<String> {
        match self.regex.replace_all(text, self.replacement.as_str()) {
            Cow::Borrowed(_) => None,
            Cow::Owned(replaced) => Some(replaced),
        }
    }
}

/// Heuristic checks for catastrophic backtracking, applied to the raw
/// pattern text.
static DANGEROUS_CONSTRUCTS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        // (x+)+  (x*)*  (x+)*  (x*)+
        (r"\([^)]*[+*][^)]*\)[+*]", "nested quantifiers"),
        // (x+){n,m}
        (r"\([^)]*[+*][^)]*\)\{\d+(?:,\d*)?\}", "quantified group with inner quantifier"),
        // (.*|.*)  (.+|.+)
        (r"\(\s*\.[*+]\s*\|\s*\.[*+]\s*\)", "overlapping wildcard alternation"),
        // (a|b|c)*  (a|b|c)+
        (r"\([^()|]*\|[^()|]*\|[^()]*\)[*+]", "repeated multi-way alternation"),
        // ((x+)y)+
        (r"\(\([^)]*[+*][^)]*\)[^)]*\)[+*]", "nested repetition"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("static regex"), label))
    .collect()
});

/// Innermost groups, used to spot identical alternatives like `(a|a)`.
static INNER_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()]*)\)").expect("static regex"));

/// Run the dangerous-construct battery against a pattern.
///
/// Returns the label of the first check that fired.
pub fn dangerous_construct(pattern: &str) -> Option<&'static str> {
    for (check, label) in DANGEROUS_CONSTRUCTS.iter() {
        if check.is_match(pattern) {
            return Some(label);
        }
    }

    for group in INNER_GROUP.captures_iter(pattern) {
        let body = group.get(1).map_or("", |m| m.as_str());
        let body = body.strip_prefix("?:").unwrap_or(body);
        if !body.contains('|') {
            continue;
        }
        let alternatives: Vec<&str> = body.split('|').map(str::trim).collect();
        for (i, alt) in alternatives.iter().enumerate() {
            if alternatives[i + 1..].contains(alt) {
                return Some("identical alternation");
            }
        }
    }

    None
}

/// Split a delimited pattern into body and flags.
///
/// Fails when the pattern is shorter than three characters, uses an
/// alphanumeric or backslash delimiter, or has no closing delimiter after
/// position 0.
pub fn split_delimited(pattern: &str) -> Result<(String, &str)> {
    let invalid = |reason: &str| RedactError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.chars().count() < 3 {
        return Err(invalid("pattern must be at least 3 characters"));
    }

    let open = pattern.chars().next().ok_or_else(|| invalid("empty pattern"))?;
    if open.is_alphanumeric() || open == '\\' || open.is_whitespace() {
        return Err(invalid("delimiter must not be alphanumeric, backslash or whitespace"));
    }
    let close = match open {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        '<' => '>',
        other => other,
    };

    let end = match pattern.rfind(close) {
        Some(idx) if idx > 0 => idx,
        _ => return Err(invalid("missing closing delimiter")),
    };
    let body = &pattern[open.len_utf8()..end];
    let flags = &pattern[end + close.len_utf8()..];

    Ok((unescape_delimiter(body, close), flags))
}

/// Turn `\<delim>` back into `<delim>` unless the delimiter is a regex
/// metacharacter and must stay escaped.
fn unescape_delimiter(body: &str, delim: char) -> String {
    if regex_syntax_meta(delim) {
        return body.to_string();
    }
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) if next == delim => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn regex_syntax_meta(c: char) -> bool {
    matches!(
        c,
        '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#'
            | '&' | '-' | '~'
    )
}

/// Compile a delimited pattern without running the heuristics.
pub fn compile(pattern: &str) -> Result<Regex> {
    let (body, flags) = split_delimited(pattern)?;
    let mut builder = RegexBuilder::new(&body);
    builder.size_limit(PATTERN_SIZE_LIMIT);

    for flag in flags.chars() {
        match flag {
            'i' => {
                builder.case_insensitive(true);
            }
            'm' => {
                builder.multi_line(true);
            }
            's' => {
                builder.dot_matches_new_line(true);
            }
            'x' => {
                builder.ignore_whitespace(true);
            }
            'U' => {
                builder.swap_greed(true);
            }
            // Unicode is always on, and `D` only changes `$` in PCRE.
            'u' | 'D' => {}
            other => {
                return Err(RedactError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: format!("unknown modifier '{}'", other),
                })
            }
        }
    }

    builder.build().map_err(|e| RedactError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Validity checker with a memoized verdict per pattern string.
#[derive(Debug, Default)]
pub struct PatternValidator {
    cache: RwLock<HashMap<String, bool>>,
}

impl PatternValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pattern is safe and compiles. Memoized.
    pub fn validate(&self, pattern: &str) -> bool {
        if let Some(&known) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return known;
        }

        let verdict = self.check(pattern).is_ok();
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), verdict);
        verdict
    }

    /// Full check with the reason for rejection.
    pub fn check(&self, pattern: &str) -> Result<Regex> {
        if let Some(label) = dangerous_construct(pattern) {
            debug!(pattern, check = label, "rejecting pattern");
            return Err(RedactError::UnsafePattern {
                pattern: pattern.to_string(),
            });
        }

        let regex = compile(pattern)?;
        // Smoke test; a linear-time engine cannot fail here, but a match
        // against the empty string exercises the compiled program once.
        let _ = regex.is_match("");
        Ok(regex)
    }

    /// Validate and compile a rule, caching the verdict.
    pub fn compile_rule(&self, rule: &PatternRule) -> Result<CompiledPattern> {
        let outcome = self.check(&rule.pattern);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(rule.pattern.clone(), outcome.is_ok());
        Ok(CompiledPattern {
            source: rule.pattern.clone(),
            replacement: rule.replacement.clone(),
            regex: outcome?,
        })
    }

    /// Validate every rule, failing on the first bad one.
    pub fn validate_all(&self, rules: &[PatternRule]) -> Result<()> {
        for rule in rules {
            self.compile_rule(rule)?;
        }
        Ok(())
    }

    /// Pre-warm the cache.
    pub fn cache_patterns(&self, rules: &[PatternRule]) {
        for rule in rules {
            self.validate(&rule.pattern);
        }
    }

    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Ordered list of compiled rules.
///
/// Rules apply in insertion order; each sees the previous rule's output.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    rules: Vec<CompiledPattern>,
}

impl PatternSet {
    pub fn new(rules: Vec<CompiledPattern>) -> Self {
        Self { rules }
    }

    /// Compile a rule list through a validator.
    pub fn compile(rules: &[PatternRule], validator: &PatternValidator) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| validator.compile_rule(rule))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.rules.iter()
    }

    /// Apply every rule in order.
    ///
    /// A rule's output is only adopted when it matched at least once. If the
    /// final text is empty the original is returned instead.
    pub(crate) fn apply(&self, text: &str, auditor: &Auditor) -> String {
        if text.is_empty() {
            return String::new();
        }

        let mut current = Cow::Borrowed(text);
        for rule in &self.rules {
            match catch_unwind(AssertUnwindSafe(|| rule.replace(&current))) {
                Ok(Some(replaced)) => current = Cow::Owned(replaced),
                Ok(None) => {}
                Err(_) => {
                    let err = RedactError::PatternEvaluation {
                        pattern: rule.source.clone(),
                        message: "pattern evaluation aborted".to_string(),
                    };
                    auditor.emit_error(
                        paths::REGEX_ERROR,
                        &crate::Value::from(rule.source.as_str()),
                        &err,
                    );
                }
            }
        }

        if current.is_empty() {
            return text.to_string();
        }
        current.into_owned()
    }

    /// Whether any rule matches the text.
    pub fn is_match(&self, text: &str) -> bool {
        self.rules.iter().any(|rule| rule.regex.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_catastrophic_patterns() {
        let validator = PatternValidator::new();
        for pattern in ["/(.+)+/", "/(a*)*/", "/(a+){1,10}/", "/(.*|.*)/", "/(ab|bc|cd)*/"] {
            assert!(!validator.validate(pattern), "{} should be rejected", pattern);
            assert!(matches!(
                validator.check(pattern),
                Err(RedactError::UnsafePattern { .. })
            ));
        }

        let err = validator.check("(a+)+").unwrap_err();
        assert!(err.to_string().contains("catastrophic backtracking"));
    }

    #[test]
    fn test_accepts_common_pii_patterns() {
        let validator = PatternValidator::new();
        for pattern in [
            r"/\d{3}-\d{2}-\d{4}/",
            r"/[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}/",
            r"/\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b/",
            r"/\bFI\d{2}\s?\d{4}\s?\d{4}\s?\d{4}\s?\d{2}\b/",
        ] {
            assert!(validator.validate(pattern), "{} should be accepted", pattern);
        }
    }

    #[test]
    fn test_identical_alternation() {
        assert_eq!(dangerous_construct("/(abc|abc)/"), Some("identical alternation"));
        assert_eq!(dangerous_construct("/(?:x|y)/"), None);
    }

    #[test]
    fn test_structural_rejections() {
        let validator = PatternValidator::new();
        assert!(!validator.validate("//"));
        assert!(!validator.validate("ab"));
        assert!(!validator.validate("/abc"));
        assert!(!validator.validate("abc/"));
        assert!(!validator.validate("/[unclosed/"));
        assert!(!validator.validate("/abc/q"));
    }

    #[test]
    fn test_validity_is_memoized() {
        let validator = PatternValidator::new();
        assert_eq!(validator.cached_len(), 0);
        validator.validate(r"/\d+/");
        validator.validate(r"/\d+/");
        validator.validate("/(a+)+/");
        assert_eq!(validator.cached_len(), 2);

        validator.clear_cache();
        assert_eq!(validator.cached_len(), 0);

        validator.cache_patterns(&[PatternRule::new(r"/\w+/", "x")]);
        assert_eq!(validator.cached_len(), 1);
    }

    #[test]
    fn test_delimiters_and_flags() {
        let re = compile("/hello/i").unwrap();
        assert!(re.is_match("HeLLo"));

        let re = compile(r"#a/b#").unwrap();
        assert!(re.is_match("a/b"));

        let re = compile(r"/a\/b/").unwrap();
        assert!(re.is_match("a/b"));

        let re = compile("{x{2}}").unwrap();
        assert!(re.is_match("xx"));
    }

    #[test]
    fn test_apply_in_order() {
        let validator = PatternValidator::new();
        let set = PatternSet::compile(
            &[
                PatternRule::new("/secret/", "hidden"),
                PatternRule::new("/hidden/", "***"),
            ],
            &validator,
        )
        .unwrap();

        // The second rule sees the first rule's output
        assert_eq!(set.apply("a secret here", &Auditor::default()), "a *** here");
    }

    #[test]
    fn test_apply_restores_empty_result() {
        let validator = PatternValidator::new();
        let set =
            PatternSet::compile(&[PatternRule::new("/.+/s", "")], &validator).unwrap();
        assert_eq!(set.apply("everything", &Auditor::default()), "everything");
    }

    #[test]
    fn test_capture_group_replacement() {
        let validator = PatternValidator::new();
        let set = PatternSet::compile(
            &[PatternRule::new(r"/(\w+)@example\.com/", "$1@***")],
            &validator,
        )
        .unwrap();
        assert_eq!(
            set.apply("mail bob@example.com now", &Auditor::default()),
            "mail bob@*** now"
        );
    }
}
