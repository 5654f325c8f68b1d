//! Built-in PII pattern set.
//!
//! Order matters: specific formats come before generic ones so that, for
//! example, an email address is masked before its digits could be taken for
//! something else.

use crate::pattern::PatternRule;

/// A built-in pattern definition.
#[derive(Debug, Clone, Copy)]
pub struct DefaultPattern {
    /// Category name.
    pub category: &'static str,
    /// Delimited pattern.
    pub pattern: &'static str,
    /// Replacement token.
    pub replacement: &'static str,
}

const fn def(
    category: &'static str,
    pattern: &'static str,
    replacement: &'static str,
) -> DefaultPattern {
    DefaultPattern {
        category,
        pattern,
        replacement,
    }
}

/// Built-in patterns, in application order.
pub static DEFAULT_PATTERNS: &[DefaultPattern] = &[
    def(
        "bearer_token",
        r"/\bBearer\s+[A-Za-z0-9\-._~+\/]+=*/i",
        "Bearer ***TOKEN***",
    ),
    def(
        "api_key",
        r"/\b(?:sk|pk|rk)_(?:live|test)_[A-Za-z0-9]{16,}\b/",
        "***API_KEY***",
    ),
    def(
        "api_key_assignment",
        r#"/\bapi[_-]?key\s*[:=]\s*["']?[A-Za-z0-9_\-]{16,}["']?/i"#,
        "api_key=***API_KEY***",
    ),
    def(
        "email",
        r"/\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b/",
        "***EMAIL***",
    ),
    def(
        "iban",
        r"/\b[A-Z]{2}\d{2}(?:\s?[A-Z0-9]{4}){2,7}(?:\s?[A-Z0-9]{1,4})?\b/",
        "***IBAN***",
    ),
    def(
        "finnish_hetu",
        r"/\b(?:0[1-9]|[12]\d|3[01])(?:0[1-9]|1[0-2])\d{2}[-+A-FU-Y]\d{3}[0-9A-Y]\b/",
        "***HETU***",
    ),
    def("us_ssn", r"/\b\d{3}-\d{2}-\d{4}\b/", "***USSSN***"),
    def(
        "uk_ni",
        r"/\b[A-CEGHJ-PR-TW-Z][A-CEGHJ-NPR-TW-Z]\s?\d{2}\s?\d{2}\s?\d{2}\s?[A-D]\b/",
        "***UKNI***",
    ),
    def("ca_sin", r"/\b\d{3}[- ]\d{3}[- ]\d{3}\b/", "***CASIN***"),
    def("ehic", r"/\b80\d{18}\b/", "***EHIC***"),
    def(
        "us_medicare",
        r"/\b[1-9][AC-HJKMNP-RT-Y][AC-HJKMNP-RT-Y0-9]\d[AC-HJKMNP-RT-Y][AC-HJKMNP-RT-Y0-9]\d[AC-HJKMNP-RT-Y]{2}\d{2}\b/",
        "***MEDICARE***",
    ),
    def(
        "credit_card",
        r"/\b(?:\d{4}[- ]?){3}\d{4}\b/",
        "***CC***",
    ),
    def("phone", r"/\+[1-9](?:[ -]?\d){6,14}\b/", "***PHONE***"),
    def(
        "date_of_birth_iso",
        r"/\b(?:19|20)\d{2}-(?:0[1-9]|1[0-2])-(?:0[1-9]|[12]\d|3[01])\b/",
        "***DOB***",
    ),
    def(
        "date_of_birth",
        r"/\b(?:0[1-9]|[12]\d|3[01])[.\/](?:0[1-9]|1[0-2])[.\/](?:19|20)\d{2}\b/",
        "***DOB***",
    ),
    def(
        "passport",
        r"/\b(passport(?:\s*(?:no|number))?[\s:#.]*)[A-Z0-9]{6,9}\b/i",
        "${1}***PASSPORT***",
    ),
    def(
        "mac_address",
        r"/\b[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}\b/",
        "***MAC***",
    ),
    def(
        "ipv6",
        r"/\b(?:[0-9A-Fa-f]{1,4}:){7}[0-9A-Fa-f]{1,4}\b/",
        "***IPV6***",
    ),
    def(
        "ipv6_compressed",
        r"/\b(?:[0-9A-Fa-f]{1,4}:){1,7}:(?:[0-9A-Fa-f]{1,4}:?){0,6}[0-9A-Fa-f]{0,4}\b/",
        "***IPV6***",
    ),
    def(
        "ipv4",
        r"/\b(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(?:\.(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}\b/",
        "***IP***",
    ),
    def("vehicle_plate", r"/\b[A-Z]{2,3}-\d{1,3}\b/", "***PLATE***"),
    def("uk_sort_code", r"/\b\d{2}-\d{2}-\d{2}\b/", "***SORT_CODE***"),
    def("ca_transit", r"/\b\d{5}-\d{3}\b/", "***TRANSIT***"),
];

/// Built-in patterns as ordered rules.
pub fn default_patterns() -> Vec<PatternRule> {
    DEFAULT_PATTERNS
        .iter()
        .map(|d| PatternRule::new(d.pattern, d.replacement))
        .collect()
}

/// Look up a single built-in pattern by category.
pub fn default_pattern(category: &str) -> Option<PatternRule> {
    DEFAULT_PATTERNS
        .iter()
        .find(|d| d.category == category)
        .map(|d| PatternRule::new(d.pattern, d.replacement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::pattern::{PatternSet, PatternValidator};

    fn default_set() -> PatternSet {
        PatternSet::compile(&default_patterns(), &PatternValidator::new()).unwrap()
    }

    #[test]
    fn test_every_default_passes_the_guard() {
        let validator = PatternValidator::new();
        for d in DEFAULT_PATTERNS {
            if let Err(e) = validator.check(d.pattern) {
                panic!("default pattern {} rejected: {}", d.category, e);
            }
        }
    }

    #[test]
    fn test_default_samples() {
        let set = default_set();
        let auditor = Auditor::default();
        let cases = [
            ("ssn 123-45-6789", "ssn ***USSSN***"),
            ("mail john.doe@example.com", "mail ***EMAIL***"),
            ("hetu 131052-308T", "hetu ***HETU***"),
            ("iban FI21 1234 5600 0007 85", "iban ***IBAN***"),
            ("card 4111 1111 1111 1111", "card ***CC***"),
            ("call +358401234567", "call ***PHONE***"),
            ("born 1985-04-12", "born ***DOB***"),
            ("born 12.04.1985", "born ***DOB***"),
            ("ni AB123456C", "ni ***UKNI***"),
            ("sin 046 454 286", "sin ***CASIN***"),
            ("mac 00:1A:2B:3C:4D:5E", "mac ***MAC***"),
            ("from 192.168.1.10", "from ***IP***"),
            ("Authorization: Bearer abc.def-ghi", "Authorization: Bearer ***TOKEN***"),
            ("passport: X1234567", "passport: ***PASSPORT***"),
            ("plate ABC-123", "plate ***PLATE***"),
        ];
        for (input, expected) in cases {
            assert_eq!(set.apply(input, &auditor), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_plain_text_untouched() {
        let set = default_set();
        let text = "User logged in successfully after 3 attempts";
        assert_eq!(set.apply(text, &Auditor::default()), text);
    }

    #[test]
    fn test_default_pattern_lookup() {
        let rule = default_pattern("us_ssn").unwrap();
        assert_eq!(rule.replacement, "***USSSN***");
        assert!(default_pattern("nonexistent").is_none());
    }
}
