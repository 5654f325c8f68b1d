//! Fuzz target for the pattern validator.
//!
//! Arbitrary pattern strings must be accepted or rejected, never panic, and
//! an accepted pattern must be usable for replacement.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lv_redact::{PatternRule, PatternValidator};

fuzz_target!(|data: &[u8]| {
    let Ok(pattern) = std::str::from_utf8(data) else {
        return;
    };

    let validator = PatternValidator::new();
    if validator.validate(pattern) {
        let compiled = validator
            .compile_rule(&PatternRule::new(pattern, "***"))
            .expect("validated pattern compiles");
        let _ = compiled.replace("sample 123-45-6789 text");
    }
});
