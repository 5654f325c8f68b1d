//! Fuzz target for the balanced-structure scanner.
//!
//! Scanning and masking arbitrary text must never panic, and every
//! extracted structure must be a prefix of the text at its offset.

#![no_main]

use libfuzzer_sys::fuzz_target;
use lv_redact::{extract_balanced_structure, find_json_structures, RedactionEngine};
use std::sync::OnceLock;

static ENGINE: OnceLock<RedactionEngine> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    for (start, _) in text.match_indices(['{', '[']) {
        if let Some(found) = extract_balanced_structure(text, start) {
            assert!(text[start..].starts_with(found));
        }
    }
    let _ = find_json_structures(text);

    let engine = ENGINE.get_or_init(|| {
        RedactionEngine::builder()
            .with_default_patterns()
            .data_type_mask("integer", "0")
            .build()
            .expect("default engine")
    });
    let _ = engine.mask_message(text);
});
