//! Property-based tests for the text scanner and the recursive masker.

use lv_redact::{extract_balanced_structure, find_json_structures, RedactionEngine, Value};
use proptest::prelude::*;

fn json_value() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i32>().prop_map(serde_json::Value::from),
        ".{0,12}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
            prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                .prop_map(|entries| serde_json::Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn container() -> impl Strategy<Value = serde_json::Value> {
    json_value().prop_filter("container", |v| v.is_array() || v.is_object())
}

fn ssn_engine() -> RedactionEngine {
    RedactionEngine::builder()
        .pattern(r"/\d{3}-\d{2}-\d{4}/", "***SSN***")
        .data_type_mask("boolean", "false")
        .build()
        .unwrap()
}

// ============================================================================
// Balanced structure scanner
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any text at any offset: no panic, and a hit is a bracketed prefix of
    /// the remaining text.
    #[test]
    fn scanner_never_panics(text in "\\PC{0,64}", start in 0usize..80) {
        if let Some(found) = extract_balanced_structure(&text, start) {
            let bytes = found.as_bytes();
            prop_assert!(matches!(bytes[0], b'{' | b'['), "bad opening byte in {:?}", found);
            prop_assert!(
                matches!(bytes[bytes.len() - 1], b'}' | b']'),
                "bad closing byte in {:?}",
                found
            );
            prop_assert!(text[start..].starts_with(found));
        }
    }

    /// Bracket soup including quotes and escapes.
    #[test]
    fn scanner_handles_bracket_soup(text in "[\\[\\]{}\"\\\\a ]{0,48}") {
        for start in 0..text.len() {
            if let Some(found) = extract_balanced_structure(&text, start) {
                prop_assert!(text[start..].starts_with(found));
            }
        }
        let _ = find_json_structures(&text);
    }

    /// Serialized JSON embedded between plain words is found whole.
    #[test]
    fn scanner_finds_embedded_json(
        prefix in "[a-z ]{0,16}",
        value in container(),
        suffix in "[a-z ]{0,16}",
    ) {
        let encoded = serde_json::to_string(&value).unwrap();
        let text = format!("{}{}{}", prefix, encoded, suffix);

        let found = extract_balanced_structure(&text, prefix.len());
        prop_assert_eq!(found, Some(encoded.as_str()));

        let ranges = find_json_structures(&text);
        prop_assert_eq!(ranges.first().cloned(), Some(prefix.len()..prefix.len() + encoded.len()));
    }
}

// ============================================================================
// Masking
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Masking a large sequence in chunks matches masking each element.
    #[test]
    fn chunked_sequence_matches_elementwise(
        picks in prop::collection::vec(0usize..4, 1000..2600),
    ) {
        let engine = ssn_engine();
        let items: Vec<Value> = picks
            .iter()
            .map(|p| match p {
                0 => Value::from("123-45-6789"),
                1 => Value::from("plain"),
                2 => Value::Bool(true),
                _ => Value::Int(7),
            })
            .collect();

        let expected: Vec<Value> = items
            .iter()
            .cloned()
            .map(|item| engine.mask_value(item, "items"))
            .collect();
        let masked = engine.mask_value(Value::Sequence(items), "items");
        prop_assert_eq!(masked, Value::Sequence(expected));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Messages with an embedded SSN inside JSON never leak it.
    #[test]
    fn ssn_in_embedded_json_never_leaks(
        prefix in "[a-z ]{0,10}",
        key in "[a-z]{1,8}",
        area in 100u32..999,
        group in 10u32..99,
        serial in 1000u32..9999,
    ) {
        let ssn = format!("{}-{}-{}", area, group, serial);
        let message = format!(r#"{}{{"{}":"{}","n":1}}"#, prefix, key, ssn);
        let masked = ssn_engine().mask_message(&message);
        prop_assert!(!masked.contains(&ssn), "{}", masked);
        prop_assert!(masked.starts_with(&prefix));
    }

    /// Text without digits or brackets passes through untouched.
    #[test]
    fn plain_text_untouched(text in "[a-zA-Z ,.!?]{0,64}") {
        prop_assert_eq!(ssn_engine().mask_message(&text), text);
    }
}
