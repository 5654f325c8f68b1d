//! JSON-aware masking of free text.
//!
//! Log messages often embed JSON payloads. The scanner walks the message,
//! and at every `{` or `[` tries to cut out a balanced structure. A
//! candidate that parses as strict JSON is masked as a value and re-encoded
//! in place; anything else is left byte for byte. The ordered patterns then
//! run over the whole resulting text.
//!
//! The value model keeps maps and sequences apart, so `{}` and `[]` survive
//! re-encoding unchanged. Candidates whose masked value equals the parsed
//! one are not re-encoded at all and keep their original formatting.

use crate::audit::paths;
use crate::recursive::RecursiveMasker;
use crate::value::Value;

/// Cut out the balanced structure opening at byte offset `start`.
///
/// `start` must point at `{` or `[`. Nesting is counted across both bracket
/// kinds; brackets inside double-quoted strings are ignored and a backslash
/// escapes the next character inside a string. Returns `None` when the
/// structure never closes.
pub fn extract_balanced_structure(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(start), Some(b'{' | b'[')) {
        return None;
    }

    let mut level = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => level += 1,
            b'}' | b']' => {
                level -= 1;
                if level == 0 {
                    // Closing brackets are ASCII, so this is a char boundary.
                    return text.get(start..=start + offset);
                }
            }
            _ => {}
        }
    }

    None
}

/// Byte ranges of every balanced structure in `text` that parses as JSON,
/// outermost first and left to right.
pub fn find_json_structures(text: &str) -> Vec<std::ops::Range<usize>> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'{' | b'[') {
            if let Some(candidate) = extract_balanced_structure(text, i) {
                if serde_json::from_str::<serde::de::IgnoredAny>(candidate).is_ok() {
                    found.push(i..i + candidate.len());
                    i += candidate.len();
                    continue;
                }
            }
        }
        i += 1;
    }
    found
}

enum Candidate {
    NotJson,
    Unchanged,
    Masked(String),
}

/// Mask embedded JSON, then run the ordered patterns over the result.
pub(crate) fn process_message(text: &str, masker: &RecursiveMasker<'_>) -> String {
    if text.is_empty() {
        return String::new();
    }

    let with_json = mask_embedded_json(text, masker);
    masker.apply_patterns(&with_json)
}

fn mask_embedded_json(text: &str, masker: &RecursiveMasker<'_>) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'{' | b'[') {
            if let Some(candidate) = extract_balanced_structure(text, i) {
                match mask_candidate(candidate, masker) {
                    Candidate::Masked(replacement) => {
                        out.push_str(&text[copied..i]);
                        out.push_str(&replacement);
                        i += candidate.len();
                        copied = i;
                        continue;
                    }
                    Candidate::Unchanged => {
                        i += candidate.len();
                        continue;
                    }
                    Candidate::NotJson => {}
                }
            }
        }
        i += 1;
    }

    if copied == 0 {
        return text.to_string();
    }
    out.push_str(&text[copied..]);
    out
}

fn mask_candidate(candidate: &str, masker: &RecursiveMasker<'_>) -> Candidate {
    let Ok(parsed) = Value::from_json_str(candidate) else {
        return Candidate::NotJson;
    };

    let masked = masker.mask(parsed.clone(), "", 0);
    if masked == parsed {
        return Candidate::Unchanged;
    }

    match masked.to_json_string() {
        Ok(encoded) => {
            masker.auditor().emit(
                paths::JSON_MASKED,
                &Value::String(candidate.to_string()),
                Some(&Value::String(encoded.clone())),
            );
            Candidate::Masked(encoded)
        }
        Err(e) => {
            masker
                .auditor()
                .emit_error(paths::JSON_ENCODE_ERROR, &Value::String(candidate.to_string()), &e);
            Candidate::Unchanged
        }
    }
}
