use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap());

/// Parses untrusted model output into `T`.
///
/// The text is unwrapped from a markdown fence, curly quotes are straightened,
/// the first balanced `{...}` block is cut out and trailing commas are dropped.
/// Anything that still does not match the shape of `T` yields `None`.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = clean_json(raw);
    match serde_json::from_str::<T>(&cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Could not decode model output: {} | Raw: {}", e, raw);
            None
        }
    }
}

pub fn decode_or<T: DeserializeOwned>(raw: &str, fallback: impl FnOnce() -> T) -> T {
    decode(raw).unwrap_or_else(fallback)
}

pub fn clean_json(raw: &str) -> String {
    let unfenced = match CODE_FENCE.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw,
    };

    let straightened = straighten_quotes(unfenced.trim());
    let object = first_object(&straightened).unwrap_or(&straightened);

    strip_trailing_commas(object)
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            other => other,
        })
        .collect()
}

fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        match (in_string, escaped, c) {
            (true, true, _) => escaped = false,
            (true, false, '\\') => escaped = true,
            (true, false, '"') => in_string = false,
            (true, false, _) => {}
            (false, _, '"') => in_string = true,
            (false, _, '{') => depth += 1,
            (false, _, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

// Drops a comma followed only by whitespace and a closing bracket. String contents stay as they are.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text.char_indices() {
        match (in_string, escaped, c) {
            (true, true, _) => escaped = false,
            (true, false, '\\') => escaped = true,
            (true, false, '"') => in_string = false,
            (false, _, '"') => in_string = true,
            (false, _, ',') => {
                let rest = text[offset + 1..].trim_start();
                if rest.starts_with('}') || rest.starts_with(']') {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    out
}
