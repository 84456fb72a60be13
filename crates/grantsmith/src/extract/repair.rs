//! Textual repair strategies for malformed structured-output text.
//!
//! Each strategy is an independent transformation: it takes the working
//! text and returns a stripped copy, or `None` when it does not apply.
//! The engine applies them in a fixed order, closing open delimiters and
//! reparsing after each strip. Keeping the strategies separate keeps each
//! regex individually testable and keeps the delimiter-counting fragility
//! isolated in [`close_delimiters`].

use regex::Regex;
use std::sync::LazyLock;

/// A single named repair strategy.
pub struct RepairStrategy {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<String>,
}

/// The ordered repair chain. Strips accumulate: a strategy operates on
/// whatever text the previous strategies left behind.
pub const REPAIR_CHAIN: &[RepairStrategy] = &[
    RepairStrategy {
        name: "trailing-comma",
        apply: strip_trailing_comma,
    },
    RepairStrategy {
        name: "dangling-colon",
        apply: strip_dangling_colon,
    },
    RepairStrategy {
        name: "open-string-field",
        apply: strip_open_string_field,
    },
    RepairStrategy {
        name: "valueless-key",
        apply: strip_valueless_key,
    },
];

static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*$").unwrap());
static DANGLING_COLON: LazyLock<Regex> = LazyLock::new(|| Regex::new(r":\s*$").unwrap());
// A key whose string value was cut off before the closing quote.
static OPEN_STRING_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#",?\s*"[^"]*"\s*:\s*"(?:[^"\\]|\\.)*$"#).unwrap());
// A key (possibly itself cut off mid-token) with no value. The leading comma
// is mandatory so a complete trailing *value* string is never mistaken for
// a key.
static VALUELESS_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#",\s*"[^"]*"?\s*:?\s*$"#).unwrap());

fn replace_if_changed(re: &Regex, text: &str) -> Option<String> {
    let stripped = re.replace(text, "");
    if stripped == text {
        None
    } else {
        Some(stripped.into_owned())
    }
}

/// Drop a trailing comma: `{"a":1,` → `{"a":1`.
pub fn strip_trailing_comma(text: &str) -> Option<String> {
    replace_if_changed(&TRAILING_COMMA, text)
}

/// Drop a trailing colon with no value: `{"a":1,"b":` → `{"a":1,"b"`.
/// The dangling key this leaves behind is the valueless-key strategy's job.
pub fn strip_dangling_colon(text: &str) -> Option<String> {
    replace_if_changed(&DANGLING_COLON, text)
}

/// Drop a trailing key whose string value was left open:
/// `{"a":1,"b":"unfinis` → `{"a":1`.
pub fn strip_open_string_field(text: &str) -> Option<String> {
    replace_if_changed(&OPEN_STRING_FIELD, text)
}

/// Drop a trailing key with no value at all: `{"a":1,"b"` → `{"a":1`.
/// Also catches keys cut off before their closing quote.
pub fn strip_valueless_key(text: &str) -> Option<String> {
    replace_if_changed(&VALUELESS_KEY, text)
}

/// Last-resort truncation: keep the text up to (and including) the closing
/// quote of the last complete string value that was followed by a comma,
/// dropping the comma and everything after it. Text that already ends at a
/// complete string value needs no cut at all, only closers.
pub fn truncate_to_last_complete_field(text: &str) -> Option<String> {
    if let Some(quote) = text.rfind("\",") {
        return text.get(..quote + 1).map(str::to_string);
    }
    let trimmed = text.trim_end();
    if trimmed.ends_with('"') {
        return Some(trimmed.to_string());
    }
    None
}

/// Append the closing tokens needed to balance the text: unmatched brackets
/// first, then unmatched braces.
///
/// The counts are naive — delimiters inside string literals are not
/// excluded, so prose containing a literal `{` or `[` can defeat the
/// balancing. Callers treat the result as a parse *candidate*, never as
/// known-good.
pub fn close_delimiters(text: &str) -> String {
    let mut braces = 0i32;
    let mut brackets = 0i32;
    for c in text.chars() {
        match c {
            '{' => braces += 1,
            '}' => braces -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            _ => {}
        }
    }

    let mut out = String::from(text);
    for _ in 0..brackets.max(0) {
        out.push(']');
    }
    for _ in 0..braces.max(0) {
        out.push('}');
    }
    out
}
