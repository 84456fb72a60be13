//! Recovery of well-formed JSON from unreliable generator output.
//!
//! Providers fence their output, chat around it, and truncate it at token
//! budgets. [`extract_value`] runs a fixed sequence of recovery steps, each
//! tried only if the previous failed:
//!
//! 1. strip surrounding code fences and parse;
//! 2. slice from the first opening delimiter to the last closing delimiter
//!    of the same kind and parse;
//! 3. apply the ordered [`repair`] chain — each strip is followed by
//!    delimiter closing and a reparse;
//! 4. truncate to the last complete string-valued field and close;
//! 5. give up with an [`ExtractFailure`].
//!
//! The result is deterministic for identical input, and never a silently
//! partial value: either the text parses as well-formed JSON or the engine
//! fails explicitly with diagnostics.

pub mod normalize;
pub mod repair;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use repair::{REPAIR_CHAIN, close_delimiters, truncate_to_last_complete_field};

/// Explicit extraction failure: the original text length plus the last
/// parse error, for diagnostics. Never silently coerced into a partial
/// document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractFailure {
    pub text_len: usize,
    pub last_error: String,
}

impl std::fmt::Display for ExtractFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unrepairable output ({} chars): {}",
            self.text_len, self.last_error
        )
    }
}

impl std::error::Error for ExtractFailure {}

static FENCE_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*```[a-zA-Z]*\s*").unwrap());
static FENCE_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*```\s*$").unwrap());

/// Strip surrounding code-fence markers (```` ```json … ``` ````).
pub fn strip_code_fences(text: &str) -> String {
    FENCE_CLOSE
        .replace(&FENCE_OPEN.replace(text, ""), "")
        .into_owned()
}

/// Slice from the first `{` or `[` to the last closing token of the same
/// kind. When no closing token follows, the slice runs to the end of the
/// text (the repair chain takes it from there).
fn slice_structure(text: &str) -> Option<String> {
    let open = text.find(['{', '['])?;
    let close = match text.as_bytes()[open] {
        b'{' => text.rfind('}'),
        _ => text.rfind(']'),
    };
    match close {
        Some(c) if c > open => text.get(open..=c).map(str::to_string),
        _ => text.get(open..).map(str::to_string),
    }
}

/// Recover a parsed JSON value from raw provider text.
///
/// Deterministic for identical input. Returns [`ExtractFailure`] carrying
/// the original text length and the last parse error when every strategy
/// is exhausted.
pub fn extract_value(raw: &str) -> Result<Value, ExtractFailure> {
    let fail = |last_error: String| ExtractFailure {
        text_len: raw.len(),
        last_error,
    };

    // 1. Fence strip alone is often enough.
    let unfenced = strip_code_fences(raw);
    let mut last_error = match serde_json::from_str(&unfenced) {
        Ok(value) => return Ok(value),
        Err(e) => e.to_string(),
    };

    // 2. Slice out the structure and try again.
    let Some(mut text) = slice_structure(&unfenced) else {
        return Err(fail("no JSON structure found".into()));
    };
    match serde_json::from_str(&text) {
        Ok(value) => return Ok(value),
        Err(e) => last_error = e.to_string(),
    }

    // 3. Progressive repairs. Strips persist across strategies; each strip
    //    is followed by a close-and-reparse attempt.
    for strategy in REPAIR_CHAIN {
        if let Some(stripped) = (strategy.apply)(&text) {
            debug!("repair strategy applied: {}", strategy.name);
            text = stripped;
            let candidate = close_delimiters(&text);
            match serde_json::from_str(&candidate) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = e.to_string(),
            }
        }
    }

    // 4. Last resort: cut back to the last complete string-valued field.
    if let Some(truncated) = truncate_to_last_complete_field(&text) {
        debug!("repair strategy applied: truncate-to-last-field");
        let candidate = close_delimiters(&truncated);
        match serde_json::from_str(&candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(fail(last_error))
}
