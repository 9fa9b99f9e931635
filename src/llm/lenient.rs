//! Lenient decode for model output.
//!
//! Models are asked for a bare JSON object but routinely wrap it in markdown
//! fences, surround it with prose, or put literal newlines inside string
//! values. This module turns such text into a `serde_json::Value` or gives up.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[error("response is not valid JSON even after repair: {0}")]
pub struct LenientDecodeError(#[from] serde_json::Error);

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after_open = &trimmed[start + 3..];
    // Skip the info string (e.g. "json") up to the end of the opening line
    let body_start = after_open.find('\n').map_or(0, |i| i + 1);
    let body = &after_open[body_start..];
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Narrows text to its outermost `{ ... }` span, dropping surrounding prose.
fn outer_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Escapes raw control characters that appear inside JSON string literals.
/// Characters outside strings are left alone, so structural whitespace survives.
pub fn escape_control_chars_in_strings(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in raw.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }

        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }

    out
}

/// Fence strip, direct parse, then one repaired reparse.
pub fn lenient_decode(text: &str) -> Result<Value, LenientDecodeError> {
    let candidate = outer_object(strip_code_fences(text));

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            debug!("Direct JSON parse failed ({}), attempting repair", first_err);
            let repaired = escape_control_chars_in_strings(candidate);
            Ok(serde_json::from_str::<Value>(&repaired)?)
        }
    }
}
