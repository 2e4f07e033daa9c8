//! JSON extraction from model responses.
//!
//! Models wrap JSON in code fences, prepend chatter, or leave trailing
//! commas. Truncated output is rejected rather than patched: a writer body
//! cut short must fail the call, never reach the document store.

use serde_json::Value;
use tracing::debug;

use crate::types::{DocError, Result, truncate_chars};

/// Parse the JSON payload of a model response.
pub fn extract_json_from_response(content: &str) -> Result<Value> {
    let cleaned = strip_code_fences(content.trim().trim_start_matches('\u{feff}'));

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    let candidate = balanced_span(cleaned).unwrap_or(cleaned);
    for attempt in [candidate.to_string(), strip_trailing_commas(candidate)] {
        if let Ok(value) = serde_json::from_str::<Value>(&attempt) {
            debug!("JSON recovered from loosely formatted response");
            return Ok(value);
        }
    }

    Err(DocError::LlmApi(format!(
        "Failed to parse JSON from response: {}...",
        truncate_chars(cleaned, 200)
    )))
}

fn strip_code_fences(s: &str) -> &str {
    let mut result = s;
    if result.starts_with("```")
        && let Some(newline) = result.find('\n')
    {
        result = &result[newline + 1..];
    }
    if let Some(stripped) = result.trim_end().strip_suffix("```") {
        result = stripped;
    }
    result.trim()
}

/// First complete top-level object or array inside `s`.
fn balanced_span(s: &str) -> Option<&str> {
    let start = s.find(['{', '['])?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas directly before a closing bracket, outside strings.
fn strip_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if escape {
            escape = false;
        } else if ch == '\\' && in_string {
            escape = true;
        } else if ch == '"' {
            in_string = !in_string;
        } else if ch == ',' && !in_string {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(ch);
    }
    result
}
