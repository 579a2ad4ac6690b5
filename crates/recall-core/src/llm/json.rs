//! Helpers for reading JSON out of free-form model output.
//!
//! Models frequently wrap JSON in markdown fences or add a sentence before
//! it. These helpers strip the fences and, failing a direct parse, retry on
//! the outermost object or array found in the text.

use serde::de::DeserializeOwned;

/// Remove a surrounding ```json (or bare ```) fence, if present.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse `T` from model output.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    let body = strip_code_fences(text);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => match outermost_json(body) {
            Some(inner) if inner.len() < body.len() => serde_json::from_str(inner),
            _ => Err(first),
        },
    }
}

/// First 200 characters of `text`, for log previews.
pub fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
