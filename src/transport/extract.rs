//! JSON-object extraction from model output.
//!
//! Models wrap JSON in reasoning blocks, Markdown fences or prose. The
//! strategy, in order:
//!
//! 1. Strip `<think>...</think>` blocks.
//! 2. Strip Markdown code fences.
//! 3. Parse the remaining text as a whole.
//! 4. Parse the substring between the first `{` and the last `}`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static THINK_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-tag regex"));

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?").expect("valid fence regex"));

/// Extract the JSON object from `raw`.
///
/// Returns a description of the failure when no object can be found; a
/// top-level JSON value that is not an object is also a failure.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    let without_think = THINK_TAG_RE.replace_all(raw, "");
    let cleaned = FENCE_RE.replace_all(&without_think, "");
    let cleaned = cleaned.trim();

    if let Ok(value) = serde_json::from_str::<Value>(cleaned) {
        return into_object(value);
    }

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<Value>(&cleaned[start..=end])
                .map_err(|e| format!("invalid JSON object in model output: {}", e))
                .and_then(into_object)
        }
        _ => Err(format!(
            "no JSON object found in model output: {}",
            preview(cleaned)
        )),
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got: {}", preview(&other.to_string()))),
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.chars().count() <= LIMIT {
        text.to_string()
    } else {
        let head: String = text.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}
