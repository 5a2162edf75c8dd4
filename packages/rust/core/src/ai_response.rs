//! Parsing of model output into a JSON analysis document.
//!
//! Models wrap JSON in code fences, prepend prose, and leave comment lines or
//! trailing commas behind. Parsing strips the fence, tries a strict parse,
//! and on failure applies one cleanup pass before a second and final attempt.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use reportforge_shared::{ReportforgeError, Result};

/// Parse a model response into a JSON mapping.
pub fn parse_analysis(response: &str) -> Result<Value> {
    let body = extract_json_block(response);

    let value = match serde_json::from_str::<Value>(body) {
        Ok(v) => v,
        Err(first) => {
            tracing::debug!(error = %first, "strict parse failed, retrying after cleanup");
            let cleaned = lenient_cleanup(body);
            serde_json::from_str::<Value>(&cleaned)
                .map_err(|e| ReportforgeError::parse(format!("invalid JSON from model: {e}")))?
        }
    };

    if !value.is_object() {
        return Err(ReportforgeError::parse("model response is not a JSON object"));
    }
    Ok(value)
}

/// Locate the JSON payload inside a response.
fn extract_json_block(response: &str) -> &str {
    let text = response.trim();

    if let Some(start) = text.find("```json") {
        let after = &text[start + "```json".len()..];
        let end = after.rfind("```").unwrap_or(after.len());
        return after[..end].trim();
    }

    if let Some(rest) = text.strip_prefix("```") {
        // Fence with another (or no) language tag: drop the tag line.
        let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        let end = rest.rfind("```").unwrap_or(rest.len());
        return rest[..end].trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Remove `//` comment lines and trailing commas.
fn lenient_cleanup(body: &str) -> String {
    static TRAILING_COMMA_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("valid regex"));

    let without_comments: String = body
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");

    TRAILING_COMMA_RE
        .replace_all(&without_comments, "$1")
        .into_owned()
}
