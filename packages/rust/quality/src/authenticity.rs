//! Authenticity checks for free text and structured stage output.
//!
//! A string "looks templated" when it is too short to carry researched
//! content or when it contains one of the hedge/placeholder phrases that
//! language models emit when they fill in a template instead of answering.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Strings shorter than this (in characters) are treated as templated.
pub const MIN_AUTHENTIC_LENGTH: usize = 30;

/// Marker key set to `true` on every value synthesized by recovery.
pub const FALLBACK_MARKER: &str = "fallbackMode";

/// Companion key naming the stage a recovered value stands in for.
pub const RECOVERED_STAGE_KEY: &str = "recoveredStage";

/// Status value artifact generators use to signal a degraded result.
pub const EMERGENCY_STATUS: &str = "EMERGENCY_MODE";

static DENYLIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)customi[sz]ed for|based on|specific to|example of|simulated|generic|not applicable|not informed|\bn/a\b",
    )
    .expect("valid regex")
});

/// Whether `text` contains a denylisted placeholder phrase.
pub fn contains_denylisted_phrase(text: &str) -> bool {
    DENYLIST_RE.is_match(text)
}

/// Reject text that is too short or reads like a filled-in template.
pub fn looks_templated(text: &str) -> bool {
    text.trim().chars().count() < MIN_AUTHENTIC_LENGTH || contains_denylisted_phrase(text)
}

/// Count string leaves anywhere in `value` that contain a denylisted phrase.
pub fn count_simulation_markers(value: &Value) -> usize {
    match value {
        Value::String(s) => usize::from(contains_denylisted_phrase(s)),
        Value::Array(items) => items.iter().map(count_simulation_markers).sum(),
        Value::Object(map) => map.values().map(count_simulation_markers).sum(),
        _ => 0,
    }
}

/// A mapping flagged with the fallback marker, or a sequence holding one.
pub fn is_fallback(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.get(FALLBACK_MARKER).and_then(Value::as_bool) == Some(true),
        Value::Array(items) => items
            .iter()
            .any(|item| item.is_object() && is_fallback(item)),
        _ => false,
    }
}

/// A mapping whose `status` is the emergency marker.
pub fn is_emergency(value: &Value) -> bool {
    value.get("status").and_then(Value::as_str) == Some(EMERGENCY_STATUS)
}

/// Falsy in the loose sense: null, `false`, or an empty string/list/mapping.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn hedge_phrases_are_templated() {
        assert!(looks_templated("Customized for your segment"));
        assert!(looks_templated(
            "Pain points based on typical behaviour of consumers in the market"
        ));
        assert!(looks_templated(
            "This is a Simulated answer that runs comfortably past thirty characters"
        ));
        assert!(looks_templated("Income: N/A for this respondent group overall"));
    }

    #[test]
    fn researched_text_passes() {
        assert!(!looks_templated(
            "Practitioners in this segment spend 40% more on specialized tooling per 2024 survey data"
        ));
    }

    #[test]
    fn short_text_is_templated() {
        assert!(looks_templated("Too short"));
        assert!(looks_templated("   padded   "));
    }

    #[test]
    fn counts_markers_across_nested_values() {
        let doc = json!({
            "avatar": {
                "painPoints": ["based on research", "real pain"],
                "desires": ["a generic wish"]
            },
            "insights": ["fine", {"note": "example of output"}],
            "score": 12
        });
        assert_eq!(count_simulation_markers(&doc), 3);
    }

    #[test]
    fn fallback_detection() {
        assert!(is_fallback(&json!({"fallbackMode": true})));
        assert!(!is_fallback(&json!({"fallbackMode": false})));
        assert!(is_fallback(&json!([{"a": 1}, {"fallbackMode": true}])));
        assert!(!is_fallback(&json!(["fallbackMode"])));
        assert!(is_emergency(&json!({"status": "EMERGENCY_MODE"})));
        assert!(!is_emergency(&json!({"status": "OK"})));
    }

    #[test]
    fn empty_values() {
        assert!(is_empty_value(&json!(null)));
        assert!(is_empty_value(&json!("  ")));
        assert!(is_empty_value(&json!([])));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!(false)));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!({"a": 1})));
    }
}
