//! Raw-payload redaction for final reports.
//!
//! Bulk text (page bodies, HTML, raw search-result lists, link dumps) is
//! replaced by its size: a list becomes `<key>_count`, a string becomes
//! `<key>_length`, anything else is dropped. Keys are compared after
//! lowercasing and removing `_` and `-`, so `detailedResults`,
//! `detailed_results` and `Detailed-Results` are the same field.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde_json::{Map, Value};

/// Top-level keys copied verbatim by [`redact`].
pub const STRUCTURAL_KEYS: [&str; 3] = ["projectData", "pipelineStatus", "metadata"];

const RAW_FIELDS: [&str; 16] = [
    "extracted_content",
    "raw_content",
    "page_content",
    "html_content",
    "search_results",
    "urls_found",
    "links_extracted",
    "raw_response",
    "full_content",
    "content_preview",
    "detailed_results",
    "sources_raw",
    "extraction_details",
    "raw_data",
    "content_raw",
    "html_raw",
];

/// Narrower list applied to mappings inside sequences.
const ITEM_FIELDS: [&str; 4] = ["content", "raw_content", "html", "full_text"];

static RAW_KEYS: LazyLock<HashSet<String>> =
    LazyLock::new(|| RAW_FIELDS.iter().map(|k| normalize(k)).collect());

static ITEM_KEYS: LazyLock<HashSet<String>> =
    LazyLock::new(|| ITEM_FIELDS.iter().map(|k| normalize(k)).collect());

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Redact a whole report. Structural top-level keys pass through untouched.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                if STRUCTURAL_KEYS.contains(&key.as_str()) {
                    out.insert(key.clone(), v.clone());
                } else if RAW_KEYS.contains(&normalize(key)) {
                    replace_with_size(key, v, &mut out);
                } else {
                    out.insert(key.clone(), redact_value(v));
                }
            }
            Value::Object(out)
        }
        other => redact_value(other),
    }
}

/// Redact a section map (no structural bypass; section keys are stage names).
pub fn redact_sections(sections: &Map<String, Value>) -> Map<String, Value> {
    redact_map(sections, false)
}

fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map, false)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(redact_map(map, true)),
                    other => redact_value(other),
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

fn redact_map(map: &Map<String, Value>, list_item: bool) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, v) in map {
        let normalized = normalize(key);
        if RAW_KEYS.contains(&normalized) || (list_item && ITEM_KEYS.contains(&normalized)) {
            replace_with_size(key, v, &mut out);
        } else {
            out.insert(key.clone(), redact_value(v));
        }
    }
    out
}

fn replace_with_size(key: &str, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Array(items) => {
            out.insert(format!("{key}_count"), Value::from(items.len()));
        }
        Value::String(s) => {
            out.insert(format!("{key}_length"), Value::from(s.chars().count()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn replaces_raw_fields_with_sizes() {
        let report = json!({
            "webSearch": {
                "totalSources": 3,
                "detailedResults": [{"a": 1}, {"b": 2}],
                "raw_response": "abcdef",
                "extraction_details": {"x": 1}
            }
        });
        let out = redact(&report);
        assert_eq!(out["webSearch"]["detailedResults_count"], 2);
        assert_eq!(out["webSearch"]["raw_response_length"], 6);
        assert!(out["webSearch"].get("detailedResults").is_none());
        assert!(out["webSearch"].get("extraction_details").is_none());
        assert_eq!(out["webSearch"]["totalSources"], 3);
    }

    #[test]
    fn scrubs_item_fields_inside_lists_only() {
        let report = json!({
            "visualProofs": [
                {"title": "Proof", "content": "long body text", "fullText": "more"}
            ],
            "antiObjection": {"content": "kept at mapping level"}
        });
        let out = redact(&report);
        assert_eq!(out["visualProofs"][0]["content_length"], 14);
        assert_eq!(out["visualProofs"][0]["fullText_length"], 4);
        assert_eq!(out["visualProofs"][0]["title"], "Proof");
        assert_eq!(out["antiObjection"]["content"], "kept at mapping level");
    }

    #[test]
    fn structural_keys_bypass() {
        let report = json!({
            "projectData": {"raw_data": "keep me"},
            "pipelineStatus": {"executed": []},
            "metadata": {"search_results": [1, 2]},
            "insights": ["x"]
        });
        let out = redact(&report);
        assert_eq!(out["projectData"]["raw_data"], "keep me");
        assert_eq!(out["metadata"]["search_results"], json!([1, 2]));
        assert!(out.get("pipelineStatus").is_some());
    }

    fn arb_key() -> impl Strategy<Value = String> {
        prop_oneof![
            prop::sample::select(vec![
                "content",
                "rawContent",
                "detailed_results",
                "search-results",
                "html",
                "full_text",
                "title",
                "url",
                "metadata",
                "projectData",
            ])
            .prop_map(String::from),
            "[a-z_]{1,8}",
        ]
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 64, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map(arb_key(), inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn redaction_is_idempotent(value in arb_json()) {
            let once = redact(&value);
            prop_assert_eq!(redact(&once), once);
        }

        #[test]
        fn structural_keys_survive(inner in arb_json()) {
            let report = json!({
                "projectData": inner.clone(),
                "pipelineStatus": inner.clone(),
                "metadata": inner,
            });
            let out = redact(&report);
            for key in STRUCTURAL_KEYS {
                prop_assert_eq!(&out[key], &report[key]);
            }
        }
    }
}
