//! Best-effort JSON extraction from free-text LLM responses.
//!
//! Models are asked to return a bare JSON array but routinely wrap it in
//! markdown fences or prose. Every analyzer funnels its response text
//! through here; a malformed response degrades to an empty list, never an
//! error.

use log::warn;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pull the JSON payload out of a response, tolerating ```json fences,
/// bare fences, and surrounding prose. Returns None when nothing parses.
pub fn extract_json(response: &str) -> Option<Value> {
    let candidate = strip_fences(response);

    if let Ok(value) = serde_json::from_str::<Value>(candidate.trim()) {
        return Some(value);
    }

    // Last resort: widest bracketed span in the raw text.
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&response[start..=end]).ok()
}

/// Extract a JSON array of objects. A single top-level object is wrapped;
/// anything unparseable yields an empty vec with a warning.
pub fn extract_array(response: &str) -> Vec<Value> {
    match extract_json(response) {
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) => vec![obj],
        Some(other) => {
            warn!("LLM response parsed to non-array JSON: {}", other);
            Vec::new()
        }
        None => {
            warn!(
                "Could not extract JSON from LLM response ({} chars)",
                response.len()
            );
            Vec::new()
        }
    }
}

/// Extract an array and deserialize each element, skipping elements that
/// do not fit `T`.
pub fn parse_items<T: DeserializeOwned>(response: &str) -> Vec<T> {
    extract_array(response)
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Skipping malformed LLM suggestion {}: {}", item, e);
                None
            }
        })
        .collect()
}

fn strip_fences(response: &str) -> &str {
    for marker in ["```json", "```"] {
        if let Some(open) = response.find(marker) {
            let rest = &response[open + marker.len()..];
            if let Some(close) = rest.find("```") {
                return &rest[..close];
            }
            return rest;
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Item {
        name: String,
        #[serde(default)]
        confidence: f64,
    }

    #[test]
    fn test_bare_array() {
        let items = extract_array(r#"[{"name": "a"}, {"name": "b"}]"#);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_json_fenced_array() {
        let response = "Here you go:\n```json\n[{\"name\": \"a\"}]\n```\nHope it helps!";
        let items = extract_array(response);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["name"], "a");
    }

    #[test]
    fn test_generic_fence() {
        let response = "```\n[{\"name\": \"x\"}]\n```";
        assert_eq!(extract_array(response).len(), 1);
    }

    #[test]
    fn test_prose_wrapped_array() {
        let response = "Based on the schema, I found: [{\"name\": \"a\"}] as discussed.";
        assert_eq!(extract_array(response).len(), 1);
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let items = extract_array(r#"{"name": "solo"}"#);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_garbage_degrades_to_empty() {
        assert!(extract_array("I'm sorry, I cannot analyze this schema.").is_empty());
        assert!(extract_array("").is_empty());
        assert!(extract_array("[not json at all}").is_empty());
    }

    #[test]
    fn test_parse_items_skips_malformed() {
        let response = r#"[
            {"name": "good", "confidence": 0.9},
            {"confidence": "not even close"},
            {"name": "also good"}
        ]"#;
        let items: Vec<Item> = parse_items(response);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "good");
        assert!((items[0].confidence - 0.9).abs() < 1e-9);
        assert_eq!(items[1].confidence, 0.0);
    }
}
