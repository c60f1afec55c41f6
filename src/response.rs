use serde_json::Value;
use tracing::warn;

/// Key holding the payload of read responses
pub const RESULTS_KEY: &str = "results";

/// Decode a raw response body. An empty body is an error like any other non-JSON input.
pub fn decode(body: &[u8]) -> serde_json::Result<Value> {
    serde_json::from_slice(body)
}

/// Whether a decoded value counts as present.
///
/// `null`, `false`, zero, and empty strings, arrays or objects are all empty.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Extract the `"results"` payload of a read response.
///
/// Returns `None` for an empty response, one without a `"results"` field, or
/// one whose `"results"` is `null`; an absent object and an empty query look
/// the same here.
pub fn into_results(value: Value) -> Option<Value> {
    if !is_truthy(&value) {
        return None;
    }
    match value {
        Value::Object(mut map) => {
            match map.remove(RESULTS_KEY) {
                Some(Value::Null) => None,
                Some(results) => Some(results),
                None => {
                    warn!(keys = ?map.keys().collect::<Vec<_>>(), "response has no results field");
                    None
                }
            }
        }
        other => {
            warn!(response = %other, "response is not a JSON object");
            None
        }
    }
}
