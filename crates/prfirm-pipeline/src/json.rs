//! Lenient extraction of JSON objects from model replies.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pull the outermost JSON object out of `reply`.
///
/// Code fences and any prose around the object are ignored. Returns `None`
/// when no parseable object is present.
pub fn extract_object(reply: &str) -> Option<Value> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str::<Value>(&reply[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Deserialize the object in `reply` into `T`, or `None` if it does not fit.
pub fn parse_reply<T: DeserializeOwned>(reply: &str) -> Option<T> {
    extract_object(reply).and_then(|v| serde_json::from_value(v).ok())
}
