//! Payload extraction and text sanitizing.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Shown when a mapped JSON field is absent from the payload.
pub const MISSING_FIELD_MARKER: &str = "N/A";

/// Shown when a payload on a mapped topic does not parse as JSON.
pub const INVALID_JSON_MARKER: &str = "Invalid JSON";

/// Reduces a payload to its display string.
///
/// Topics with an entry in `json_fields` have their payload parsed as JSON
/// and replaced by the named field's value; unparseable payloads become
/// [`INVALID_JSON_MARKER`] and absent fields [`MISSING_FIELD_MARKER`]. A
/// payload that parses to something other than an object falls through to
/// the raw text, as does any topic without a mapping.
pub fn process_payload(
    json_fields: &HashMap<String, String>,
    topic: &str,
    payload: &str,
) -> String {
    let Some(field) = json_fields.get(topic) else {
        return payload.to_string();
    };

    match serde_json::from_str::<Value>(payload) {
        Err(e) => {
            debug!("Payload on {} is not valid JSON: {}", topic, e);
            INVALID_JSON_MARKER.to_string()
        }
        Ok(Value::Object(object)) => match object.get(field) {
            None => MISSING_FIELD_MARKER.to_string(),
            // Strings render without their JSON quotes.
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        },
        Ok(_) => {
            debug!(
                "Payload on {} is JSON but not an object, passing through raw",
                topic
            );
            payload.to_string()
        }
    }
}

/// Replaces NUL characters with spaces so the text is safe to hand to the
/// glyph renderer. Total over all inputs.
pub fn sanitize_text(text: &str) -> String {
    text.replace('\0', " ")
}
