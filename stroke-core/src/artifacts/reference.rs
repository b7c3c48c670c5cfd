use serde_json::{Map, Value};

/// Key whose presence in an upload reference marks the upload as a thumbnail
/// artifact. Only presence matters, not the value.
pub const THUMBNAIL_REFERENCE_KEY: &str = "interactive_thumbnail";

/// Whether an upload's free-form reference string asks for artifact
/// handling. Absent, unparsable and non-object references all mean no.
pub fn requests_interactive_thumbnail(reference: Option<&str>) -> bool {
    let Some(raw) = reference else {
        return false;
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map.contains_key(THUMBNAIL_REFERENCE_KEY),
        _ => false,
    }
}

/// Reference attached to every upload produced by a thumbnail job.
pub fn thumbnail_reference() -> String {
    let mut map = Map::new();
    map.insert(THUMBNAIL_REFERENCE_KEY.to_string(), Value::Bool(true));
    Value::Object(map).to_string()
}
