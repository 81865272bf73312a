//! Structural validation of tool parameter schemas.
//!
//! Applied at tool-registration time to catch schema mistakes (missing
//! `"type": "object"`, orphan `"required"` keys, arrays without `"items"`)
//! without rejecting intentional freeform properties.

/// Validate a parameters schema. Returns a list of errors; empty means valid.
///
/// Rules:
/// 1. Top-level must have `"type": "object"`
/// 2. Top-level must have `"properties"` as an object
/// 3. Every key in `"required"` must exist in `"properties"`
/// 4. Nested objects follow the same rules recursively
/// 5. Array properties should have `"items"` defined
///
/// Properties without a `"type"` field are allowed (freeform/any-type).
pub fn validate_tool_schema(schema: &serde_json::Value, path: &str) -> Vec<String> {
    let mut errors = Vec::new();

    match schema.get("type").and_then(|t| t.as_str()) {
        Some("object") => {}
        Some(other) => {
            errors.push(format!("{path}: expected type \"object\", got \"{other}\""));
            return errors;
        }
        None => {
            errors.push(format!("{path}: missing \"type\": \"object\""));
            return errors;
        }
    }

    let properties = match schema.get("properties").and_then(|p| p.as_object()) {
        Some(p) => p,
        None => {
            errors.push(format!("{path}: missing or non-object \"properties\""));
            return errors;
        }
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str() {
                if !properties.contains_key(key) {
                    errors.push(format!(
                        "{path}: required key \"{key}\" not found in properties"
                    ));
                }
            }
        }
    }

    for (key, prop) in properties {
        let prop_path = format!("{path}.{key}");
        if let Some(prop_type) = prop.get("type").and_then(|t| t.as_str()) {
            match prop_type {
                "object" => {
                    errors.extend(validate_tool_schema(prop, &prop_path));
                }
                "array" => {
                    if let Some(items) = prop.get("items") {
                        if items.get("type").and_then(|t| t.as_str()) == Some("object") {
                            errors.extend(validate_tool_schema(
                                items,
                                &format!("{prop_path}.items"),
                            ));
                        }
                    } else {
                        errors.push(format!("{prop_path}: array property missing \"items\""));
                    }
                }
                _ => {}
            }
        }
    }

    errors
}

/// Validate execute-time arguments against a stored parameters schema.
///
/// Deliberately small: type checks per property, required-key presence, and
/// rejection of unknown keys. Full JSON Schema semantics are not needed for
/// the schemas this gateway stores, and a dependency-free checker keeps the
/// execute path fast.
pub fn validate_arguments(schema: &serde_json::Value, args: &serde_json::Value) -> Vec<String> {
    let mut errors = Vec::new();

    let args_obj = match args.as_object() {
        Some(obj) => obj,
        None => {
            errors.push("arguments must be a JSON object".to_string());
            return errors;
        }
    };

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str() {
                if !args_obj.contains_key(key) {
                    errors.push(format!("missing required argument \"{key}\""));
                }
            }
        }
    }

    for (key, value) in args_obj {
        let Some(prop) = properties.get(key) else {
            errors.push(format!("unknown argument \"{key}\""));
            continue;
        };
        let Some(expected) = prop.get("type").and_then(|t| t.as_str()) else {
            continue; // freeform property accepts any type
        };
        let matches = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        };
        if !matches {
            errors.push(format!("argument \"{key}\" should be of type {expected}"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Text to echo" },
                "count": { "type": "integer" }
            },
            "required": ["message"]
        })
    }

    #[test]
    fn valid_schema_passes() {
        assert!(validate_tool_schema(&message_schema(), "test").is_empty());
    }

    #[test]
    fn missing_type_fails() {
        let schema = serde_json::json!({ "properties": {} });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing \"type\": \"object\""));
    }

    #[test]
    fn orphan_required_key_fails() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name", "age"]
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"age\" not found in properties"));
    }

    #[test]
    fn array_without_items_fails() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "tags": { "type": "array" } }
        });
        let errors = validate_tool_schema(&schema, "test");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("array property missing \"items\""));
    }

    #[test]
    fn arguments_accepted_when_conforming() {
        let args = serde_json::json!({ "message": "hi", "count": 3 });
        assert!(validate_arguments(&message_schema(), &args).is_empty());
    }

    #[test]
    fn arguments_missing_required_rejected() {
        let args = serde_json::json!({ "count": 3 });
        let errors = validate_arguments(&message_schema(), &args);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing required argument \"message\""));
    }

    #[test]
    fn arguments_wrong_type_rejected() {
        let args = serde_json::json!({ "message": 42 });
        let errors = validate_arguments(&message_schema(), &args);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("should be of type string"));
    }

    #[test]
    fn unknown_argument_rejected() {
        let args = serde_json::json!({ "message": "hi", "bogus": true });
        let errors = validate_arguments(&message_schema(), &args);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown argument \"bogus\""));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let errors = validate_arguments(&message_schema(), &serde_json::json!([1, 2]));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn freeform_property_accepts_any_value() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "data": { "description": "Any JSON value" } }
        });
        assert!(validate_arguments(&schema, &serde_json::json!({ "data": [1, 2] })).is_empty());
        assert!(validate_arguments(&schema, &serde_json::json!({ "data": "x" })).is_empty());
    }
}
