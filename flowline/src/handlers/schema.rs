//! Minimal declared-options schema checking.
//!
//! Handlers may declare a small structural schema for their options:
//! a `type`, `required` keys and per-key `properties`, nested as needed.
//! Anything beyond that belongs in a handler's custom `validate` logic.

use crate::errors::ValidationError;
use serde_json::Value;

/// Checks a value against a declared schema.
///
/// Supported schema keys: `type` (`object`, `array`, `string`, `number`,
/// `integer`, `boolean`, `null`), `required` (list of keys, objects only),
/// `properties` (per-key sub-schemas, objects only), `items` (element
/// sub-schema, arrays only).
///
/// # Errors
///
/// Returns [`ValidationError`] naming the action and the first violation.
pub fn check_schema(action_id: &str, schema: &Value, value: &Value) -> Result<(), ValidationError> {
    check_at(action_id, "$", schema, value)
}

fn check_at(
    action_id: &str,
    path: &str,
    schema: &Value,
    value: &Value,
) -> Result<(), ValidationError> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(ValidationError::new(
                action_id,
                format!("expected {expected} at {path}, got {}", actual_type(value)),
            ));
        }
    }

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if value.get(key).is_none() {
                return Err(ValidationError::new(
                    action_id,
                    format!("missing required key '{key}' at {path}"),
                ));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, sub_schema) in properties {
            if let Some(sub_value) = value.get(key) {
                check_at(action_id, &format!("{path}.{key}"), sub_schema, sub_value)?;
            }
        }
    }

    if let Some(item_schema) = schema.get("items") {
        if let Some(items) = value.as_array() {
            for (index, item) in items.iter().enumerate() {
                check_at(action_id, &format!("{path}[{index}]"), item_schema, item)?;
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    }
}

fn actual_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_check() {
        let schema = json!({"type": "number"});
        assert!(check_schema("sleep", &schema, &json!(1.5)).is_ok());
        assert!(check_schema("sleep", &schema, &json!("1.5")).is_err());
    }

    #[test]
    fn test_required_keys() {
        let schema = json!({"type": "object", "required": ["script"]});
        assert!(check_schema("shell", &schema, &json!({"script": "ls"})).is_ok());

        let err = check_schema("shell", &schema, &json!({})).unwrap_err();
        assert!(err.message.contains("script"));
        assert_eq!(err.action_id, "shell");
    }

    #[test]
    fn test_nested_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "retries": {"type": "integer"},
                "target": {"type": "object", "required": ["host"]}
            }
        });

        assert!(check_schema(
            "deploy",
            &schema,
            &json!({"retries": 3, "target": {"host": "a"}})
        )
        .is_ok());

        let err =
            check_schema("deploy", &schema, &json!({"target": {"port": 22}})).unwrap_err();
        assert!(err.message.contains("host"));
        assert!(err.message.contains("$.target"));
    }

    #[test]
    fn test_array_items() {
        let schema = json!({"type": "array", "items": {"type": "string"}});
        assert!(check_schema("run", &schema, &json!(["a", "b"])).is_ok());

        let err = check_schema("run", &schema, &json!(["a", 2])).unwrap_err();
        assert!(err.message.contains("$[1]"));
    }
}
