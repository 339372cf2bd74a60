//! Minimal structural JSON Schema validation.
//!
//! Enough to check tool output against a declared `outputSchema` and
//! elicitation content against a `requestedSchema`: type keywords, required
//! properties, nested `properties`, array `items`, and `enum`. Pluggable via
//! the `SchemaValidator` trait for hosts that want a full implementation.

use serde_json::Value;

/// Validates a JSON value against a JSON Schema.
pub trait SchemaValidator: Send + Sync {
    /// `Err` carries a human-readable description of the first violation.
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), String>;
}

/// Default validator covering the structural subset of JSON Schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralSchemaValidator;

impl SchemaValidator for StructuralSchemaValidator {
    fn validate(&self, schema: &Value, instance: &Value) -> Result<(), String> {
        validate_against_schema(schema, instance, "$")
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn matches_type(expected: &str, instance: &Value) -> bool {
    match expected {
        "number" => instance.is_number(),
        "integer" => instance.is_i64() || instance.is_u64(),
        other => type_name(instance) == other,
    }
}

/// Recursive check. `path` is a JSON-pointer-ish location used in error
/// messages.
pub fn validate_against_schema(schema: &Value, instance: &Value, path: &str) -> Result<(), String> {
    let Some(schema_obj) = schema.as_object() else {
        // Boolean schemas: `true` accepts everything, `false` nothing.
        return match schema.as_bool() {
            Some(true) | None => Ok(()),
            Some(false) => Err(format!("{}: schema rejects all values", path)),
        };
    };

    if let Some(expected) = schema_obj.get("type").and_then(Value::as_str)
        && !matches_type(expected, instance)
    {
        return Err(format!(
            "{}: expected {}, got {}",
            path,
            expected,
            type_name(instance)
        ));
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(Value::as_array)
        && !allowed.contains(instance)
    {
        return Err(format!("{}: value not in enum", path));
    }

    if let Some(obj) = instance.as_object() {
        if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !obj.contains_key(name) {
                    return Err(format!("{}: missing required property '{}'", path, name));
                }
            }
        }
        if let Some(properties) = schema_obj.get("properties").and_then(Value::as_object) {
            for (name, prop_schema) in properties {
                if let Some(prop_value) = obj.get(name) {
                    validate_against_schema(
                        prop_schema,
                        prop_value,
                        &format!("{}.{}", path, name),
                    )?;
                }
            }
        }
    }

    if let Some(items) = instance.as_array()
        && let Some(item_schema) = schema_obj.get("items")
    {
        for (index, item) in items.iter().enumerate() {
            validate_against_schema(item_schema, item, &format!("{}[{}]", path, index))?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_and_required() {
        let schema = json!({
            "type": "object",
            "properties": {"message": {"type": "string"}},
            "required": ["message"]
        });
        let validator = StructuralSchemaValidator;
        assert!(validator.validate(&schema, &json!({"message": "hi"})).is_ok());

        let missing = validator.validate(&schema, &json!({})).unwrap_err();
        assert!(missing.contains("missing required property 'message'"));

        let wrong = validator.validate(&schema, &json!({"message": 5})).unwrap_err();
        assert!(wrong.contains("expected string"));
    }

    #[test]
    fn test_integer_vs_number() {
        let schema = json!({"type": "integer"});
        assert!(validate_against_schema(&schema, &json!(3), "$").is_ok());
        assert!(validate_against_schema(&schema, &json!(3.5), "$").is_err());
        assert!(validate_against_schema(&json!({"type": "number"}), &json!(3), "$").is_ok());
    }

    #[test]
    fn test_enum_and_array_items() {
        let schema = json!({"type": "array", "items": {"enum": ["a", "b"]}});
        assert!(validate_against_schema(&schema, &json!(["a", "b"]), "$").is_ok());
        let err = validate_against_schema(&schema, &json!(["a", "c"]), "$").unwrap_err();
        assert!(err.contains("[1]"));
    }

    #[test]
    fn test_nested_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "properties": {"age": {"type": "integer"}},
                    "required": ["age"]
                }
            }
        });
        let err =
            validate_against_schema(&schema, &json!({"user": {"age": "old"}}), "$").unwrap_err();
        assert!(err.contains("$.user.age"));
    }
}
