//! Lightweight JSON-schema validation for tool inputs.
//!
//! Tool authors declare schemas next to their implementations (the
//! `inputSchema` contract); this module is the single validation seam
//! the registry calls. It covers the subset the builtin tools use:
//! `type`, `properties`, `required`, `enum`, plus array `items`.
//! Unknown keywords are ignored, unknown properties are allowed.

use serde_json::Value;

/// Validate `input` against `schema`. Returns per-field errors as
/// `(field_path, message)` pairs; empty means valid.
pub fn validate_input(schema: &Value, input: &Value) -> Vec<(String, String)> {
    let mut errors = Vec::new();
    validate_node(schema, input, "", &mut errors);
    errors
}

fn validate_node(schema: &Value, value: &Value, path: &str, errors: &mut Vec<(String, String)>) {
    let at = |field: &str| {
        if path.is_empty() {
            field.to_owned()
        } else if field.is_empty() {
            path.to_owned()
        } else {
            format!("{path}.{field}")
        }
    };

    if let Some(expected) = schema.get("type").and_then(|t| t.as_str()) {
        if !type_matches(expected, value) {
            errors.push((
                at(""),
                format!("expected {expected}, got {}", type_name(value)),
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(value_brief).collect();
            errors.push((at(""), format!("must be one of: {}", options.join(", "))));
            return;
        }
    }

    if let Some(obj) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for field in required.iter().filter_map(|f| f.as_str()) {
                if !obj.contains_key(field) {
                    errors.push((at(field), "required".to_owned()));
                }
            }
        }
        if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
            for (name, prop_schema) in props {
                if let Some(prop_value) = obj.get(name) {
                    validate_node(prop_schema, prop_value, &at(name), errors);
                }
            }
        }
    }

    if let (Some(items_schema), Some(items)) = (schema.get("items"), value.as_array()) {
        for (i, item) in items.iter().enumerate() {
            validate_node(items_schema, item, &at(&i.to_string()), errors);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn value_brief(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn calculator_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string" }
            },
            "required": ["expression"]
        })
    }

    #[test]
    fn valid_input_passes() {
        let errors = validate_input(&calculator_schema(), &json!({"expression": "2+2"}));
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_required_field() {
        let errors = validate_input(&calculator_schema(), &json!({}));
        assert_eq!(errors, vec![("expression".to_string(), "required".to_string())]);
    }

    #[test]
    fn wrong_type_reports_path() {
        let errors = validate_input(&calculator_schema(), &json!({"expression": 42}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "expression");
        assert!(errors[0].1.contains("expected string"));
    }

    #[test]
    fn top_level_type_mismatch() {
        let errors = validate_input(&calculator_schema(), &json!("not an object"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("expected object"));
    }

    #[test]
    fn enum_constraint() {
        let schema = json!({
            "type": "object",
            "properties": {
                "method": { "type": "string", "enum": ["GET", "POST"] }
            }
        });
        assert!(validate_input(&schema, &json!({"method": "GET"})).is_empty());
        let errors = validate_input(&schema, &json!({"method": "DELETE"}));
        assert_eq!(errors[0].0, "method");
        assert!(errors[0].1.contains("GET"));
    }

    #[test]
    fn nested_arrays_validate_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "rates": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["price_per_night"],
                        "properties": {
                            "price_per_night": { "type": "number" }
                        }
                    }
                }
            }
        });
        let errors = validate_input(
            &schema,
            &json!({"rates": [{"price_per_night": 100}, {"season": "high"}]}),
        );
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "rates.1.price_per_night");
    }

    #[test]
    fn multiple_errors_accumulate() {
        let schema = json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": {
                "c": { "type": "integer" }
            }
        });
        let errors = validate_input(&schema, &json!({"c": "nope"}));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn unknown_properties_are_allowed() {
        let errors = validate_input(
            &calculator_schema(),
            &json!({"expression": "1", "extra": true}),
        );
        assert!(errors.is_empty());
    }
}
