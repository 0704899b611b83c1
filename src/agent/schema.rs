//! Reduce MCP input schemas to what the model's function declarations accept

use serde_json::{Map, Value};

use crate::llm::FunctionDeclaration;
use crate::mcp::protocol::Tool;

/// JSON Schema keywords the generateContent API rejects
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "additionalProperties",
    "title",
    "default",
    "examples",
    "const",
    "pattern",
    "minLength",
    "maxLength",
];

/// Strip unsupported keywords, recursing through nested schemas.
///
/// Keys under `properties` are property names, not keywords, so they are
/// kept as-is and only their schemas are cleaned.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut clean = Map::new();
            for (key, value) in map {
                if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) {
                    continue;
                }
                let value = match (key.as_str(), value) {
                    ("properties", Value::Object(props)) => Value::Object(
                        props
                            .iter()
                            .map(|(name, prop)| (name.clone(), sanitize_schema(prop)))
                            .collect(),
                    ),
                    _ => sanitize_schema(value),
                };
                clean.insert(key.clone(), value);
            }
            Value::Object(clean)
        }
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}

/// Whether a schema declares at least one property
pub fn has_properties(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty())
}

/// Map an advertised tool to a function declaration
pub fn tool_declaration(tool: &Tool) -> FunctionDeclaration {
    let parameters = sanitize_schema(&tool.input_schema);
    FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        // An OBJECT with no properties is rejected, so such tools take none
        parameters: has_properties(&parameters).then_some(parameters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_removes_nested_keywords() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "title": "Arguments",
            "additionalProperties": false,
            "properties": {
                "title": {"type": "string", "title": "Title", "default": "x"},
                "days": {"type": "integer", "minimum": 1, "maximum": 14},
                "tags": {"type": "array", "items": {"type": "string", "maxLength": 8}}
            },
            "required": ["title"]
        });

        let clean = sanitize_schema(&schema);
        assert_eq!(
            clean,
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "days": {"type": "integer", "minimum": 1, "maximum": 14},
                    "tags": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title"]
            })
        );
    }

    #[test]
    fn test_tool_without_properties_has_no_parameters() {
        let tool = Tool {
            name: "ping".to_string(),
            description: "Health probe".to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
        };
        let declaration = tool_declaration(&tool);
        assert_eq!(declaration.name, "ping");
        assert!(declaration.parameters.is_none());
    }

    #[test]
    fn test_tool_declaration_keeps_properties() {
        let tool = Tool {
            name: "get_weather_alerts".to_string(),
            description: "Active alerts for a US state".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"state": {"type": "string", "description": "Two-letter code"}},
                "required": ["state"],
                "additionalProperties": false
            }),
        };
        let parameters = tool_declaration(&tool).parameters.unwrap();
        assert_eq!(parameters["required"], json!(["state"]));
        assert!(parameters.get("additionalProperties").is_none());
    }
}
