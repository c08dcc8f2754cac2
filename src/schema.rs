//! JSON-schema descriptors for structured model output
//!
//! Each prompt family pairs its instruction with one of these descriptors.
//! The descriptor is sent to the backend to constrain generation and is
//! checked again by the gateway after every completion, since backends do
//! not reliably honor it.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema violation at '{path}': {reason}")]
pub struct SchemaViolation {
    pub path: String,
    pub reason: String,
}

impl SchemaViolation {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: if path.is_empty() { "$".to_string() } else { path.to_string() },
            reason: reason.into(),
        }
    }
}

/// Named JSON-schema document
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    name: &'static str,
    definition: Value,
}

impl ResponseSchema {
    pub fn new(name: &'static str, definition: Value) -> Self {
        Self { name, definition }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn definition(&self) -> &Value {
        &self.definition
    }

    /// `{html, explanation, changed}`, all required strings
    pub fn change() -> Self {
        Self::new(
            "change",
            json!({
                "type": "object",
                "properties": {
                    "html": { "type": "string" },
                    "explanation": { "type": "string" },
                    "changed": { "type": "string" }
                },
                "required": ["html", "explanation", "changed"]
            }),
        )
    }

    /// `{differentIndices: int[]}`
    pub fn pruning() -> Self {
        Self::new(
            "pruning",
            json!({
                "type": "object",
                "properties": {
                    "differentIndices": {
                        "type": "array",
                        "items": { "type": "integer" }
                    }
                },
                "required": ["differentIndices"]
            }),
        )
    }

    /// `{explanation}`
    pub fn explain() -> Self {
        Self::new(
            "explain",
            json!({
                "type": "object",
                "properties": {
                    "explanation": { "type": "string" }
                },
                "required": ["explanation"]
            }),
        )
    }

    /// Check `value` against the descriptor.
    ///
    /// Supports the subset the prompt families use: `type`, `properties`,
    /// `required` and `items`. Unknown keywords are ignored.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        validate_node(&self.definition, value, "")
    }
}

fn validate_node(schema: &Value, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    let schema = match schema.as_object() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(SchemaViolation::new(
                path,
                format!("expected {}, found {}", expected, type_name(value)),
            ));
        }
    }

    if let Value::Object(fields) = value {
        validate_object(schema, fields, path)?;
    }

    if let (Some(items), Value::Array(elements)) = (schema.get("items"), value) {
        for (idx, element) in elements.iter().enumerate() {
            validate_node(items, element, &format!("{}[{}]", path, idx))?;
        }
    }

    Ok(())
}

fn validate_object(
    schema: &Map<String, Value>,
    fields: &Map<String, Value>,
    path: &str,
) -> Result<(), SchemaViolation> {
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(name) {
                return Err(SchemaViolation::new(
                    path,
                    format!("missing required field '{}'", name),
                ));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, sub_schema) in properties {
            if let Some(field) = fields.get(name) {
                validate_node(sub_schema, field, &format!("{}.{}", path, name))?;
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
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
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
