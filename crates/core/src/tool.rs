//! Tool calls, tool results, and declared argument schemas.
//!
//! Every tool declares a [`ToolSchema`]: a typed field set with
//! required/optional markers and a side-effect class. The schema is both
//! what the language model sees (as JSON Schema) and what the dispatcher
//! validates arguments against before anything executes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request from the model to invoke a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub call_id: String,

    /// Name of the tool to execute
    pub tool_name: String,

    /// Arguments as a JSON value
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// The tool that produced it
    pub tool_name: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content (what the model reads)
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, output: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            success: true,
            output: output.into(),
            data,
        }
    }

    /// A failed dispatch, carried back to the model as an error description.
    pub fn error(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            success: false,
            output: format!("Error: {error}"),
            data: None,
        }
    }
}

/// Whether a tool only reads or also changes the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    PureQuery,
    Mutating,
}

/// The JSON type of a single argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
        }
    }
}

/// One declared argument field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: String,

    /// Allowed values for string fields, compared case-insensitively.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,

    /// Inclusive lower bound for numeric fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
}

impl FieldSpec {
    pub fn required(name: &str, kind: FieldKind, description: &str) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: description.into(),
            allowed: Vec::new(),
            minimum: None,
        }
    }

    pub fn optional(name: &str, kind: FieldKind, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn at_least(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }
}

/// The declared interface of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub side_effect: SideEffect,
    pub fields: Vec<FieldSpec>,
}

impl ToolSchema {
    /// Render the field set as a JSON Schema object.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = serde_json::json!({
                "type": field.kind.json_type(),
                "description": field.description,
            });
            if !field.allowed.is_empty() {
                prop["enum"] = serde_json::json!(field.allowed);
            }
            if let Some(min) = field.minimum {
                prop["minimum"] = serde_json::json!(min);
            }
            properties.insert(field.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Convert this schema into a ToolDefinition for sending to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.to_json_schema(),
        }
    }

    /// Validate call arguments against the declared fields.
    ///
    /// Returns the declared fields only; enumerated strings are normalized
    /// to their canonical (declared) spelling. Undeclared fields are dropped.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, ToolError> {
        let invalid = |reason: String| ToolError::SchemaValidation {
            tool: self.name.clone(),
            reason,
        };

        let empty = Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(invalid(format!(
                    "arguments must be a JSON object, got {}",
                    type_name(other)
                )));
            }
        };

        let mut validated = Map::new();
        for field in &self.fields {
            let value = match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(invalid(format!("missing required field '{}'", field.name)));
                }
                None | Some(Value::Null) => continue,
                Some(v) => v,
            };

            if !field.kind.matches(value) {
                return Err(invalid(format!(
                    "field '{}' must be {}, got {}",
                    field.name,
                    field.kind.json_type(),
                    type_name(value)
                )));
            }

            if let (Some(min), Some(n)) = (field.minimum, value.as_f64()) {
                if n < min as f64 {
                    return Err(invalid(format!(
                        "field '{}' must be at least {min}, got {n}",
                        field.name
                    )));
                }
            }

            let value = match (value.as_str(), field.allowed.is_empty()) {
                (Some(s), false) => {
                    let canonical = field
                        .allowed
                        .iter()
                        .find(|a| a.eq_ignore_ascii_case(s.trim()))
                        .ok_or_else(|| {
                            invalid(format!(
                                "field '{}' must be one of [{}], got '{s}'",
                                field.name,
                                field.allowed.join(", ")
                            ))
                        })?;
                    Value::String(canonical.clone())
                }
                _ => value.clone(),
            };

            validated.insert(field.name.clone(), value);
        }

        Ok(validated)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket_schema() -> ToolSchema {
        ToolSchema {
            name: "create_ticket".into(),
            description: "File a ticket".into(),
            side_effect: SideEffect::Mutating,
            fields: vec![
                FieldSpec::required("summary", FieldKind::String, "Issue summary"),
                FieldSpec::optional("severity", FieldKind::String, "Severity")
                    .one_of(&["low", "medium", "high"]),
                FieldSpec::optional("seats", FieldKind::Integer, "Seats").at_least(1),
            ],
        }
    }

    #[test]
    fn json_schema_lists_required_fields() {
        let schema = ticket_schema().to_json_schema();
        assert_eq!(schema["required"], json!(["summary"]));
        assert_eq!(schema["properties"]["severity"]["enum"], json!(["low", "medium", "high"]));
        assert_eq!(schema["properties"]["seats"]["minimum"], json!(1));
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = ticket_schema().validate(&json!({"severity": "high"})).unwrap_err();
        assert!(matches!(err, ToolError::SchemaValidation { .. }));
        assert!(err.to_string().contains("summary"));
    }

    #[test]
    fn wrong_type_is_rejected() {
        let err = ticket_schema().validate(&json!({"summary": 42})).unwrap_err();
        assert!(err.to_string().contains("must be string"));
    }

    #[test]
    fn enum_values_are_normalized() {
        let args = ticket_schema()
            .validate(&json!({"summary": "db down", "severity": "HIGH"}))
            .unwrap();
        assert_eq!(args["severity"], json!("high"));
    }

    #[test]
    fn enum_outside_allowed_set_is_rejected() {
        let err = ticket_schema()
            .validate(&json!({"summary": "db down", "severity": "critical"}))
            .unwrap_err();
        assert!(err.to_string().contains("one of"));
    }

    #[test]
    fn minimum_is_enforced() {
        let err = ticket_schema()
            .validate(&json!({"summary": "x", "seats": 0}))
            .unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn undeclared_fields_are_dropped() {
        let args = ticket_schema()
            .validate(&json!({"summary": "x", "priority": "p0"}))
            .unwrap();
        assert!(!args.contains_key("priority"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let err = ticket_schema().validate(&json!("summary")).unwrap_err();
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn error_result_carries_description() {
        let call = ToolCall::new("call_1", "create_ticket", json!({}));
        let result = ToolResult::error(&call, &ToolError::UnknownTool("nope".into()));
        assert!(!result.success);
        assert!(result.output.starts_with("Error:"));
        assert_eq!(result.call_id, "call_1");
    }
}
