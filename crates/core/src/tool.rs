//! Tool-call types and parameter schemas
//!
//! The model requests backend actions as tool calls; the dispatcher validates
//! arguments against a static schema before routing them. Validation failures
//! are surfaced as structured results, never as panics or errors, so the
//! conversation can continue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id for matching results back to the request
    pub call_id: String,
    /// Name of the tool to invoke
    pub tool_name: String,
    /// Arguments as a JSON object
    pub arguments: HashMap<String, Value>,
}

impl ToolCallRequest {
    /// Create a request with a generated call id
    pub fn new(tool_name: impl Into<String>, arguments: HashMap<String, Value>) -> Self {
        Self {
            call_id: uuid::Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
        }
    }

    /// Get argument as string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }

    /// Get argument as f64
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.arguments.get(key).and_then(|v| v.as_f64())
    }

    /// Get argument as an array of strings
    pub fn get_str_array(&self, key: &str) -> Option<Vec<String>> {
        self.arguments.get(key).and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
    }
}

/// Result of a dispatched tool call, returned to the generator stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// Correlation id copied from the request
    pub call_id: String,
    /// Whether the action succeeded
    pub success: bool,
    /// Structured payload for the model (always a JSON object)
    pub payload: Value,
    /// Human-readable summary the model can narrate
    pub message: String,
}

impl ToolCallResult {
    /// Successful result with a payload
    pub fn ok(call_id: impl Into<String>, payload: Value, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: true,
            payload,
            message: message.into(),
        }
    }

    /// Failed result with a descriptive message
    pub fn failure(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            payload: Value::Object(serde_json::Map::new()),
            message: message.into(),
        }
    }
}

/// Argument validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Missing required parameter: {0}")]
    MissingRequired(String),

    #[error("Parameter {name} must be a {expected}")]
    InvalidType { name: String, expected: &'static str },
}

/// Declared type of a tool parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    Number,
    Boolean,
    StringArray,
}

impl PropertyKind {
    fn json_type(&self) -> &'static str {
        match self {
            PropertyKind::String => "string",
            PropertyKind::Number => "number",
            PropertyKind::Boolean => "boolean",
            PropertyKind::StringArray => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            PropertyKind::String => value.is_string(),
            PropertyKind::Number => value.is_number(),
            PropertyKind::Boolean => value.is_boolean(),
            PropertyKind::StringArray => value
                .as_array()
                .map(|arr| arr.iter().all(|v| v.is_string()))
                .unwrap_or(false),
        }
    }
}

/// Schema for a single tool parameter
#[derive(Debug, Clone)]
pub struct PropertySchema {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub description: &'static str,
}

/// Parameter schema for one tool
#[derive(Debug, Clone)]
pub struct InputSchema {
    pub properties: &'static [PropertySchema],
    pub required: &'static [&'static str],
}

impl InputSchema {
    /// Validate arguments against the schema
    ///
    /// Checks that every required parameter is present and that every
    /// declared parameter that was provided has the declared type.
    /// Undeclared parameters are ignored.
    pub fn validate(&self, arguments: &HashMap<String, Value>) -> Result<(), ArgumentError> {
        for name in self.required {
            match arguments.get(*name) {
                Some(Value::Null) | None => {
                    return Err(ArgumentError::MissingRequired(name.to_string()))
                }
                Some(_) => {}
            }
        }

        for prop in self.properties {
            if let Some(value) = arguments.get(prop.name) {
                if !value.is_null() && !prop.kind.matches(value) {
                    return Err(ArgumentError::InvalidType {
                        name: prop.name.to_string(),
                        expected: prop.kind.json_type(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Render as a JSON-schema-style parameters object
    pub fn to_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for prop in self.properties {
            let schema = match prop.kind {
                PropertyKind::StringArray => serde_json::json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": prop.description,
                }),
                kind => serde_json::json!({
                    "type": kind.json_type(),
                    "description": prop.description,
                }),
            };
            properties.insert(prop.name.to_string(), schema);
        }

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
        })
    }
}

/// A statically registered tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: InputSchema,
}

impl ToolSpec {
    /// Render as a function-calling tool definition for the model
    pub fn definition_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.schema.to_json(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SCHEMA: InputSchema = InputSchema {
        properties: &[
            PropertySchema {
                name: "query",
                kind: PropertyKind::String,
                description: "search query",
            },
            PropertySchema {
                name: "max_price",
                kind: PropertyKind::Number,
                description: "maximum price",
            },
            PropertySchema {
                name: "brands",
                kind: PropertyKind::StringArray,
                description: "preferred brands",
            },
        ],
        required: &["query"],
    };

    #[test]
    fn test_validate_ok() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("laptop"));
        args.insert("max_price".to_string(), serde_json::json!(1500));
        assert!(TEST_SCHEMA.validate(&args).is_ok());
    }

    #[test]
    fn test_validate_missing_required() {
        let args = HashMap::new();
        let err = TEST_SCHEMA.validate(&args).unwrap_err();
        assert_eq!(err, ArgumentError::MissingRequired("query".to_string()));
    }

    #[test]
    fn test_validate_null_required_is_missing() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), Value::Null);
        assert!(matches!(
            TEST_SCHEMA.validate(&args),
            Err(ArgumentError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_validate_wrong_type() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("laptop"));
        args.insert("max_price".to_string(), serde_json::json!("cheap"));
        assert!(matches!(
            TEST_SCHEMA.validate(&args),
            Err(ArgumentError::InvalidType { .. })
        ));
    }

    #[test]
    fn test_validate_mixed_array_rejected() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("laptop"));
        args.insert("brands".to_string(), serde_json::json!(["Dell", 42]));
        assert!(TEST_SCHEMA.validate(&args).is_err());
    }

    #[test]
    fn test_schema_json_shape() {
        let json = TEST_SCHEMA.to_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["required"][0], "query");
        assert_eq!(json["properties"]["brands"]["type"], "array");
    }

    #[test]
    fn test_request_accessors() {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("chair"));
        args.insert("max_price".to_string(), serde_json::json!(250.0));
        args.insert("brands".to_string(), serde_json::json!(["Herman Miller"]));
        let req = ToolCallRequest::new("search_products", args);

        assert_eq!(req.get_str("query"), Some("chair"));
        assert_eq!(req.get_f64("max_price"), Some(250.0));
        assert_eq!(
            req.get_str_array("brands"),
            Some(vec!["Herman Miller".to_string()])
        );
        assert!(!req.call_id.is_empty());
    }
}
