//! Declarative argument schemas for tools and prompts.
//!
//! A schema is built once when its tool is constructed and is then used
//! both to advertise the tool (as JSON Schema) and to validate incoming
//! arguments before the tool body runs.

use crate::error::{ToolError, ToolResult};
use serde_json::{json, Map, Value};

/// The JSON type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
    Integer,
    Array,
}

impl FieldKind {
    fn json_type(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Array => "array",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Array => value.is_array(),
        }
    }
}

/// One named argument.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub description: &'static str,
    pub required: bool,
    pub default: Option<Value>,
    /// JSON Schema of array items.
    pub items: Option<Value>,
}

impl FieldSpec {
    fn new(name: &'static str, kind: FieldKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
            default: None,
            items: None,
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::String, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, FieldKind::Integer, description)
    }

    pub fn array(name: &'static str, description: &'static str, items: Value) -> Self {
        Self {
            items: Some(items),
            ..Self::new(name, FieldKind::Array, description)
        }
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the argument is absent.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Name, description and arguments of a tool.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: Vec<FieldSpec>,
}

/// Prompts declare their arguments the same way tools do.
pub type PromptSchema = ToolSchema;

impl ToolSchema {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            fields: Vec::new(),
        }
    }

    /// Add an argument.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// JSON Schema object describing the arguments.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut property = json!({
                "type": field.kind.json_type(),
                "description": field.description,
            });
            if let Some(default) = &field.default {
                property["default"] = default.clone();
            }
            if let Some(items) = &field.items {
                property["items"] = items.clone();
            }
            properties.insert(field.name.to_string(), property);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Argument list in the shape MCP uses for prompts.
    pub fn to_prompt_arguments(&self) -> Value {
        Value::Array(
            self.fields
                .iter()
                .map(|f| {
                    json!({
                        "name": f.name,
                        "description": f.description,
                        "required": f.required,
                    })
                })
                .collect(),
        )
    }

    /// Check `args` against the schema and fill in defaults.
    ///
    /// Returns only the declared arguments. Required string arguments must
    /// not be blank.
    pub fn validate(&self, args: &Value) -> ToolResult<Map<String, Value>> {
        let empty = Map::new();
        let given = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ToolError::validation("Arguments must be an object")),
        };

        let mut normalized = Map::new();
        for field in &self.fields {
            match given.get(field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(ToolError::validation(format!(
                            "Missing required argument: {}",
                            field.name
                        )));
                    }
                    if let Some(default) = &field.default {
                        normalized.insert(field.name.to_string(), default.clone());
                    }
                }
                Some(value) => {
                    if !field.kind.accepts(value) {
                        return Err(ToolError::validation(format!(
                            "Argument {} must be {} {}",
                            field.name,
                            if matches!(field.kind, FieldKind::Integer | FieldKind::Array) {
                                "an"
                            } else {
                                "a"
                            },
                            field.kind.json_type()
                        )));
                    }
                    if field.required && value.as_str().is_some_and(|s| s.trim().is_empty()) {
                        return Err(ToolError::validation(format!(
                            "Argument {} must not be empty",
                            field.name
                        )));
                    }
                    normalized.insert(field.name.to_string(), value.clone());
                }
            }
        }
        Ok(normalized)
    }
}
