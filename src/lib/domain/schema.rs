//! Structural description of an operation's accepted arguments.
//!
//! Capability servers advertise JSON Schema documents. Only the subset needed
//! to check a model's arguments is kept: top-level fields, their primitive
//! kind, whether they are required, and any enumerated values.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Any,
}

impl PrimitiveKind {
    fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            "object" => Some(Self::Object),
            _ => None,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ParameterField {
    pub name: String,
    pub kind: PrimitiveKind,
    pub required: bool,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub allowed: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ParameterSchema {
    pub fields: Vec<ParameterField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("arguments must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
    #[error("missing required argument '{field}'")]
    MissingField { field: String },
    #[error("argument '{field}' must be of type {expected}, got {found}")]
    WrongKind {
        field: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("argument '{field}' must be one of {allowed}")]
    NotAllowed { field: String, allowed: String },
}

impl ParameterSchema {
    /// Builds the structural description from a JSON Schema object.
    pub fn from_json_schema(schema: &Value) -> Self {
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return Self::default();
        };
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = properties
            .iter()
            .map(|(name, property)| {
                let (kind, nullable) = resolve_kind(property);
                ParameterField {
                    name: name.clone(),
                    kind,
                    required: required.contains(&name.as_str()),
                    nullable,
                    description: property
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    allowed: property
                        .get("enum")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                }
            })
            .collect();

        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&ParameterField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn required(&self) -> impl Iterator<Item = &ParameterField> {
        self.fields.iter().filter(|field| field.required)
    }

    /// Checks arguments against the description. Unknown fields are accepted;
    /// servers decide whether they matter.
    pub fn validate(&self, arguments: &Value) -> Result<(), SchemaViolation> {
        let empty = Map::new();
        let object = match arguments {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(SchemaViolation::NotAnObject {
                    found: value_kind(other),
                });
            }
        };

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required && !field.nullable => {
                    return Err(SchemaViolation::MissingField {
                        field: field.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) => {
                    if !field.kind.accepts(value) {
                        return Err(SchemaViolation::WrongKind {
                            field: field.name.clone(),
                            expected: field.kind.as_str(),
                            found: value_kind(value),
                        });
                    }
                    if !field.allowed.is_empty() && !field.allowed.contains(value) {
                        let allowed = serde_json::to_string(&field.allowed).unwrap_or_default();
                        return Err(SchemaViolation::NotAllowed {
                            field: field.name.clone(),
                            allowed,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn resolve_kind(property: &Value) -> (PrimitiveKind, bool) {
    match property.get("type") {
        Some(Value::String(name)) => (
            PrimitiveKind::from_type_name(name).unwrap_or(PrimitiveKind::Any),
            name == "null",
        ),
        Some(Value::Array(names)) => {
            let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
            let nullable = names.contains(&"null");
            let kind = names
                .iter()
                .filter(|name| **name != "null")
                .find_map(|name| PrimitiveKind::from_type_name(name))
                .unwrap_or(PrimitiveKind::Any);
            (kind, nullable)
        }
        _ => {
            // Optional fields from pydantic-style servers arrive as anyOf [T, null].
            let variants = property
                .get("anyOf")
                .or_else(|| property.get("oneOf"))
                .and_then(Value::as_array);
            match variants {
                Some(variants) => {
                    let mut nullable = false;
                    let mut kind = None;
                    for variant in variants {
                        match variant.get("type").and_then(Value::as_str) {
                            Some("null") => nullable = true,
                            Some(name) if kind.is_none() => {
                                kind = PrimitiveKind::from_type_name(name);
                            }
                            _ => {}
                        }
                    }
                    (kind.unwrap_or(PrimitiveKind::Any), nullable)
                }
                None => (PrimitiveKind::Any, false),
            }
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
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
