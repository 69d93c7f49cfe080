//! Declared input schemas for tools.
//!
//! These drive both the validator (coercion, defaults, closed-schema
//! checks) and the discovery surface (rendered as JSON Schema for
//! `tools/list`).

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

/// Declared type of one argument field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
    /// RFC 3339 timestamp, or a bare `YYYY-MM-DD` date taken as midnight UTC.
    Timestamp,
}

/// Declaration of a single argument field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub ty: FieldType,
    pub required: bool,
    /// Applied when an optional field is absent.
    pub default: Option<Value>,
    /// Closed value set; only meaningful for string fields.
    pub allowed_values: Option<&'static [&'static str]>,
    pub description: &'static str,
}

impl FieldSpec {
    pub fn required(ty: FieldType, description: &'static str) -> Self {
        Self {
            ty,
            required: true,
            default: None,
            allowed_values: None,
            description,
        }
    }

    pub fn optional(ty: FieldType, description: &'static str) -> Self {
        Self {
            ty,
            required: false,
            default: None,
            allowed_values: None,
            description,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_allowed(mut self, values: &'static [&'static str]) -> Self {
        self.allowed_values = Some(values);
        self
    }
}

/// Full input schema of a tool. Closed by default: undeclared fields are
/// rejected unless the tool opts into an open schema.
#[derive(Debug, Clone, Default)]
pub struct InputSchema {
    fields: BTreeMap<&'static str, FieldSpec>,
    open: bool,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, spec: FieldSpec) -> Self {
        self.fields.insert(name, spec);
        self
    }

    pub fn open(mut self) -> Self {
        self.open = true;
        self
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (*name, spec))
    }

    /// Render as a JSON Schema object for the discovery call.
    pub fn to_json_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for (name, spec) in self.fields() {
            let mut prop = Map::new();
            match spec.ty {
                FieldType::String => {
                    prop.insert("type".into(), json!("string"));
                }
                FieldType::Integer => {
                    prop.insert("type".into(), json!("integer"));
                }
                FieldType::Boolean => {
                    prop.insert("type".into(), json!("boolean"));
                }
                FieldType::Timestamp => {
                    prop.insert("type".into(), json!("string"));
                    prop.insert("format".into(), json!("date-time"));
                }
            }
            prop.insert("description".into(), json!(spec.description));
            if let Some(values) = spec.allowed_values {
                prop.insert("enum".into(), json!(values));
            }
            if let Some(default) = &spec.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(name.to_string(), Value::Object(prop));
            if spec.required {
                required.push(json!(name));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".into(), Value::Array(required));
        }
        schema.insert("additionalProperties".into(), json!(self.open));
        schema
    }
}
