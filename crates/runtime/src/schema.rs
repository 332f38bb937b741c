//! Translation of remote tool input schemas into parameter descriptors.
//!
//! The remote host owns its schemas, so translation never fails: anything
//! that cannot be understood degrades to an optional `string` parameter, or
//! to no parameters at all when `properties` itself is unusable.

use std::collections::HashSet;

use serde_json::{Map, Value, json};
use tracing::warn;

/// Primitive type of a tool parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ParamKind {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ParamKind {
    /// Map a JSON Schema `type` tag; absent or unrecognized tags become `String`.
    pub fn from_type_tag(tag: Option<&str>) -> Self {
        match tag {
            Some("integer") => Self::Integer,
            Some("number") => Self::Float,
            Some("boolean") => Self::Boolean,
            _ => Self::String,
        }
    }

    /// The JSON Schema `type` tag for this kind.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: String,
}

/// Translate an input schema into parameters, in `properties` order.
pub fn translate(schema: &Value) -> Vec<ParameterSpec> {
    let properties = match schema.get("properties") {
        Some(Value::Object(properties)) => properties,
        Some(other) => {
            warn!(properties = %other, "ignoring malformed schema properties");
            return Vec::new();
        }
        None => return Vec::new(),
    };

    let required: HashSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    properties
        .iter()
        .map(|(name, property)| ParameterSpec {
            name: name.clone(),
            kind: ParamKind::from_type_tag(property.get("type").and_then(Value::as_str)),
            required: required.contains(name.as_str()),
            description: property
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

/// Render parameters back into an object schema for the model.
pub fn render(parameters: &[ParameterSpec]) -> Value {
    let properties: Map<String, Value> = parameters
        .iter()
        .map(|param| {
            let mut property = Map::new();
            property.insert("type".into(), param.kind.type_tag().into());
            if !param.description.is_empty() {
                property.insert("description".into(), param.description.clone().into());
            }
            (param.name.clone(), Value::Object(property))
        })
        .collect();

    let required: Vec<&str> = parameters
        .iter()
        .filter(|param| param.required)
        .map(|param| param.name.as_str())
        .collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
