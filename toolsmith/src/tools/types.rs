//! Tool records as the persistence layer stores them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use std::fmt;

/// Declared JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    #[default]
    Any,
}

impl ParamType {
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Any => true,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// A parameter with a default is optional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl ToolParameter {
    pub fn required(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            description: String::new(),
            default: None,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, default: JsonValue) -> Self {
        Self {
            default: Some(default),
            ..Self::required(name, param_type)
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// A tenant's tool definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub id: String,
    #[serde(default)]
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameter_list: Vec<ToolParameter>,
    pub source_text: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default)]
    pub validation_errors: Option<Vec<String>>,
}

impl ToolSpec {
    pub fn new(id: &str, tenant_id: &str, name: &str, source_text: &str) -> Self {
        Self {
            id: id.to_string(),
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            description: String::new(),
            parameter_list: Vec::new(),
            source_text: source_text.to_string(),
            validated: false,
            validation_errors: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<ToolParameter>) -> Self {
        self.parameter_list = parameters;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Digest of everything that affects compilation. Validation state does
    /// not count.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source_text.as_bytes());
        hasher.update([0u8]);
        for param in &self.parameter_list {
            hasher.update(param.name.as_bytes());
            hasher.update(param.param_type.as_str().as_bytes());
            if let Some(default) = &param.default {
                hasher.update(default.to_string().as_bytes());
            }
            hasher.update([0u8]);
        }
        hasher
            .finalize()
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect()
    }

    /// JSON schema describing the tool's arguments.
    pub fn input_schema(&self) -> JsonValue {
        input_schema(&self.parameter_list)
    }
}

pub fn input_schema(parameters: &[ToolParameter]) -> JsonValue {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let mut property = Map::new();
        if param.param_type != ParamType::Any {
            property.insert("type".into(), json!(param.param_type.as_str()));
        }
        if !param.description.is_empty() {
            property.insert("description".into(), json!(param.description));
        }
        if let Some(default) = &param.default {
            property.insert("default".into(), default.clone());
        }
        properties.insert(param.name.clone(), JsonValue::Object(property));
        if param.is_required() {
            required.push(json!(param.name));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_param_type_accepts() {
        assert!(ParamType::Integer.accepts(&json!(3)));
        assert!(!ParamType::Integer.accepts(&json!(3.5)));
        assert!(ParamType::Number.accepts(&json!(3)));
        assert!(ParamType::Any.accepts(&json!(null)));
        assert!(!ParamType::String.accepts(&json!(1)));
    }

    #[test]
    fn test_fingerprint_tracks_source_not_validation_state() {
        let spec = ToolSpec::new("t1", "acme", "hello", "return 1");
        let mut validated = spec.clone();
        validated.validated = true;
        assert_eq!(spec.fingerprint(), validated.fingerprint());

        let changed = ToolSpec::new("t1", "acme", "hello", "return 2");
        assert_ne!(spec.fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_input_schema() {
        let spec = ToolSpec::new("t1", "acme", "greet", "return name").with_parameters(vec![
            ToolParameter::required("name", ParamType::String),
            ToolParameter::optional("times", ParamType::Integer, json!(1)),
        ]);
        assert_eq!(
            spec.input_schema(),
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "times": {"type": "integer", "default": 1},
                },
                "required": ["name"],
            })
        );
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: ToolSpec = serde_json::from_value(json!({
            "id": "t1",
            "name": "hello",
            "source_text": "return \"hello\"",
            "parameter_list": [{"name": "who", "type": "string", "default": "world"}],
        }))
        .expect("valid spec");
        assert_eq!(spec.tenant_id, "");
        assert!(!spec.validated);
        assert!(!spec.parameter_list[0].is_required());
    }
}
