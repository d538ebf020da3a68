//! Schema types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// JSON Schema type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
}

impl std::fmt::Display for JsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonType::String => write!(f, "string"),
            JsonType::Number => write!(f, "number"),
            JsonType::Integer => write!(f, "integer"),
            JsonType::Boolean => write!(f, "boolean"),
            JsonType::Object => write!(f, "object"),
            JsonType::Array => write!(f, "array"),
            JsonType::Null => write!(f, "null"),
        }
    }
}

/// JSON type can be a single type or array of types (for nullable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonTypeOrArray {
    Single(JsonType),
    Multiple(Vec<JsonType>),
}

impl JsonTypeOrArray {
    /// Check if this type is nullable
    pub fn is_nullable(&self) -> bool {
        self.contains(JsonType::Null)
    }

    /// Get the primary (non-null) type
    pub fn primary_type(&self) -> Option<JsonType> {
        match self {
            JsonTypeOrArray::Single(t) => Some(*t),
            JsonTypeOrArray::Multiple(types) => {
                types.iter().copied().find(|t| *t != JsonType::Null)
            }
        }
    }

    pub fn contains(&self, json_type: JsonType) -> bool {
        match self {
            JsonTypeOrArray::Single(t) => *t == json_type,
            JsonTypeOrArray::Multiple(types) => types.contains(&json_type),
        }
    }
}

impl Default for JsonTypeOrArray {
    fn default() -> Self {
        JsonTypeOrArray::Multiple(vec![JsonType::Null, JsonType::Object])
    }
}

/// JSON Schema property definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// Property type(s)
    #[serde(rename = "type")]
    pub json_type: JsonTypeOrArray,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Format hint (e.g., "date-time")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Nested properties (for objects)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaProperty>>,

    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<bool>,

    /// Array items schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaProperty>>,
}

impl SchemaProperty {
    /// Create a new property with the given type
    pub fn new(json_type: JsonType) -> Self {
        Self {
            json_type: JsonTypeOrArray::Single(json_type),
            description: None,
            format: None,
            properties: None,
            additional_properties: None,
            items: None,
        }
    }

    /// Create a nullable property
    pub fn nullable(json_type: JsonType) -> Self {
        Self {
            json_type: JsonTypeOrArray::Multiple(vec![JsonType::Null, json_type]),
            ..Self::new(json_type)
        }
    }

    /// Set format hint
    #[must_use]
    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    /// Declared as a string holding a `date-time`
    pub fn is_date_time(&self) -> bool {
        self.format.as_deref() == Some("date-time") && self.json_type.contains(JsonType::String)
    }
}

/// Full JSON Schema document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Schema type, usually `["null", "object"]`
    #[serde(rename = "type", default)]
    pub json_type: JsonTypeOrArray,

    /// Object properties
    #[serde(default)]
    pub properties: BTreeMap<String, SchemaProperty>,

    /// Allow additional properties
    #[serde(rename = "additionalProperties", default = "default_true")]
    pub additional_properties: bool,
}

fn default_true() -> bool {
    true
}

impl Default for JsonSchema {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonSchema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self {
            schema: None,
            json_type: JsonTypeOrArray::default(),
            properties: BTreeMap::new(),
            additional_properties: true,
        }
    }

    /// Add a property
    pub fn add_property(&mut self, name: &str, property: SchemaProperty) {
        self.properties.insert(name.to_string(), property);
    }

    /// Get a property
    pub fn get_property(&self, name: &str) -> Option<&SchemaProperty> {
        self.properties.get(name)
    }

    /// Names of the top-level properties
    pub fn field_names(&self) -> BTreeSet<String> {
        self.properties.keys().cloned().collect()
    }

    /// Convert to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
