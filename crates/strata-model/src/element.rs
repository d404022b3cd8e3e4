// element.rs — A single architecture element inside a layer.
//
// Elements are plain value objects. Staged changes carry their before/after
// state as raw JSON field maps, so an element must round-trip through a
// `serde_json::Map` losslessly: unknown fields land in `extra` and survive.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ModelError;

/// A directed relationship from one element to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    /// Id of the element this relationship points at.
    pub target: String,

    /// Relationship kind (e.g., "serves", "realizes", "depends-on").
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// An architecture element (service, component, business process, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Element {
    /// Model-wide unique identifier.
    pub id: String,

    /// Element type within its layer (e.g., "service", "actor").
    #[serde(rename = "type", default)]
    pub element_type: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Free-form properties. Merged key-by-key on update.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,

    /// Any field not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    /// Create a minimal element.
    pub fn new(
        id: impl Into<String>,
        element_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            element_type: element_type.into(),
            name: name.into(),
            description: None,
            properties: Map::new(),
            relationships: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Set a property and return self (builder pattern).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Add a relationship and return self.
    pub fn with_relationship(mut self, target: impl Into<String>, kind: impl Into<String>) -> Self {
        self.relationships.push(Relationship {
            target: target.into(),
            kind: kind.into(),
        });
        self
    }

    /// Build an element from a raw field map.
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, ModelError> {
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Convert this element into a raw field map.
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct with named fields always serializes to an object.
            _ => Map::new(),
        }
    }

    /// Produce a new element with `overrides` laid over this one.
    ///
    /// Top-level fields are replaced, except `properties`, which is merged
    /// key-by-key. The id never changes.
    pub fn merge_fields(&self, overrides: &Map<String, Value>) -> Result<Self, ModelError> {
        let mut fields = self.to_fields();
        for (key, value) in overrides {
            if key == "id" {
                continue;
            }
            if key == "properties" {
                if let Value::Object(incoming) = value {
                    let entry = fields
                        .entry("properties".to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(existing) = entry {
                        for (k, v) in incoming {
                            existing.insert(k.clone(), v.clone());
                        }
                        continue;
                    }
                }
            }
            fields.insert(key.clone(), value.clone());
        }
        Self::from_fields(fields)
    }
}
