/*
    field_map.rs - Field maps describing how a view's fields are written back

    The hub describes each updateable field as an accessor:

        "name":     ["Name", [3]]
        "location": ["Location", [2], [4, "x"], [4, "y"]]

    The first element is the target property. Each following element is an
    argument descriptor:
        [1]        implicit true
        [2]        the document id
        [3]        the field value itself
        [4, "sub"] a named subfield of the field value

    The last descriptor supplies the command value, the others its arguments.
*/

use crate::errors::EncodingError;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// How one command argument (or the command value) is obtained
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgDescriptor {
    ImplicitTrue,
    DocumentId,
    Value,
    Subfield(String),
}

impl ArgDescriptor {
    /// Parse the `[code]` / `[4, "name"]` wire form
    pub fn from_wire(raw: &Value) -> Result<Self, EncodingError> {
        let parts = raw
            .as_array()
            .ok_or_else(|| EncodingError::MalformedAccessor(format!("descriptor {} is not an array", raw)))?;

        let code = parts
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| EncodingError::MalformedAccessor(format!("descriptor {} has no code", raw)))?;

        match code {
            1 => Ok(ArgDescriptor::ImplicitTrue),
            2 => Ok(ArgDescriptor::DocumentId),
            3 => Ok(ArgDescriptor::Value),
            4 => parts
                .get(1)
                .and_then(Value::as_str)
                .map(|name| ArgDescriptor::Subfield(name.to_string()))
                .ok_or_else(|| {
                    EncodingError::MalformedAccessor(format!("subfield descriptor {} has no name", raw))
                }),
            other => Err(EncodingError::IllegalCode(other)),
        }
    }

    pub fn to_wire(&self) -> Value {
        match self {
            ArgDescriptor::ImplicitTrue => json!([1]),
            ArgDescriptor::DocumentId => json!([2]),
            ArgDescriptor::Value => json!([3]),
            ArgDescriptor::Subfield(name) => json!([4, name]),
        }
    }

    /// Produce the argument for one element of `field` on document `id`
    pub fn resolve(&self, field: &str, id: &str, value: &Value) -> Result<Value, EncodingError> {
        match self {
            ArgDescriptor::ImplicitTrue => Ok(Value::Bool(true)),
            ArgDescriptor::DocumentId => Ok(Value::String(id.to_string())),
            ArgDescriptor::Value => Ok(value.clone()),
            ArgDescriptor::Subfield(name) => match value {
                Value::Object(fields) => Ok(fields.get(name).cloned().unwrap_or(Value::Null)),
                Value::Null => Ok(Value::Null),
                _ => Err(EncodingError::SubfieldOfScalar {
                    field: field.to_string(),
                    subfield: name.clone(),
                }),
            },
        }
    }
}

/// Target property plus the descriptors feeding its arguments and value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub property: String,
    pub descriptors: Vec<ArgDescriptor>,
}

impl Accessor {
    pub fn new(property: impl Into<String>, descriptors: Vec<ArgDescriptor>) -> Self {
        Self { property: property.into(), descriptors }
    }

    /// Names of the subfields this accessor reads from object values
    pub fn subfields(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().filter_map(|d| match d {
            ArgDescriptor::Subfield(name) => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn from_wire(raw: &[Value]) -> Result<Self, EncodingError> {
        let (head, rest) = raw
            .split_first()
            .ok_or_else(|| EncodingError::MalformedAccessor("empty accessor".to_string()))?;

        let property = head
            .as_str()
            .ok_or_else(|| EncodingError::MalformedAccessor(format!("property {} is not a string", head)))?;

        let descriptors = rest.iter().map(ArgDescriptor::from_wire).collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(property, descriptors))
    }

    pub fn to_wire(&self) -> Vec<Value> {
        std::iter::once(Value::String(self.property.clone()))
            .chain(self.descriptors.iter().map(ArgDescriptor::to_wire))
            .collect()
    }
}

impl Serialize for Accessor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Accessor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Value>::deserialize(deserializer)?;
        Accessor::from_wire(&raw).map_err(de::Error::custom)
    }
}

/// Logical field name to accessor, for one view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap {
    fields: BTreeMap<String, Accessor>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, accessor: Accessor) -> Self {
        self.fields.insert(name.into(), accessor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Accessor> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Accessor)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
