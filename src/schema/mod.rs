//! Model schemas
//!
//! Static description of the data models a script can manipulate. Schemas
//! come from the data store (or a YAML file) and are turned into the
//! read-only `ModelRegistry` once at interpreter start.

mod registry;

pub use registry::{ModelDescriptor, ModelRegistry};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Model '{0}' is declared more than once")]
    DuplicateModel(String),

    #[error("Model '{model}' has no field '{field}' (declared as {role})")]
    MissingField {
        model: String,
        field: String,
        role: &'static str,
    },

    #[error("Field '{model}.{field}' references unknown model '{target}'")]
    UnknownReference {
        model: String,
        field: String,
        target: String,
    },

    #[error("Field '{model}.{field}' is a foreign key without a `references` target")]
    MissingReference { model: String, field: String },

    #[error("Failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid schema file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage type of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Char,
    Text,
    Int,
    BigInt,
    Float,
    Bool,
    DateTime,
    ForeignKey,
    BackwardRelation,
    Json,
}

/// Semantic kind of a field, as far as scripts are concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Reference,
    Text,
    Numeric,
    Boolean,
    /// System-managed or structural fields scripts never fill in
    Ignorable,
}

impl FieldType {
    pub fn kind(self) -> FieldKind {
        match self {
            FieldType::Char | FieldType::Text | FieldType::DateTime => FieldKind::Text,
            FieldType::Int | FieldType::BigInt | FieldType::Float => FieldKind::Numeric,
            FieldType::Bool => FieldKind::Boolean,
            FieldType::ForeignKey => FieldKind::Reference,
            FieldType::BackwardRelation | FieldType::Json => FieldKind::Ignorable,
        }
    }

    /// Whether the field can serve as a human-readable identifier
    pub fn is_identifier_candidate(self) -> bool {
        matches!(self, FieldType::Char | FieldType::BigInt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Target model for foreign keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            references: None,
            nullable: false,
            default: None,
        }
    }

    pub fn references(mut self, target: impl Into<String>) -> Self {
        self.references = Some(target.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: JsonValue) -> Self {
        self.default = Some(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Explicit identifier field; derived from the fields when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub fields: Vec<FieldSchema>,
    /// Records a fresh store starts with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed: Vec<BTreeMap<String, JsonValue>>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl ModelSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        Self {
            name: name.into(),
            primary_key: default_primary_key(),
            identifier: None,
            fields,
            seed: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, field: impl Into<String>) -> Self {
        self.identifier = Some(field.into());
        self
    }

    pub fn with_seed(mut self, seed: Vec<BTreeMap<String, JsonValue>>) -> Self {
        self.seed = seed;
        self
    }
}

/// On-disk schema document (`config/models.yaml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    pub models: Vec<ModelSchema>,
}

impl SchemaFile {
    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }
}
