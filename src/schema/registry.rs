//! Model registry
//!
//! Built once from the store's schemas, read-only afterwards. Lookups are
//! case-insensitive; canonical names are uppercase.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::{FieldKind, FieldSchema, ModelSchema, SchemaError};

/// Static description of one model kind available to scripts
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDescriptor {
    /// Canonical uppercase name used in scripts
    pub name: String,
    /// Name as declared by the schema (e.g. "Ball")
    pub display_name: String,
    /// Field used to find and display instances by a human string
    pub identifier_field: String,
    pub primary_key: String,
    pub fields: Vec<FieldSchema>,
    pub field_kinds: BTreeMap<String, FieldKind>,
}

impl ModelDescriptor {
    pub fn from_schema(schema: &ModelSchema) -> Result<Self, SchemaError> {
        let identifier_field = match &schema.identifier {
            Some(field) => {
                if !schema.fields.iter().any(|f| &f.name == field) {
                    return Err(SchemaError::MissingField {
                        model: schema.name.clone(),
                        field: field.clone(),
                        role: "identifier",
                    });
                }
                field.clone()
            }
            None => schema
                .fields
                .iter()
                .find(|f| f.name != schema.primary_key && f.field_type.is_identifier_candidate())
                .map(|f| f.name.clone())
                .unwrap_or_else(|| schema.primary_key.clone()),
        };

        let field_kinds = schema
            .fields
            .iter()
            .map(|f| {
                let kind = if f.name == schema.primary_key {
                    FieldKind::Ignorable
                } else {
                    f.field_type.kind()
                };
                (f.name.clone(), kind)
            })
            .collect();

        Ok(Self {
            name: schema.name.to_uppercase(),
            display_name: schema.name.clone(),
            identifier_field,
            primary_key: schema.primary_key.clone(),
            fields: schema.fields.clone(),
            field_kinds,
        })
    }

    /// Whether instances are only named by their store-assigned key
    pub fn identified_by_key(&self) -> bool {
        self.identifier_field == self.primary_key
    }

    /// Look up a field by (case-insensitive) name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.field(name)
            .and_then(|f| self.field_kinds.get(&f.name).copied())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

/// All models known to the interpreter
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    /// Descriptors keyed by canonical uppercase name
    models: HashMap<String, Arc<ModelDescriptor>>,
    /// Canonical names in declaration order
    order: Vec<String>,
}

impl ModelRegistry {
    pub fn from_schemas(schemas: &[ModelSchema]) -> Result<Self, SchemaError> {
        let mut models = HashMap::new();
        let mut order = Vec::new();

        for schema in schemas {
            let descriptor = ModelDescriptor::from_schema(schema)?;
            if models.contains_key(&descriptor.name) {
                return Err(SchemaError::DuplicateModel(schema.name.clone()));
            }
            order.push(descriptor.name.clone());
            models.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        for schema in schemas {
            for field in &schema.fields {
                if field.field_type != super::FieldType::ForeignKey {
                    continue;
                }
                let target = field
                    .references
                    .as_ref()
                    .ok_or_else(|| SchemaError::MissingReference {
                        model: schema.name.clone(),
                        field: field.name.clone(),
                    })?;
                if !models.contains_key(&target.to_uppercase()) {
                    return Err(SchemaError::UnknownReference {
                        model: schema.name.clone(),
                        field: field.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        tracing::debug!("Model registry built with {} models", order.len());

        Ok(Self { models, order })
    }

    /// Case-insensitive lookup
    pub fn get(&self, name: &str) -> Option<Arc<ModelDescriptor>> {
        self.models.get(&name.to_uppercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(&name.to_uppercase())
    }

    /// Descriptors in declaration order
    pub fn all(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.order.iter().filter_map(|name| self.models.get(name))
    }

    pub fn names(&self) -> Vec<String> {
        self.all().map(|m| m.display_name.clone()).collect()
    }

    /// A few valid names, for "not a valid model" messages
    pub fn examples(&self) -> String {
        self.names()
            .into_iter()
            .take(3)
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
