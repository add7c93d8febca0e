//! In-memory data store
//!
//! Tables keyed by canonical model name, rows kept in insertion order so
//! `first` and `list_identifiers` are stable.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

use super::{Condition, DataStore, Fields, Record, StoreError};
use crate::schema::{ModelDescriptor, ModelSchema, SchemaError, SchemaFile};
use crate::script::value::display_json;

#[derive(Debug, Default)]
struct Table {
    next_pk: i64,
    rows: Vec<Record>,
}

impl Table {
    fn insert(&mut self, model: &str, fields: Fields) -> Record {
        self.next_pk += 1;
        let record = Record {
            model: model.to_string(),
            pk: self.next_pk,
            fields,
        };
        self.rows.push(record.clone());
        record
    }

    fn position(&self, pk: i64) -> Option<usize> {
        self.rows.iter().position(|r| r.pk == pk)
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    schemas: Vec<ModelSchema>,
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryStore {
    /// Create a store for the given schemas, inserting their seed records
    pub fn new(schemas: Vec<ModelSchema>) -> Self {
        let mut tables = HashMap::new();
        for schema in &schemas {
            let mut table = Table::default();
            for seed in &schema.seed {
                table.insert(&schema.name, seed.clone());
            }
            tables.insert(schema.name.to_uppercase(), table);
        }

        tracing::debug!("In-memory store created with {} models", schemas.len());

        Self {
            schemas,
            tables: RwLock::new(tables),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        Ok(Self::new(SchemaFile::from_yaml(content)?.models))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        Ok(Self::new(SchemaFile::load(path)?.models))
    }

    /// Number of records currently stored for a model
    pub async fn count(&self, model: &str) -> usize {
        self.tables
            .read()
            .await
            .get(&model.to_uppercase())
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn check_field(model: &ModelDescriptor, field: &str) -> Result<(), StoreError> {
        if model.field(field).is_some() {
            Ok(())
        } else {
            Err(StoreError::UnknownField {
                model: model.display_name.clone(),
                field: field.to_string(),
            })
        }
    }
}

fn unknown_model(model: &ModelDescriptor) -> StoreError {
    StoreError::UnknownModel(model.display_name.clone())
}

fn identifier_of(model: &ModelDescriptor, record: &Record) -> String {
    record.identifier(model)
}

#[async_trait]
impl DataStore for InMemoryStore {
    fn schemas(&self) -> Vec<ModelSchema> {
        self.schemas.clone()
    }

    async fn list_identifiers(&self, model: &ModelDescriptor) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let table = tables.get(&model.name).ok_or_else(|| unknown_model(model))?;
        Ok(table
            .rows
            .iter()
            .map(|r| identifier_of(model, r))
            .collect())
    }

    async fn fetch(
        &self,
        model: &ModelDescriptor,
        identifier: &str,
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        let table = tables.get(&model.name).ok_or_else(|| unknown_model(model))?;
        Ok(table
            .rows
            .iter()
            .find(|r| identifier_of(model, r) == identifier)
            .cloned())
    }

    async fn get(&self, model: &ModelDescriptor, pk: i64) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        let table = tables.get(&model.name).ok_or_else(|| unknown_model(model))?;
        Ok(table.rows.iter().find(|r| r.pk == pk).cloned())
    }

    async fn create(&self, model: &ModelDescriptor, fields: Fields) -> Result<Record, StoreError> {
        for field in fields.keys() {
            Self::check_field(model, field)?;
        }

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&model.name)
            .ok_or_else(|| unknown_model(model))?;
        let record = table.insert(&model.display_name, fields);

        tracing::info!("Created {} #{}", model.display_name, record.pk);
        Ok(record)
    }

    async fn update(
        &self,
        model: &ModelDescriptor,
        pk: i64,
        field: &str,
        value: JsonValue,
    ) -> Result<JsonValue, StoreError> {
        Self::check_field(model, field)?;

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&model.name)
            .ok_or_else(|| unknown_model(model))?;
        let index = table.position(pk).ok_or_else(|| StoreError::RecordNotFound {
            model: model.display_name.clone(),
            pk,
        })?;

        tracing::info!(
            "Updated {} #{} {} = {}",
            model.display_name,
            pk,
            field,
            display_json(&value)
        );

        let old = table.rows[index]
            .fields
            .insert(field.to_string(), value)
            .unwrap_or(JsonValue::Null);
        Ok(old)
    }

    async fn delete(&self, model: &ModelDescriptor, pk: i64) -> Result<Record, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&model.name)
            .ok_or_else(|| unknown_model(model))?;
        let index = table.position(pk).ok_or_else(|| StoreError::RecordNotFound {
            model: model.display_name.clone(),
            pk,
        })?;

        tracing::info!("Deleted {} #{}", model.display_name, pk);
        Ok(table.rows.remove(index))
    }

    async fn filter(
        &self,
        model: &ModelDescriptor,
        condition: &Condition,
    ) -> Result<Vec<Record>, StoreError> {
        Self::check_field(model, &condition.field)?;

        let tables = self.tables.read().await;
        let table = tables.get(&model.name).ok_or_else(|| unknown_model(model))?;
        Ok(table
            .rows
            .iter()
            .filter(|r| condition.matches(r))
            .cloned()
            .collect())
    }

    async fn first(&self, model: &ModelDescriptor) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        let table = tables.get(&model.name).ok_or_else(|| unknown_model(model))?;
        Ok(table.rows.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptError;
    use crate::schema::{FieldSchema, FieldType, ModelRegistry};
    use crate::store::{fetch_by_identifier, FilterOp};
    use serde_json::json;

    fn fields(value: JsonValue) -> Fields {
        match value {
            JsonValue::Object(map) => map.into_iter().collect(),
            _ => Fields::new(),
        }
    }

    fn setup() -> (InMemoryStore, ModelRegistry) {
        let schemas = vec![ModelSchema::new(
            "Ball",
            vec![
                FieldSchema::new("id", FieldType::Int),
                FieldSchema::new("country", FieldType::Char),
                FieldSchema::new("health", FieldType::Int),
            ],
        )
        .with_seed(vec![fields(json!({"country": "France", "health": 5}))])];
        let registry = ModelRegistry::from_schemas(&schemas).unwrap();
        (InMemoryStore::new(schemas), registry)
    }

    #[tokio::test]
    async fn test_seed_and_crud() {
        let (store, models) = setup();
        let ball = models.get("BALL").unwrap();

        assert_eq!(store.list_identifiers(&ball).await.unwrap(), vec!["France"]);

        let spain = store
            .create(&ball, fields(json!({"country": "Spain", "health": 3})))
            .await
            .unwrap();
        assert_eq!(spain.pk, 2);

        let old = store.update(&ball, spain.pk, "health", json!(9)).await.unwrap();
        assert_eq!(old, json!(3));
        let fetched = store.fetch(&ball, "Spain").await.unwrap().unwrap();
        assert_eq!(fetched.get("health"), Some(&json!(9)));

        store.delete(&ball, spain.pk).await.unwrap();
        assert!(store.fetch(&ball, "Spain").await.unwrap().is_none());
        assert_eq!(store.count("ball").await, 1);
    }

    #[tokio::test]
    async fn test_unknown_field_rejected() {
        let (store, models) = setup();
        let ball = models.get("BALL").unwrap();

        let err = store.update(&ball, 1, "speed", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn test_filter_and_first() {
        let (store, models) = setup();
        let ball = models.get("BALL").unwrap();
        store
            .create(&ball, fields(json!({"country": "Finland", "health": 1})))
            .await
            .unwrap();

        let hits = store
            .filter(&ball, &Condition::new("country", FilterOp::StartsWith, json!("F")))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);

        let first = store.first(&ball).await.unwrap().unwrap();
        assert_eq!(first.get("country"), Some(&json!("France")));
    }

    #[tokio::test]
    async fn test_fetch_by_identifier_fuzzy() {
        let (store, models) = setup();
        let ball = models.get("BALL").unwrap();

        let found = fetch_by_identifier(&store, &ball, "France").await.unwrap();
        assert_eq!(found.pk, 1);

        match fetch_by_identifier(&store, &ball, "Fracne").await {
            Err(ScriptError::NotFound { suggestion, .. }) => {
                assert_eq!(suggestion.as_deref(), Some("France"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
