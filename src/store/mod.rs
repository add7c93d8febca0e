//! Data-access façade
//!
//! The interpreter never touches storage directly. Every read and write goes
//! through [`DataStore`], keyed by the model descriptor the resolver
//! attached to the script's model reference.

pub mod fuzzy;
pub mod memory;

pub use fuzzy::{autocorrect, closest_match, SIMILARITY_CUTOFF};
pub use memory::InMemoryStore;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::error::ScriptError;
use crate::schema::{ModelDescriptor, ModelSchema};
use crate::script::value::display_json;

/// Field name to stored value
pub type Fields = BTreeMap<String, JsonValue>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Model '{0}' is not managed by this store")]
    UnknownModel(String),

    #[error("{model} #{pk} does not exist")]
    RecordNotFound { model: String, pk: i64 },

    #[error("'{field}' is not a field of {model}")]
    UnknownField { model: String, field: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// One stored instance of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Display name of the model
    pub model: String,
    pub pk: i64,
    pub fields: Fields,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    /// Human-readable value of the identifier field
    pub fn identifier(&self, model: &ModelDescriptor) -> String {
        if model.identifier_field == model.primary_key {
            return self.pk.to_string();
        }
        self.fields
            .get(&model.identifier_field)
            .map(display_json)
            .unwrap_or_default()
    }
}

/// Comparison used by the FILTER commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    #[default]
    Exact,
    Not,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    IContains,
    StartsWith,
    EndsWith,
}

impl FilterOp {
    pub const ALL: [FilterOp; 10] = [
        FilterOp::Exact,
        FilterOp::Not,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Contains,
        FilterOp::IContains,
        FilterOp::StartsWith,
        FilterOp::EndsWith,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Exact => "exact",
            FilterOp::Not => "not",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Contains => "contains",
            FilterOp::IContains => "icontains",
            FilterOp::StartsWith => "startswith",
            FilterOp::EndsWith => "endswith",
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FilterOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        FilterOp::ALL
            .into_iter()
            .find(|op| op.as_str() == lower)
            .ok_or_else(|| {
                let valid: Vec<&str> = FilterOp::ALL.iter().map(|op| op.as_str()).collect();
                format!("'{}' is not a valid operator ({})", s, valid.join(", "))
            })
    }
}

/// `field <op> value` predicate over records
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FilterOp, value: JsonValue) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Exact => loosely_equal(actual, &self.value),
            FilterOp::Not => !loosely_equal(actual, &self.value),
            FilterOp::Gt => compare(actual, &self.value) == Some(Ordering::Greater),
            FilterOp::Gte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt => compare(actual, &self.value) == Some(Ordering::Less),
            FilterOp::Lte => matches!(
                compare(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::Contains => display_json(actual).contains(&display_json(&self.value)),
            FilterOp::IContains => display_json(actual)
                .to_lowercase()
                .contains(&display_json(&self.value).to_lowercase()),
            FilterOp::StartsWith => display_json(actual).starts_with(&display_json(&self.value)),
            FilterOp::EndsWith => display_json(actual).ends_with(&display_json(&self.value)),
        }
    }
}

fn loosely_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b || display_json(a) == display_json(b),
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Persistence capability consumed by the interpreter
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Schemas of every model this store manages
    fn schemas(&self) -> Vec<ModelSchema>;

    /// All identifier values of a model, in storage order
    async fn list_identifiers(&self, model: &ModelDescriptor) -> Result<Vec<String>, StoreError>;

    /// Exact lookup on the identifier field
    async fn fetch(
        &self,
        model: &ModelDescriptor,
        identifier: &str,
    ) -> Result<Option<Record>, StoreError>;

    async fn get(&self, model: &ModelDescriptor, pk: i64) -> Result<Option<Record>, StoreError>;

    async fn create(&self, model: &ModelDescriptor, fields: Fields) -> Result<Record, StoreError>;

    /// Set one field, returning the previous value
    async fn update(
        &self,
        model: &ModelDescriptor,
        pk: i64,
        field: &str,
        value: JsonValue,
    ) -> Result<JsonValue, StoreError>;

    /// Remove a record, returning it
    async fn delete(&self, model: &ModelDescriptor, pk: i64) -> Result<Record, StoreError>;

    async fn filter(
        &self,
        model: &ModelDescriptor,
        condition: &Condition,
    ) -> Result<Vec<Record>, StoreError>;

    /// First record in storage order, if any
    async fn first(&self, model: &ModelDescriptor) -> Result<Option<Record>, StoreError>;
}

/// Find a record by a human identifier, correcting near misses into a
/// "did you mean" error
pub async fn fetch_by_identifier(
    store: &dyn DataStore,
    model: &ModelDescriptor,
    identifier: &str,
) -> Result<Record, ScriptError> {
    let identifiers = store.list_identifiers(model).await?;
    let corrected = autocorrect(identifier, &identifiers)?;

    store
        .fetch(model, &corrected)
        .await?
        .ok_or_else(|| ScriptError::NotFound {
            identifier: identifier.to_string(),
            suggestion: None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(fields: JsonValue) -> Record {
        let fields = match fields {
            JsonValue::Object(map) => map.into_iter().collect(),
            _ => Fields::new(),
        };
        Record {
            model: "Ball".to_string(),
            pk: 1,
            fields,
        }
    }

    #[test]
    fn test_filter_op_parse() {
        assert_eq!("ICONTAINS".parse::<FilterOp>().unwrap(), FilterOp::IContains);
        assert_eq!("gte".parse::<FilterOp>().unwrap(), FilterOp::Gte);
        let err = "like".parse::<FilterOp>().unwrap_err();
        assert!(err.contains("not a valid operator"));
    }

    #[test]
    fn test_condition_matching() {
        let rec = record(json!({"country": "France", "health": 5}));

        assert!(Condition::new("health", FilterOp::Exact, json!(5.0)).matches(&rec));
        assert!(Condition::new("health", FilterOp::Gt, json!(4)).matches(&rec));
        assert!(!Condition::new("health", FilterOp::Lt, json!(5)).matches(&rec));
        assert!(Condition::new("health", FilterOp::Lte, json!(5)).matches(&rec));
        assert!(Condition::new("country", FilterOp::IContains, json!("fran")).matches(&rec));
        assert!(!Condition::new("country", FilterOp::Contains, json!("fran")).matches(&rec));
        assert!(Condition::new("country", FilterOp::StartsWith, json!("Fr")).matches(&rec));
        assert!(Condition::new("country", FilterOp::Not, json!("Spain")).matches(&rec));
        assert!(!Condition::new("missing", FilterOp::Not, json!("x")).matches(&rec));
        // Mixed types never order
        assert!(!Condition::new("country", FilterOp::Gt, json!(1)).matches(&rec));
    }
}
