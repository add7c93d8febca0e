//! Resolved script values

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use crate::schema::ModelDescriptor;

/// Classification tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
    DateTime,
    ModelRef,
    Variable,
    Method,
    CommandGroup,
    Keyword,
    Array,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "STRING",
            ValueKind::Number => "NUMBER",
            ValueKind::Boolean => "BOOLEAN",
            ValueKind::DateTime => "DATETIME",
            ValueKind::ModelRef => "MODEL",
            ValueKind::Variable => "VARIABLE",
            ValueKind::Method => "METHOD",
            ValueKind::CommandGroup => "GROUP",
            ValueKind::Keyword => "KEYWORD",
            ValueKind::Array => "ARRAY",
            ValueKind::Map => "MAP",
        };
        write!(f, "{}", name)
    }
}

/// Variable scope keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Local,
    Global,
}

impl Keyword {
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_lowercase().as_str() {
            "local" => Some(Keyword::Local),
            "global" => Some(Keyword::Global),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Local => "LOCAL",
            Keyword::Global => "GLOBAL",
        }
    }
}

/// Language-native payload of a value
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    String(String),
    Number(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    ModelRef(Arc<ModelDescriptor>),
    /// A `$name` reference, already looked up
    Variable { name: String, value: Box<Value> },
    Method(String),
    CommandGroup(String),
    Keyword(Keyword),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

/// A typed, resolved segment
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    /// Original segment text
    pub raw: String,
    pub payload: Payload,
}

impl Value {
    pub fn new(raw: impl Into<String>, payload: Payload) -> Self {
        Self {
            raw: raw.into(),
            payload,
        }
    }

    /// Plain string value whose raw text is the string itself
    pub fn string(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(text.clone(), Payload::String(text))
    }

    pub fn number(n: f64) -> Self {
        Self::new(format_number(n), Payload::Number(n))
    }

    pub fn boolean(b: bool) -> Self {
        Self::new(b.to_string(), Payload::Boolean(b))
    }

    pub fn kind(&self) -> ValueKind {
        match &self.payload {
            Payload::String(_) => ValueKind::String,
            Payload::Number(_) => ValueKind::Number,
            Payload::Boolean(_) => ValueKind::Boolean,
            Payload::DateTime(_) => ValueKind::DateTime,
            Payload::ModelRef(_) => ValueKind::ModelRef,
            Payload::Variable { .. } => ValueKind::Variable,
            Payload::Method(_) => ValueKind::Method,
            Payload::CommandGroup(_) => ValueKind::CommandGroup,
            Payload::Keyword(_) => ValueKind::Keyword,
            Payload::Array(_) => ValueKind::Array,
            Payload::Map(_) => ValueKind::Map,
        }
    }

    /// Auxiliary data: the identifier field of a model reference
    pub fn aux(&self) -> Option<&str> {
        match &self.payload {
            Payload::ModelRef(model) => Some(model.identifier_field.as_str()),
            _ => None,
        }
    }

    /// The value a variable reference points at (itself otherwise)
    pub fn target(&self) -> &Value {
        match &self.payload {
            Payload::Variable { value, .. } => value.target(),
            _ => self,
        }
    }

    pub fn into_target(self) -> Value {
        match self.payload {
            Payload::Variable { value, .. } => value.into_target(),
            _ => self,
        }
    }

    pub fn as_model(&self) -> Option<&Arc<ModelDescriptor>> {
        match &self.target().payload {
            Payload::ModelRef(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.target().payload {
            Payload::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.target().payload {
            Payload::Boolean(b) => Some(b),
            _ => None,
        }
    }

    /// Human text of the value: string contents, formatted numbers,
    /// model names, the raw text for everything else
    pub fn text(&self) -> String {
        match &self.payload {
            Payload::String(s) => s.clone(),
            Payload::Number(n) => format_number(*n),
            Payload::Boolean(b) => b.to_string(),
            Payload::DateTime(dt) => format_datetime(dt),
            Payload::ModelRef(model) => model.display_name.clone(),
            Payload::Variable { value, .. } => value.text(),
            Payload::Method(_)
            | Payload::CommandGroup(_)
            | Payload::Keyword(_)
            | Payload::Array(_)
            | Payload::Map(_) => self.raw.clone(),
        }
    }

    /// The text as written: string contents for strings, the source text
    /// for everything else. Variables yield their target's text.
    pub fn literal(&self) -> String {
        match &self.payload {
            Payload::String(s) => s.clone(),
            Payload::Variable { value, .. } => value.literal(),
            _ => self.raw.clone(),
        }
    }

    /// Storage representation
    pub fn to_json(&self) -> JsonValue {
        match &self.payload {
            Payload::String(s) => JsonValue::String(s.clone()),
            Payload::Number(n) => number_to_json(*n),
            Payload::Boolean(b) => JsonValue::Bool(*b),
            Payload::DateTime(dt) => JsonValue::String(format_datetime(dt)),
            Payload::ModelRef(model) => JsonValue::String(model.display_name.clone()),
            Payload::Variable { value, .. } => value.to_json(),
            Payload::Method(s) | Payload::CommandGroup(s) => JsonValue::String(s.clone()),
            Payload::Keyword(k) => JsonValue::String(k.as_str().to_string()),
            Payload::Array(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Payload::Map(pairs) => {
                let object: JsonMap<String, JsonValue> = pairs
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect();
                JsonValue::Object(object)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Integral numbers print without a fractional part
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub fn format_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        JsonValue::from(n as i64)
    } else {
        JsonNumber::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

/// Render a stored field value for display
pub fn display_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "None".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
