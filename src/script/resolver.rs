//! Value resolver
//!
//! Classifies one segment into exactly one [`Value`]. The order is fixed
//! and the first matching rule wins:
//!
//! 1. command group / flat command name (case-insensitive)
//! 2. keyword (`local`, `global`)
//! 3. variable reference (`$name`, looked up local then global)
//! 4. model name (case-insensitive)
//! 5. date/time (parses AND has at least two `-` or `/`)
//! 6. finite number
//! 7. boolean (`true` / `false`, any case)
//! 8. array `[a | b]`, elements resolved recursively
//! 9. map `{key > value | ...}`, values resolved recursively
//! 10. string
//!
//! A segment wholly wrapped in quotes skips the rules and is a string.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::segmenter::{split_top_level, unescape, Segment, DELIMITER};
use super::value::{Keyword, Payload, Value};
use super::variables::VariableStore;
use crate::commands::CommandRegistry;
use crate::error::ScriptError;
use crate::schema::ModelRegistry;

/// Marks a variable reference
pub const VARIABLE_SIGIL: char = '$';

/// Separates array elements and map entries
pub const ITEM_SEPARATOR: char = '|';

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Lookup tables needed to type the segments of one line
pub struct Resolver<'a> {
    line: usize,
    commands: &'a CommandRegistry,
    models: &'a ModelRegistry,
    variables: &'a VariableStore<'a>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        line: usize,
        commands: &'a CommandRegistry,
        models: &'a ModelRegistry,
        variables: &'a VariableStore<'a>,
    ) -> Self {
        Self {
            line,
            commands,
            models,
            variables,
        }
    }

    /// Resolve every segment of a line, stopping at the first failure
    pub fn resolve_all(&self, segments: &[Segment]) -> Result<Vec<Value>, ScriptError> {
        segments.iter().map(|segment| self.resolve(segment)).collect()
    }

    pub fn resolve(&self, segment: &Segment) -> Result<Value, ScriptError> {
        let raw = segment.raw();

        if segment.is_quoted() {
            return Ok(Value::new(raw, Payload::String(segment.literal())));
        }

        if self.commands.is_group(raw) {
            return Ok(Value::new(raw, Payload::CommandGroup(raw.to_uppercase())));
        }
        if self.commands.is_command(raw) {
            return Ok(Value::new(raw, Payload::Method(raw.to_uppercase())));
        }

        if let Some(keyword) = Keyword::parse(raw) {
            return Ok(Value::new(raw, Payload::Keyword(keyword)));
        }

        if let Some(name) = raw.strip_prefix(VARIABLE_SIGIL) {
            if !name.is_empty() {
                let value = self.variables.lookup(name)?;
                return Ok(Value::new(
                    raw,
                    Payload::Variable {
                        name: name.to_string(),
                        value: Box::new(value),
                    },
                ));
            }
        }

        if let Some(model) = self.models.get(raw) {
            return Ok(Value::new(raw, Payload::ModelRef(model)));
        }

        if let Some(dt) = parse_datetime(raw) {
            return Ok(Value::new(raw, Payload::DateTime(dt)));
        }

        if let Some(n) = parse_number(raw) {
            return Ok(Value::new(raw, Payload::Number(n)));
        }

        match raw.to_lowercase().as_str() {
            "true" => return Ok(Value::new(raw, Payload::Boolean(true))),
            "false" => return Ok(Value::new(raw, Payload::Boolean(false))),
            _ => {}
        }

        if let Some(inner) = wrapped(raw, '[', ']') {
            return self.resolve_array(raw, inner);
        }

        if let Some(inner) = wrapped(raw, '{', '}') {
            return self.resolve_map(raw, inner);
        }

        Ok(Value::new(raw, Payload::String(segment.literal())))
    }

    fn resolve_array(&self, raw: &str, inner: &str) -> Result<Value, ScriptError> {
        if inner.trim().is_empty() {
            return Ok(Value::new(raw, Payload::Array(Vec::new())));
        }

        let mut items = Vec::new();
        for (index, element) in split_top_level(inner, ITEM_SEPARATOR).into_iter().enumerate() {
            if element.is_empty() {
                return Err(self.parse_error(format!(
                    "element {} of `{}` is empty",
                    index + 1,
                    raw
                )));
            }
            items.push(self.resolve(&Segment::new(element))?);
        }

        Ok(Value::new(raw, Payload::Array(items)))
    }

    fn resolve_map(&self, raw: &str, inner: &str) -> Result<Value, ScriptError> {
        if inner.trim().is_empty() {
            return Ok(Value::new(raw, Payload::Map(Vec::new())));
        }

        let mut pairs = Vec::new();
        for entry in split_top_level(inner, ITEM_SEPARATOR) {
            let parts = split_top_level(&entry, DELIMITER);
            let (key, value) = match parts.as_slice() {
                [key, value] if !key.is_empty() && !value.is_empty() => (key, value),
                _ => {
                    return Err(self.parse_error(format!(
                        "map entry `{}` in `{}` must be `key > value`",
                        entry, raw
                    )))
                }
            };
            pairs.push((unescape(key), self.resolve(&Segment::new(value.as_str()))?));
        }

        Ok(Value::new(raw, Payload::Map(pairs)))
    }

    fn parse_error(&self, message: String) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            message,
        }
    }
}

fn wrapped(raw: &str, open: char, close: char) -> Option<&str> {
    raw.strip_prefix(open)?.strip_suffix(close)
}

/// Date/time recognition. Requires two separators so short numeric
/// tokens never read as dates.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let separators = text.chars().filter(|c| *c == '-' || *c == '/').count();
    if separators < 2 {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(text, fmt)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// Finite floating-point literal
pub fn parse_number(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}
