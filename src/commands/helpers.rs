//! Common helpers for command handlers
//!
//! Argument extraction, default payloads for new records, value coercion
//! for updates, attachment storage and paginated replies.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::ScriptError;
use crate::host::{Attachment, Host, HostError, Reply};
use crate::schema::{FieldSchema, FieldType, ModelDescriptor, ModelRegistry};
use crate::script::value::{format_datetime, number_to_json};
use crate::script::{Payload, Value};
use crate::store::{fetch_by_identifier, DataStore, Fields};

/// Fields never filled in by `CREATE`
const SKIPPED_FIELDS: &[&str] = &["short_name"];

/// Default for big integer fields on new records
const BIG_INT_DEFAULT: i64 = 10_000_000_000_000_000; // 100^8

/// Name of the file long listings are sent as
pub const LISTING_FILENAME: &str = "output.txt";

// ============================================================================
// Argument Extraction
// ============================================================================

/// Model a value refers to, or an `UnknownModel` error listing valid names
pub fn expect_model(value: &Value, models: &ModelRegistry) -> Result<Arc<ModelDescriptor>, ScriptError> {
    value
        .as_model()
        .cloned()
        .ok_or_else(|| ScriptError::UnknownModel {
            name: value.text(),
            examples: models.examples(),
        })
}

/// Text of an optional argument, as written in the script
pub fn arg_text(args: &[Value], index: usize) -> Option<String> {
    args.get(index).map(Value::literal)
}

/// Text of a required argument; arity is checked before handlers run
pub fn required_text(args: &[Value], index: usize) -> Result<String, ScriptError> {
    arg_text(args, index)
        .ok_or_else(|| ScriptError::handler(format!("Missing argument {}", index + 1)))
}

/// Field of a model, with a hint towards `ATTRIBUTES` when it is missing
pub fn expect_field<'m>(model: &'m ModelDescriptor, name: &str) -> Result<&'m FieldSchema, ScriptError> {
    model.field(name).ok_or_else(|| {
        ScriptError::handler(format!(
            "{} has no field '{}'\nRun `ATTRIBUTES > {}` to list its fields.",
            model.name,
            name.to_lowercase(),
            model.name
        ))
    })
}

// ============================================================================
// Default Payload
// ============================================================================

/// Field values for a new record named `identifier`
pub async fn default_payload(
    store: &dyn DataStore,
    models: &ModelRegistry,
    model: &ModelDescriptor,
    identifier: &str,
) -> Result<Fields, ScriptError> {
    let mut fields = Fields::new();

    for field in &model.fields {
        if field.name == model.primary_key
            || field.nullable
            || field.default.is_some()
            || SKIPPED_FIELDS.contains(&field.name.as_str())
        {
            continue;
        }

        if field.name == model.identifier_field {
            fields.insert(field.name.clone(), identifier_json(field, identifier));
            continue;
        }

        let value = match field.field_type {
            FieldType::ForeignKey => {
                let target = field
                    .references
                    .as_deref()
                    .and_then(|name| models.get(name))
                    .ok_or_else(|| {
                        ScriptError::handler(format!("Could not find default {}", field.name))
                    })?;
                let first = store.first(&target).await?.ok_or_else(|| {
                    ScriptError::handler(format!("Could not find default {}", field.name))
                })?;
                JsonValue::from(first.pk)
            }
            FieldType::BigInt => JsonValue::from(BIG_INT_DEFAULT),
            FieldType::BackwardRelation | FieldType::Json => continue,
            FieldType::Bool => JsonValue::Bool(true),
            FieldType::Int => JsonValue::from(1),
            FieldType::Float => JsonValue::from(1.0),
            FieldType::DateTime => JsonValue::String(format_datetime(&chrono::Utc::now().naive_utc())),
            FieldType::Char | FieldType::Text => JsonValue::String("1".to_string()),
        };
        fields.insert(field.name.clone(), value);
    }

    Ok(fields)
}

fn identifier_json(field: &FieldSchema, identifier: &str) -> JsonValue {
    match field.field_type {
        FieldType::Int | FieldType::BigInt => identifier
            .parse::<i64>()
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(identifier.to_string())),
        _ => JsonValue::String(identifier.to_string()),
    }
}

// ============================================================================
// Value Coercion
// ============================================================================

/// Convert a script value into what `field` stores
pub async fn coerce_value(
    store: &dyn DataStore,
    models: &ModelRegistry,
    model: &ModelDescriptor,
    field: &FieldSchema,
    value: &Value,
) -> Result<JsonValue, ScriptError> {
    let target = value.target();

    if field.name == model.primary_key {
        return Err(ScriptError::handler(format!(
            "'{}' is managed by the store and cannot be changed",
            field.name
        )));
    }

    let mismatch = |expected: &str| {
        ScriptError::handler(format!(
            "'{}' expects {}, got `{}` ({})",
            field.name,
            expected,
            target.text(),
            target.kind()
        ))
    };

    match field.field_type {
        FieldType::Int | FieldType::BigInt => match target.payload {
            Payload::Number(n) if n.fract() == 0.0 => Ok(number_to_json(n)),
            _ => Err(mismatch("a whole number")),
        },
        FieldType::Float => match target.payload {
            Payload::Number(n) => Ok(number_to_json(n)),
            _ => Err(mismatch("a number")),
        },
        FieldType::Bool => match target.payload {
            Payload::Boolean(b) => Ok(JsonValue::Bool(b)),
            _ => Err(mismatch("true or false")),
        },
        FieldType::DateTime => match &target.payload {
            Payload::DateTime(dt) => Ok(JsonValue::String(format_datetime(dt))),
            _ => Err(mismatch("a date")),
        },
        FieldType::Char | FieldType::Text => Ok(JsonValue::String(target.literal())),
        FieldType::Json => Ok(target.to_json()),
        FieldType::ForeignKey => {
            let referenced = field
                .references
                .as_deref()
                .and_then(|name| models.get(name))
                .ok_or_else(|| mismatch("a reference"))?;

            if let Payload::Number(n) = target.payload {
                let pk = n as i64;
                return match store.get(&referenced, pk).await? {
                    Some(record) => Ok(JsonValue::from(record.pk)),
                    None => Err(ScriptError::NotFound {
                        identifier: target.literal(),
                        suggestion: None,
                    }),
                };
            }

            let record = fetch_by_identifier(store, &referenced, &target.literal()).await?;
            Ok(JsonValue::from(record.pk))
        }
        FieldType::BackwardRelation => Err(ScriptError::handler(format!(
            "'{}' is a reverse relation and cannot be set directly",
            field.name
        ))),
    }
}

// ============================================================================
// Media Files
// ============================================================================

fn filename_parts() -> &'static Regex {
    static FILENAME: OnceLock<Regex> = OnceLock::new();
    FILENAME.get_or_init(|| Regex::new(r"^(.+)(\.\S+)$").expect("filename pattern is valid"))
}

/// Save an attachment under `media_path` without overwriting anything.
/// Returns the value to store: the saved path with a leading `/`.
pub async fn save_attachment(media_path: &str, attachment: &Attachment) -> Result<String, ScriptError> {
    let captures = filename_parts()
        .captures(&attachment.filename)
        .ok_or_else(|| ScriptError::handler("The file you uploaded lacks an extension."))?;
    let stem = &captures[1];
    let extension = &captures[2];

    let dir = Path::new(media_path);
    tokio::fs::create_dir_all(dir).await?;

    let mut path = dir.join(&attachment.filename);
    let mut counter = 1;
    while tokio::fs::try_exists(&path).await? {
        path = dir.join(format!("{}-{}{}", stem, counter, extension));
        counter += 1;
    }

    tokio::fs::write(&path, &attachment.data).await?;
    tracing::info!("Saved attachment to {}", path.display());

    Ok(stored_media_path(&path))
}

fn stored_media_path(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let relative = text.trim_start_matches("./");
    if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("/{}", relative)
    }
}

/// File on disk a stored value points at, if any
pub fn media_file(value: &JsonValue) -> Option<PathBuf> {
    let text = value.as_str()?;
    let relative = text.strip_prefix('/')?;

    [PathBuf::from(relative), PathBuf::from(text)]
        .into_iter()
        .find(|candidate| !relative.is_empty() && candidate.is_file())
}

/// Read a media file into an attachment
pub async fn media_attachment(path: &Path) -> Result<Attachment, ScriptError> {
    let data = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(Attachment::new(filename, data))
}

// ============================================================================
// Pagination
// ============================================================================

/// Group lines into pages of at most `page_size` characters. A single line
/// longer than a page gets a page of its own.
pub fn split_pages(lines: &[String], page_size: usize) -> Vec<Vec<String>> {
    let mut pages: Vec<Vec<String>> = vec![Vec::new()];
    let mut length = 0;

    for line in lines {
        let line_length = line.chars().count() + 1;
        let current_is_empty = pages.last().map_or(true, |page| page.is_empty());
        if !current_is_empty && length + line_length > page_size {
            pages.push(Vec::new());
            length = 0;
        }
        length += line_length;
        if let Some(page) = pages.last_mut() {
            page.push(line.clone());
        }
    }

    pages
}

/// Send `lines` page by page. Between pages the user answers `more` to
/// continue or `file` to get everything as one attachment; anything else,
/// or no answer in time, stops paging.
pub async fn paginate(
    host: &dyn Host,
    lines: &[String],
    page_size: usize,
    timeout: Duration,
) -> Result<(), ScriptError> {
    let pages = split_pages(lines, page_size.max(1));
    let total = pages.len();

    for (index, page) in pages.iter().enumerate() {
        host.reply(Reply::text(page.join("\n"))).await?;

        let remaining = total - index - 1;
        if remaining == 0 {
            break;
        }

        let prompt = if remaining == 1 {
            "There is `1` page remaining.".to_string()
        } else {
            format!("There are `{}` pages remaining.", remaining)
        };
        let prompt = format!(
            "{} Type `more` to continue or `file` to send all messages in a file",
            prompt
        );

        let answer = match host.prompt_for_input(&prompt, timeout).await {
            Ok(answer) => answer,
            Err(HostError::Timeout { .. }) => break,
            Err(e) => return Err(e.into()),
        };

        match answer.trim().to_lowercase().as_str() {
            "more" => continue,
            "file" => {
                let reply = Reply::default()
                    .with_attachment(Attachment::new(LISTING_FILENAME, lines.join("\n")));
                host.reply(reply).await?;
                break;
            }
            _ => break,
        }
    }

    Ok(())
}
