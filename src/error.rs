//! Error handling for DexScript
//!
//! Every failure a script can hit is a `ScriptError` variant. The
//! interpreter catches them at the dispatch boundary and wraps them in a
//! `LineError` carrying the offending line, so nothing escapes to the host.

use thiserror::Error;

use crate::host::HostError;
use crate::schema::SchemaError;
use crate::settings::SettingsError;
use crate::store::StoreError;

/// Main error type for script parsing, resolution and execution
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("'{token}' is not a valid command.{}", did_you_mean(.suggestion))]
    UnknownCommand {
        token: String,
        suggestion: Option<String>,
    },

    #[error(
        "'{name}' is not a valid model\nMake sure you check your capitalization (e.g. {examples})"
    )]
    UnknownModel { name: String, examples: String },

    #[error("'{0}' is an unknown variable.")]
    UnknownVariable(String),

    #[error(
        "Argument missing when calling '{command}' ({usage}): expected at least {expected}, found {found}."
    )]
    Arity {
        command: String,
        usage: String,
        expected: usize,
        found: usize,
    },

    #[error(
        "Too many arguments when calling '{command}' ({usage}): expected at most {expected}, found {found}."
    )]
    TooManyArguments {
        command: String,
        usage: String,
        expected: usize,
        found: usize,
    },

    #[error("'{identifier}' does not exist.{}", did_you_mean(.suggestion))]
    NotFound {
        identifier: String,
        suggestion: Option<String>,
    },

    #[error("{0}")]
    Handler(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScriptError {
    /// Shorthand for domain failures raised inside a command handler
    pub fn handler(message: impl Into<String>) -> Self {
        ScriptError::Handler(message.into())
    }

    /// Stable name of the error category, used in diagnostics
    pub fn category(&self) -> &'static str {
        match self {
            ScriptError::Parse { .. } => "ParseError",
            ScriptError::UnknownCommand { .. } => "UnknownCommandError",
            ScriptError::UnknownModel { .. } => "UnknownModelError",
            ScriptError::UnknownVariable(_) => "UnknownVariableError",
            ScriptError::Arity { .. } | ScriptError::TooManyArguments { .. } => "ArityError",
            ScriptError::NotFound { .. } => "NotFoundError",
            ScriptError::Handler(_) => "HandlerError",
            ScriptError::Store(_) => "StoreError",
            ScriptError::Host(_) => "HostError",
            ScriptError::Settings(_) => "SettingsError",
            ScriptError::Schema(_) => "SchemaError",
            ScriptError::Io(_) => "IoError",
        }
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(candidate) => format!("\nDid you mean '{}'?", candidate),
        None => String::new(),
    }
}

/// A failure pinned to the script line that produced it
#[derive(Error, Debug)]
#[error("{error}")]
pub struct LineError {
    /// 1-based line number in the submitted script
    pub line: usize,
    /// Source text of the line, trimmed
    pub source_text: String,
    /// Command being dispatched when the failure happened, if known
    pub command: Option<String>,
    #[source]
    pub error: ScriptError,
}

impl LineError {
    pub fn new(line: usize, source_text: impl Into<String>, error: ScriptError) -> Self {
        Self {
            line,
            source_text: source_text.into(),
            command: None,
            error,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// User-facing rendering. Debug mode adds the full diagnostic.
    pub fn render(&self, debug: bool) -> String {
        if !debug {
            return self.error.to_string();
        }

        let command = self.command.as_deref().unwrap_or("-");
        format!(
            "{category} on line {line} (command: {command})\n  | {text}\n{message}\n\n{detail:#?}",
            category = self.error.category(),
            line = self.line,
            command = command,
            text = self.source_text,
            message = self.error,
            detail = self.error,
        )
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_with_suggestion() {
        let err = ScriptError::NotFound {
            identifier: "Fracne".to_string(),
            suggestion: Some("France".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "'Fracne' does not exist.\nDid you mean 'France'?"
        );
    }

    #[test]
    fn test_not_found_without_suggestion() {
        let err = ScriptError::NotFound {
            identifier: "Zzz".to_string(),
            suggestion: None,
        };
        assert_eq!(err.to_string(), "'Zzz' does not exist.");
    }

    #[test]
    fn test_line_error_render_modes() {
        let err = LineError::new(
            3,
            "UPDATE > BALL > France > HEALTH > $x",
            ScriptError::UnknownVariable("x".to_string()),
        )
        .with_command("UPDATE");

        assert_eq!(err.render(false), "'x' is an unknown variable.");

        let full = err.render(true);
        assert!(full.starts_with("UnknownVariableError on line 3 (command: UPDATE)"));
        assert!(full.contains("UPDATE > BALL > France > HEALTH > $x"));
        assert!(full.contains("UnknownVariable"));
    }
}
