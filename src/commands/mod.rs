//! Script commands
//!
//! Every command is a [`ScriptCommand`] registered in a static
//! [`CommandRegistry`]. Flat commands (`CREATE`, `VIEW`, ...) live in the
//! root namespace; grouped commands (`FILTER > UPDATE`, `EVAL > SAVE`, ...)
//! are looked up by group and then by subcommand.
//!
//! Each command declares its positional parameters. The dispatcher checks
//! arity against them before anything runs.

mod crud;
mod eval;
mod file;
mod filter;
pub mod helpers;
mod meta;
mod yields;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use crud::{AttributesCommand, CreateCommand, DeleteCommand, UpdateCommand, ViewCommand};
pub use eval::{EvalListCommand, EvalRemoveCommand, EvalRunCommand, EvalSaveCommand};
pub use file::{
    FileClearCommand, FileDeleteCommand, FileListdirCommand, FileReadCommand, FileWriteCommand,
};
pub use filter::{FilterDeleteCommand, FilterUpdateCommand, FilterViewCommand};
pub use meta::{HelpCommand, SettingCommand};
pub use yields::{PushCommand, RevertCommand, YieldsCommand};

use crate::error::ScriptError;
use crate::host::{Attachment, Host};
use crate::schema::ModelRegistry;
use crate::script::Value;
use crate::session::ProcessState;
use crate::settings::Settings;
use crate::store::{closest_match, DataStore};

/// One declared positional parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub optional: bool,
}

impl Param {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            optional: true,
        }
    }
}

/// Everything a handler can reach while it runs
pub struct CommandContext<'a> {
    pub store: &'a dyn DataStore,
    pub models: &'a ModelRegistry,
    pub commands: &'a CommandRegistry,
    pub state: &'a ProcessState,
    pub host: &'a dyn Host,
    /// Settings snapshot taken when the run started
    pub settings: Settings,
    /// Trimmed source text of the line being executed
    pub line: &'a str,
}

/// What a successful command sends back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub message: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl CommandOutput {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            attachments: Vec::new(),
        }
    }

    /// The handler already replied through the host
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// A command callable from scripts
#[async_trait]
pub trait ScriptCommand: Send + Sync {
    /// Group the command is nested under, `None` for flat commands
    fn group(&self) -> Option<&'static str> {
        None
    }

    fn name(&self) -> &'static str;

    fn params(&self) -> &'static [Param];

    /// One-line description shown by HELP
    fn description(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError>;

    fn min_args(&self) -> usize {
        self.params().iter().filter(|p| !p.optional).count()
    }

    fn max_args(&self) -> usize {
        self.params().len()
    }

    /// `FILTER > UPDATE` or `CREATE`
    fn qualified_name(&self) -> String {
        match self.group() {
            Some(group) => format!("{} > {}", group, self.name()),
            None => self.name().to_string(),
        }
    }

    /// Full calling convention, e.g. `CREATE > MODEL > IDENTIFIER > YIELD(?)`
    fn usage(&self) -> String {
        let mut usage = self.qualified_name();
        for param in self.params() {
            usage.push_str(" > ");
            usage.push_str(param.name);
            if param.optional {
                usage.push_str("(?)");
            }
        }
        usage
    }
}

/// Static table of every command, built once at startup
pub struct CommandRegistry {
    commands: HashMap<(String, String), Arc<dyn ScriptCommand>>,
    /// Registration order, for HELP
    order: Vec<Arc<dyn ScriptCommand>>,
    groups: Vec<&'static str>,
}

/// Key of flat commands' namespace
const ROOT: &str = "";

impl CommandRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            commands: HashMap::new(),
            order: Vec::new(),
            groups: Vec::new(),
        };

        // Records
        registry.register(Arc::new(CreateCommand));
        registry.register(Arc::new(DeleteCommand));
        registry.register(Arc::new(UpdateCommand));
        registry.register(Arc::new(ViewCommand));
        registry.register(Arc::new(AttributesCommand));

        // Pending writes and undo
        registry.register(Arc::new(YieldsCommand));
        registry.register(Arc::new(PushCommand));
        registry.register(Arc::new(RevertCommand));

        registry.register(Arc::new(HelpCommand));
        registry.register(Arc::new(SettingCommand));

        // Bulk operations
        registry.register(Arc::new(FilterUpdateCommand));
        registry.register(Arc::new(FilterDeleteCommand));
        registry.register(Arc::new(FilterViewCommand));

        // Eval presets
        registry.register(Arc::new(EvalSaveCommand));
        registry.register(Arc::new(EvalRemoveCommand));
        registry.register(Arc::new(EvalRunCommand));
        registry.register(Arc::new(EvalListCommand));

        // Filesystem
        registry.register(Arc::new(FileReadCommand));
        registry.register(Arc::new(FileWriteCommand));
        registry.register(Arc::new(FileClearCommand));
        registry.register(Arc::new(FileListdirCommand));
        registry.register(Arc::new(FileDeleteCommand));

        registry
    }

    pub fn register(&mut self, command: Arc<dyn ScriptCommand>) {
        let group = command.group().unwrap_or(ROOT);
        if !group.is_empty() && !self.groups.contains(&group) {
            self.groups.push(group);
        }

        let key = (group.to_uppercase(), command.name().to_uppercase());
        self.commands.insert(key, command.clone());
        self.order.push(command);
    }

    /// Flat command by (case-insensitive) name
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ScriptCommand>> {
        self.commands
            .get(&(ROOT.to_string(), name.to_uppercase()))
            .cloned()
    }

    /// Grouped command by (case-insensitive) group and subcommand
    pub fn lookup_in_group(&self, group: &str, name: &str) -> Option<Arc<dyn ScriptCommand>> {
        self.commands
            .get(&(group.to_uppercase(), name.to_uppercase()))
            .cloned()
    }

    pub fn is_command(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn is_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.eq_ignore_ascii_case(name))
    }

    /// All commands in registration order
    pub fn all(&self) -> &[Arc<dyn ScriptCommand>] {
        &self.order
    }

    pub fn group_commands(&self, group: &str) -> Vec<Arc<dyn ScriptCommand>> {
        self.order
            .iter()
            .filter(|c| c.group().is_some_and(|g| g.eq_ignore_ascii_case(group)))
            .cloned()
            .collect()
    }

    /// Names valid as the head of a line
    pub fn head_names(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|c| c.group().is_none())
            .map(|c| c.name().to_string())
            .chain(self.groups.iter().map(|g| g.to_string()))
            .collect()
    }

    /// Closest head name to an unrecognized token
    pub fn suggest(&self, token: &str) -> Option<String> {
        closest_match(&token.to_uppercase(), &self.head_names()).map(|(name, _)| name.to_string())
    }

    /// Closest subcommand of a group to an unrecognized token
    pub fn suggest_in_group(&self, group: &str, token: &str) -> Option<String> {
        let names: Vec<String> = self
            .group_commands(group)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        closest_match(&token.to_uppercase(), &names).map(|(name, _)| name.to_string())
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = CommandRegistry::new();
        assert!(registry.lookup("create").is_some());
        assert!(registry.lookup("Create").is_some());
        assert!(registry.lookup("SAVE").is_none());
        assert!(registry.lookup_in_group("eval", "save").is_some());
        assert!(registry.is_group("Filter"));
        assert!(!registry.is_group("create"));
    }

    #[test]
    fn test_usage_and_arity() {
        let registry = CommandRegistry::new();

        let create = registry.lookup("CREATE").unwrap();
        assert_eq!(create.usage(), "CREATE > MODEL > IDENTIFIER > YIELD(?)");
        assert_eq!(create.min_args(), 2);
        assert_eq!(create.max_args(), 3);

        let filter_update = registry.lookup_in_group("FILTER", "UPDATE").unwrap();
        assert_eq!(filter_update.qualified_name(), "FILTER > UPDATE");
        assert_eq!(filter_update.min_args(), 4);
    }

    #[test]
    fn test_suggestions() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.suggest("CRAETE").as_deref(), Some("CREATE"));
        assert_eq!(registry.suggest("fitler").as_deref(), Some("FILTER"));
        assert_eq!(registry.suggest_in_group("EVAL", "sav").as_deref(), Some("SAVE"));
    }

    #[test]
    fn test_every_group_has_commands() {
        let registry = CommandRegistry::new();
        for group in ["FILTER", "EVAL", "FILE"] {
            assert!(!registry.group_commands(group).is_empty(), "{}", group);
        }
    }
}
