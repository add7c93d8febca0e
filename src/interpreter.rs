//! Script interpreter
//!
//! Runs one script submission line by line:
//!
//! ```text
//! text -> strip code fence -> segment -> per line:
//!     resolve values -> ReadHead -> ResolveCommand -> BindArgs -> Invoke -> Respond
//! ```
//!
//! Lines run strictly in order. The first failing line stops the run; the
//! lines before it keep their effects. Errors never escape `run`: they are
//! reported to the host and returned in the [`RunReport`].

use std::sync::Arc;

use crate::commands::{CommandContext, CommandOutput, CommandRegistry, ScriptCommand};
use crate::error::{LineError, ScriptError};
use crate::host::{Host, Reply};
use crate::schema::ModelRegistry;
use crate::script::{
    segment_script, strip_code_fence, Keyword, Payload, Resolver, ScriptLine, Value,
    VariableStore,
};
use crate::session::ProcessState;
use crate::settings::Settings;
use crate::store::DataStore;

/// Result of one successfully executed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    pub line: usize,
    /// Qualified command name, `None` for variable assignments
    pub command: Option<String>,
    pub message: Option<String>,
}

/// Everything a run produced
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<LineOutcome>,
    pub error: Option<LineError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Messages of the successful lines, in order
    pub fn messages(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter_map(|o| o.message.as_deref())
            .collect()
    }
}

/// A line after dispatch, ready to invoke
enum Dispatch {
    Assign {
        scope: Keyword,
        name: String,
        value: Value,
    },
    Invoke {
        command: Arc<dyn ScriptCommand>,
        args: Vec<Value>,
    },
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatch::Assign { scope, name, value } => f
                .debug_struct("Assign")
                .field("scope", scope)
                .field("name", name)
                .field("value", value)
                .finish(),
            Dispatch::Invoke { command, args } => f
                .debug_struct("Invoke")
                .field("command", &command.name())
                .field("args", args)
                .finish(),
        }
    }
}

pub struct Interpreter {
    store: Arc<dyn DataStore>,
    models: ModelRegistry,
    commands: CommandRegistry,
    state: Arc<ProcessState>,
}

impl Interpreter {
    /// Build an interpreter over `store`, introspecting its schemas once
    pub fn new(store: Arc<dyn DataStore>, settings: Settings) -> Result<Self, ScriptError> {
        Self::with_state(store, Arc::new(ProcessState::new(settings)))
    }

    /// Build an interpreter sharing existing process state
    pub fn with_state(
        store: Arc<dyn DataStore>,
        state: Arc<ProcessState>,
    ) -> Result<Self, ScriptError> {
        let models = ModelRegistry::from_schemas(&store.schemas())?;
        let commands = CommandRegistry::new();

        tracing::info!(
            "Interpreter ready: {} models, {} commands",
            models.len(),
            commands.all().len()
        );

        Ok(Self {
            store,
            models,
            commands,
            state,
        })
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        &self.state
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Run one script submission
    pub async fn run(&self, host: &dyn Host, source: &str) -> RunReport {
        let _gate = self.state.begin_run().await;
        let text = strip_code_fence(source);

        tracing::debug!("Running script ({} bytes)", text.len());

        let mut report = RunReport::default();

        let lines = match segment_script(&text) {
            Ok(lines) => lines,
            Err(error) => {
                let line = match &error {
                    ScriptError::Parse { line, .. } => *line,
                    _ => 0,
                };
                let source_text = text
                    .split('\n')
                    .nth(line.saturating_sub(1))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                report.error = Some(LineError::new(line, source_text, error));
                self.finish(host, &mut report).await;
                return report;
            }
        };

        let mut variables = VariableStore::new(&self.state.globals);

        for line in &lines {
            match self.execute_line(host, &mut variables, line).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) => {
                    tracing::warn!("Line {} failed: {}", error.line, error.error);
                    report.error = Some(error);
                    break;
                }
            }
        }

        self.finish(host, &mut report).await;
        report
    }

    /// Report the run's outcome. Settings are read now so a `SETTING` line
    /// earlier in the run applies.
    async fn finish(&self, host: &dyn Host, report: &mut RunReport) {
        let debug = self.state.settings().debug;
        let delivered = match &report.error {
            Some(error) => host.reply(Reply::text(error.render(debug))).await,
            None => host.acknowledge().await,
        };
        if let Err(e) = delivered {
            tracing::warn!("Failed to deliver run result: {}", e);
        }

        tracing::info!(
            "Script finished: {} lines ok, {}",
            report.outcomes.len(),
            if report.is_success() { "no errors" } else { "aborted" }
        );
    }

    async fn execute_line(
        &self,
        host: &dyn Host,
        variables: &mut VariableStore<'_>,
        line: &ScriptLine,
    ) -> Result<LineOutcome, LineError> {
        let fail = |error: ScriptError| LineError::new(line.number, line.text.clone(), error);

        let values = Resolver::new(line.number, &self.commands, &self.models, variables)
            .resolve_all(&line.segments)
            .map_err(fail)?;

        match dispatch(&self.commands, values).map_err(fail)? {
            Dispatch::Assign { scope, name, value } => {
                variables.assign(scope, name, value);
                Ok(LineOutcome {
                    line: line.number,
                    command: None,
                    message: None,
                })
            }
            Dispatch::Invoke { command, args } => {
                let name = command.qualified_name();
                tracing::debug!("Line {}: {} with {} args", line.number, name, args.len());

                let ctx = CommandContext {
                    store: self.store.as_ref(),
                    models: &self.models,
                    commands: &self.commands,
                    state: &self.state,
                    host,
                    settings: self.state.settings(),
                    line: &line.text,
                };

                let output = command
                    .execute(&ctx, args)
                    .await
                    .map_err(|e| fail(e).with_command(name.clone()))?;

                respond(host, &output)
                    .await
                    .map_err(|e| fail(e).with_command(name.clone()))?;

                Ok(LineOutcome {
                    line: line.number,
                    command: Some(name),
                    message: output.message,
                })
            }
        }
    }
}

async fn respond(host: &dyn Host, output: &CommandOutput) -> Result<(), ScriptError> {
    if output.message.is_none() && output.attachments.is_empty() {
        return Ok(());
    }
    host.reply(Reply {
        text: output.message.clone().unwrap_or_default(),
        attachments: output.attachments.clone(),
    })
    .await?;
    Ok(())
}

/// Decide what a resolved line does: assign a variable or call a command
/// with bound, arity-checked arguments
fn dispatch(commands: &CommandRegistry, values: Vec<Value>) -> Result<Dispatch, ScriptError> {
    let mut values = values.into_iter();
    let Some(head) = values.next() else {
        return Err(ScriptError::Parse {
            line: 0,
            message: "empty line".to_string(),
        });
    };

    let (command, args): (Arc<dyn ScriptCommand>, Vec<Value>) = match &head.payload {
        Payload::Keyword(scope) => return assignment(*scope, values.collect()),
        Payload::CommandGroup(group) => {
            let Some(sub) = values.next() else {
                let usage = commands
                    .group_commands(group)
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join("|");
                return Err(ScriptError::Arity {
                    command: group.clone(),
                    usage: format!("{} > {}", group, usage),
                    expected: 1,
                    found: 0,
                });
            };
            let command = commands.lookup_in_group(group, &sub.raw).ok_or_else(|| {
                ScriptError::UnknownCommand {
                    token: format!("{} > {}", group, sub.raw),
                    suggestion: commands
                        .suggest_in_group(group, &sub.raw)
                        .map(|name| format!("{} > {}", group, name)),
                }
            })?;
            (command, values.collect())
        }
        Payload::Method(name) => {
            let command = commands
                .lookup(name)
                .ok_or_else(|| ScriptError::UnknownCommand {
                    token: head.raw.clone(),
                    suggestion: None,
                })?;
            (command, values.collect())
        }
        _ => {
            return Err(ScriptError::UnknownCommand {
                suggestion: commands.suggest(&head.raw),
                token: head.raw,
            })
        }
    };

    check_arity(command.as_ref(), args.len())?;

    Ok(Dispatch::Invoke {
        command,
        args: args.into_iter().map(Value::into_target).collect(),
    })
}

fn check_arity(command: &dyn ScriptCommand, found: usize) -> Result<(), ScriptError> {
    if found < command.min_args() {
        return Err(ScriptError::Arity {
            command: command.qualified_name(),
            usage: command.usage(),
            expected: command.min_args(),
            found,
        });
    }
    if found > command.max_args() {
        return Err(ScriptError::TooManyArguments {
            command: command.qualified_name(),
            usage: command.usage(),
            expected: command.max_args(),
            found,
        });
    }
    Ok(())
}

/// `LOCAL > name > value` / `GLOBAL > name > value`
fn assignment(scope: Keyword, rest: Vec<Value>) -> Result<Dispatch, ScriptError> {
    let usage = format!("{} > NAME > VALUE", scope.as_str());
    if rest.len() != 2 {
        let error = if rest.len() < 2 {
            ScriptError::Arity {
                command: scope.as_str().to_string(),
                usage,
                expected: 2,
                found: rest.len(),
            }
        } else {
            ScriptError::TooManyArguments {
                command: scope.as_str().to_string(),
                usage,
                expected: 2,
                found: rest.len(),
            }
        };
        return Err(error);
    }

    let mut rest = rest.into_iter();
    let (Some(name), Some(value)) = (rest.next(), rest.next()) else {
        return Err(ScriptError::handler("variable assignment needs a name and a value"));
    };

    let name = name.raw.trim_start_matches(crate::script::resolver::VARIABLE_SIGIL).to_string();
    if name.is_empty() {
        return Err(ScriptError::handler("variable name cannot be empty"));
    }

    Ok(Dispatch::Assign {
        scope,
        name,
        value: value.into_target(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::ValueKind;

    fn method(name: &str) -> Value {
        Value::new(name, Payload::Method(name.to_uppercase()))
    }

    #[test]
    fn test_dispatch_flat_command() {
        let commands = CommandRegistry::new();
        let values = vec![method("VIEW"), Value::string("BALL"), Value::string("France")];

        match dispatch(&commands, values).unwrap() {
            Dispatch::Invoke { command, args } => {
                assert_eq!(command.qualified_name(), "VIEW");
                assert_eq!(args.len(), 2);
            }
            Dispatch::Assign { .. } => panic!("expected invoke"),
        }
    }

    #[test]
    fn test_dispatch_group_command() {
        let commands = CommandRegistry::new();
        let values = vec![
            Value::new("eval", Payload::CommandGroup("EVAL".to_string())),
            Value::string("list"),
        ];

        match dispatch(&commands, values).unwrap() {
            Dispatch::Invoke { command, args } => {
                assert_eq!(command.qualified_name(), "EVAL > LIST");
                assert!(args.is_empty());
            }
            Dispatch::Assign { .. } => panic!("expected invoke"),
        }
    }

    #[test]
    fn test_unknown_head_suggests() {
        let commands = CommandRegistry::new();
        let err = dispatch(&commands, vec![Value::string("CRAETE")]).unwrap_err();
        match err {
            ScriptError::UnknownCommand { token, suggestion } => {
                assert_eq!(token, "CRAETE");
                assert_eq!(suggestion.as_deref(), Some("CREATE"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_subcommand() {
        let commands = CommandRegistry::new();
        let values = vec![
            Value::new("FILE", Payload::CommandGroup("FILE".to_string())),
            Value::string("REED"),
        ];
        let err = dispatch(&commands, values).unwrap_err();
        assert!(err.to_string().contains("'FILE > REED' is not a valid command."));
        assert!(err.to_string().contains("Did you mean 'FILE > READ'?"));
    }

    #[test]
    fn test_arity_both_ways() {
        let commands = CommandRegistry::new();

        let err = dispatch(&commands, vec![method("CREATE"), Value::string("BALL")]).unwrap_err();
        assert!(matches!(err, ScriptError::Arity { expected: 2, found: 1, .. }));

        let err = dispatch(
            &commands,
            vec![
                method("DELETE"),
                Value::string("BALL"),
                Value::string("France"),
                Value::string("extra"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::TooManyArguments { expected: 2, found: 3, .. }));
    }

    #[test]
    fn test_assignment_derefs_variables() {
        let commands = CommandRegistry::new();
        let values = vec![
            Value::new("LOCAL", Payload::Keyword(Keyword::Local)),
            Value::string("y"),
            Value::new(
                "$x",
                Payload::Variable {
                    name: "x".to_string(),
                    value: Box::new(Value::number(5.0)),
                },
            ),
        ];

        match dispatch(&commands, values).unwrap() {
            Dispatch::Assign { scope, name, value } => {
                assert_eq!(scope, Keyword::Local);
                assert_eq!(name, "y");
                assert_eq!(value.kind(), ValueKind::Number);
            }
            Dispatch::Invoke { .. } => panic!("expected assignment"),
        }
    }
}
