//! HELP and SETTING

use async_trait::async_trait;

use super::helpers::{arg_text, paginate, required_text};
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::script::Value;
use crate::settings::SettingValue;

/// Document every command, one group, or one command
pub struct HelpCommand;

#[async_trait]
impl ScriptCommand for HelpCommand {
    fn name(&self) -> &'static str {
        "HELP"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::optional("COMMAND")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Lists all commands, or documents the given command or group."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let commands = match arg_text(&args, 0) {
            None => ctx.commands.all().to_vec(),
            Some(name) if ctx.commands.is_group(&name) => ctx.commands.group_commands(&name),
            Some(name) => match ctx.commands.lookup(&name) {
                Some(command) => vec![command],
                None => {
                    return Err(ScriptError::UnknownCommand {
                        suggestion: ctx.commands.suggest(&name),
                        token: name,
                    })
                }
            },
        };

        let lines: Vec<String> = commands
            .iter()
            .map(|command| format!("{}\n    {}", command.usage(), command.description()))
            .collect();

        paginate(
            ctx.host,
            &lines,
            ctx.settings.page_size as usize,
            ctx.settings.prompt_timeout(),
        )
        .await?;
        Ok(CommandOutput::silent())
    }
}

/// Read or change an interpreter setting
pub struct SettingCommand;

#[async_trait]
impl ScriptCommand for SettingCommand {
    fn name(&self) -> &'static str {
        "SETTING"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("NAME"), Param::optional("VALUE")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Shows or changes a setting. Boolean settings toggle when VALUE is left out."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let name = required_text(&args, 0)?;
        let value = arg_text(&args, 1);

        if value.is_none() {
            let current = ctx.settings.get(&name)?;
            if !matches!(current, SettingValue::Bool(_)) {
                return Ok(CommandOutput::message(format!(
                    "`{}` is set to `{}`",
                    name.to_lowercase(),
                    current
                )));
            }
        }

        let change = ctx.state.update_setting(&name, value.as_deref())?;

        Ok(CommandOutput::message(format!(
            "`{}` has been set from `{}` to `{}`",
            change.name, change.old, change.new
        )))
    }
}
