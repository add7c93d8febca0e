//! EVAL group: named code presets handed to the host's evaluator

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::helpers::required_text;
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::host::HostError;
use crate::script::{strip_code_fence, Value};

const GROUP: &str = "EVAL";

const PRESET_EXTENSION: &str = "eval";

const MAX_NAME_LENGTH: usize = 25;

fn preset_path(dir: &str, name: &str) -> Result<PathBuf, ScriptError> {
    let valid = !name.is_empty()
        && !name.contains(|c| c == '/' || c == '\\')
        && name != "."
        && name != "..";
    if !valid {
        return Err(ScriptError::handler(format!(
            "`{}` is not a valid preset name.",
            name
        )));
    }
    Ok(Path::new(dir).join(format!("{}.{}", name, PRESET_EXTENSION)))
}

async fn existing_preset(dir: &str, name: &str) -> Result<PathBuf, ScriptError> {
    let path = preset_path(dir, name)?;
    if !tokio::fs::try_exists(&path).await? {
        return Err(ScriptError::handler(format!("`{}` does not exist.", name)));
    }
    Ok(path)
}

/// Prompt for a code body and store it under NAME
pub struct EvalSaveCommand;

#[async_trait]
impl ScriptCommand for EvalSaveCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "SAVE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("NAME")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Saves the next message as an eval preset called NAME."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let name = required_text(&args, 0)?;
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(ScriptError::handler(format!(
                "`{}` is above the {} character limit.",
                name, MAX_NAME_LENGTH
            )));
        }

        let path = preset_path(&ctx.settings.presets_dir, &name)?;
        if tokio::fs::try_exists(&path).await? {
            return Err(ScriptError::handler(format!("`{}` already exists.", name)));
        }

        let body = match ctx
            .host
            .prompt_for_input(
                "Please paste the eval command below...",
                ctx.settings.prompt_timeout(),
            )
            .await
        {
            Ok(body) => body,
            Err(HostError::Timeout { .. }) => {
                return Ok(CommandOutput::message("Preset saving has timed out."))
            }
            Err(e) => return Err(e.into()),
        };

        tokio::fs::create_dir_all(&ctx.settings.presets_dir).await?;
        tokio::fs::write(&path, strip_code_fence(&body)).await?;
        tracing::info!("Saved eval preset {}", path.display());

        Ok(CommandOutput::message(format!(
            "`{}` eval preset has been saved!",
            name
        )))
    }
}

pub struct EvalRemoveCommand;

#[async_trait]
impl ScriptCommand for EvalRemoveCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "REMOVE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("NAME")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Deletes the eval preset called NAME."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let name = required_text(&args, 0)?;
        let path = existing_preset(&ctx.settings.presets_dir, &name).await?;

        tokio::fs::remove_file(&path).await?;

        Ok(CommandOutput::message(format!("Removed `{}` preset.", name)))
    }
}

/// Hand a saved preset to the host's evaluator
pub struct EvalRunCommand;

#[async_trait]
impl ScriptCommand for EvalRunCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "RUN"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("NAME")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Runs the eval preset called NAME."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let name = required_text(&args, 0)?;
        let path = existing_preset(&ctx.settings.presets_dir, &name).await?;

        let body = tokio::fs::read_to_string(&path).await?;
        let output = ctx.host.evaluate(&body).await?;

        if output.trim().is_empty() {
            Ok(CommandOutput::message(format!("Ran `{}`", name)))
        } else {
            Ok(CommandOutput::message(output))
        }
    }
}

pub struct EvalListCommand;

#[async_trait]
impl ScriptCommand for EvalListCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "LIST"
    }

    fn params(&self) -> &'static [Param] {
        &[]
    }

    fn description(&self) -> &'static str {
        "Lists saved eval presets."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        _args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let dir = Path::new(&ctx.settings.presets_dir);
        let mut names = Vec::new();

        if tokio::fs::try_exists(dir).await? {
            let mut entries = tokio::fs::read_dir(dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(PRESET_EXTENSION) {
                    continue;
                }
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        if names.is_empty() {
            return Ok(CommandOutput::message("No eval presets saved."));
        }

        names.sort();
        Ok(CommandOutput::message(names.join("\n")))
    }
}
