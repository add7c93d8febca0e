//! FILE group: the interpreter host's filesystem

use std::path::Path;

use async_trait::async_trait;

use super::helpers::{arg_text, paginate, required_text};
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::host::Attachment;
use crate::script::Value;

const GROUP: &str = "FILE";

const PATH_PARAM: &[Param] = &[Param::required("FILE_PATH")];

async fn expect_file(path: &str) -> Result<(), ScriptError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(ScriptError::handler(format!("'{}' does not exist", path))),
    }
}

/// Send a file as an attachment
pub struct FileReadCommand;

#[async_trait]
impl ScriptCommand for FileReadCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "READ"
    }

    fn params(&self) -> &'static [Param] {
        PATH_PARAM
    }

    fn description(&self) -> &'static str {
        "Sends the file at FILE_PATH."
    }

    async fn execute(
        &self,
        _ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let path = required_text(&args, 0)?;
        expect_file(&path).await?;

        let data = tokio::fs::read(&path).await?;
        let filename = Path::new(&path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());

        Ok(CommandOutput::message(format!("Sent `{}`", path))
            .with_attachment(Attachment::new(filename, data)))
    }
}

/// Overwrite a file with the first attachment
pub struct FileWriteCommand;

#[async_trait]
impl ScriptCommand for FileWriteCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "WRITE"
    }

    fn params(&self) -> &'static [Param] {
        PATH_PARAM
    }

    fn description(&self) -> &'static str {
        "Writes the attached file's contents to FILE_PATH."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let path = required_text(&args, 0)?;
        let attachment = ctx
            .host
            .attachments()
            .into_iter()
            .next()
            .ok_or_else(|| ScriptError::handler("Attach the file to write."))?;

        tokio::fs::write(&path, &attachment.data).await?;
        tracing::info!("Wrote {} bytes to {}", attachment.data.len(), path);

        Ok(CommandOutput::message(format!("Wrote to `{}`", path)))
    }
}

/// Truncate a file
pub struct FileClearCommand;

#[async_trait]
impl ScriptCommand for FileClearCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "CLEAR"
    }

    fn params(&self) -> &'static [Param] {
        PATH_PARAM
    }

    fn description(&self) -> &'static str {
        "Empties the file at FILE_PATH."
    }

    async fn execute(
        &self,
        _ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let path = required_text(&args, 0)?;
        expect_file(&path).await?;

        tokio::fs::write(&path, b"").await?;

        Ok(CommandOutput::message(format!("Cleared `{}`", path)))
    }
}

/// List a directory's entries, directories marked with a trailing `/`
pub struct FileListdirCommand;

#[async_trait]
impl ScriptCommand for FileListdirCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "LISTDIR"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::optional("FILE_PATH")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Lists the entries of FILE_PATH (the working directory by default)."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let path = arg_text(&args, 0).unwrap_or_else(|| ".".to_string());

        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut lines = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            lines.push(name);
        }
        lines.sort();

        if lines.is_empty() {
            return Ok(CommandOutput::message(format!("`{}` is empty", path)));
        }

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

/// Remove a file or a whole directory
pub struct FileDeleteCommand;

#[async_trait]
impl ScriptCommand for FileDeleteCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn params(&self) -> &'static [Param] {
        PATH_PARAM
    }

    fn description(&self) -> &'static str {
        "Deletes the file or directory at FILE_PATH."
    }

    async fn execute(
        &self,
        _ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let path = required_text(&args, 0)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ScriptError::handler(format!("'{}' does not exist", path)))?;

        let kind = if meta.is_dir() {
            tokio::fs::remove_dir_all(&path).await?;
            "directory"
        } else {
            tokio::fs::remove_file(&path).await?;
            "file"
        };
        tracing::info!("Deleted {} {}", kind, path);

        Ok(CommandOutput::message(format!("Deleted `{}` {}", path, kind)))
    }
}
