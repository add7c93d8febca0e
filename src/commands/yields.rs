//! Pending-write commands: YIELDS, PUSH, REVERT

use async_trait::async_trait;

use super::helpers::paginate;
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::pending::{InverseOp, RevertRecord};
use crate::script::{Payload, Value};

const CLEAR_FLAG: &str = "-clear";

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// List staged operations
pub struct YieldsCommand;

#[async_trait]
impl ScriptCommand for YieldsCommand {
    fn name(&self) -> &'static str {
        "YIELDS"
    }

    fn params(&self) -> &'static [Param] {
        &[]
    }

    fn description(&self) -> &'static str {
        "Lists every yielded operation waiting for PUSH."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        _args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let mut lines = vec!["GLOBAL YIELDS:".to_string(), String::new()];
        {
            let pending = ctx.state.pending.lock().await;
            if pending.is_empty() {
                return Ok(CommandOutput::message("There are no yields."));
            }
            lines.extend(
                pending
                    .iter()
                    .enumerate()
                    .map(|(index, op)| format!("{}. {}", index + 1, op)),
            );
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

/// Commit staged operations, or discard them with `-clear`
pub struct PushCommand;

#[async_trait]
impl ScriptCommand for PushCommand {
    fn name(&self) -> &'static str {
        "PUSH"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::optional("LIMIT")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Commits yielded operations in order, up to LIMIT. `PUSH > -clear` discards them."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let limit = match args.first() {
            None => None,
            Some(value) if value.text().eq_ignore_ascii_case(CLEAR_FLAG) => {
                let cleared = ctx.state.pending.lock().await.clear();
                return Ok(CommandOutput::message(format!(
                    "Cleared yield cache ({} yield{} discarded).",
                    cleared,
                    plural(cleared)
                )));
            }
            Some(value) => Some(parse_limit(value)?),
        };

        let report = ctx
            .state
            .pending
            .lock()
            .await
            .flush(ctx.store, limit)
            .await;

        if !report.applied.is_empty() {
            let steps = report
                .applied
                .iter()
                .filter_map(|record| {
                    ctx.models.get(&record.model).map(|model| InverseOp::Delete {
                        model,
                        pk: record.pk,
                    })
                })
                .collect();
            ctx.state
                .record_revert(RevertRecord::new(ctx.line, steps))
                .await;
        }

        let applied = report.applied_count();
        if let Some((op, error)) = report.failed {
            return Err(ScriptError::handler(format!(
                "Pushed `{}` yield{} before `{}` failed: {}\n`{}` yield{} still queued.",
                applied,
                plural(applied),
                op,
                error,
                report.remaining,
                plural(report.remaining)
            )));
        }

        Ok(CommandOutput::message(format!(
            "Pushed `{}` yield{}.",
            applied,
            plural(applied)
        )))
    }
}

fn parse_limit(value: &Value) -> Result<usize, ScriptError> {
    match value.target().payload {
        Payload::Number(n) if n >= 1.0 && n.fract() == 0.0 => Ok(n as usize),
        _ => Err(ScriptError::handler(format!(
            "`{}` is not a valid limit; use a positive whole number or `{}`",
            value.text(),
            CLEAR_FLAG
        ))),
    }
}

/// Undo the last committed mutation
pub struct RevertCommand;

#[async_trait]
impl ScriptCommand for RevertCommand {
    fn name(&self) -> &'static str {
        "REVERT"
    }

    fn params(&self) -> &'static [Param] {
        &[]
    }

    fn description(&self) -> &'static str {
        "Reverts the most recent CREATE, DELETE, UPDATE, FILTER or PUSH."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        _args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let mut record = ctx
            .state
            .take_revert()
            .await
            .ok_or_else(|| ScriptError::handler("There is nothing to revert."))?;

        if let Err(e) = record.apply(ctx.store).await {
            tracing::warn!(
                "Revert of `{}` failed with {} steps left",
                record.command,
                record.steps.len()
            );
            ctx.state.record_revert(record).await;
            return Err(e.into());
        }

        Ok(CommandOutput::message(format!("Reverted `{}`", record.command)))
    }
}
