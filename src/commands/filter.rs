//! FILTER group: bulk update, delete and view by condition

use async_trait::async_trait;

use super::helpers::{arg_text, coerce_value, expect_field, expect_model, paginate, required_text};
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::pending::{InverseOp, RevertRecord};
use crate::schema::{FieldSchema, FieldType, ModelDescriptor};
use crate::script::Value;
use crate::store::{Condition, FilterOp};

const GROUP: &str = "FILTER";

fn parse_operator(args: &[Value], index: usize) -> Result<FilterOp, ScriptError> {
    match arg_text(args, index) {
        Some(text) => text.parse().map_err(ScriptError::Handler),
        None => Ok(FilterOp::Exact),
    }
}

/// Condition comparing `field` against a script value
fn condition(field: &FieldSchema, op: FilterOp, value: &Value) -> Condition {
    let text_field = matches!(field.field_type, FieldType::Char | FieldType::Text);
    let value = match op {
        FilterOp::Contains | FilterOp::IContains | FilterOp::StartsWith | FilterOp::EndsWith => {
            serde_json::Value::String(value.literal())
        }
        _ if text_field => serde_json::Value::String(value.literal()),
        _ => value.target().to_json(),
    };
    Condition::new(field.name.clone(), op, value)
}

/// Keep whatever was applied revertible, even when the loop stopped early
async fn record_steps(ctx: &CommandContext<'_>, steps: Vec<InverseOp>) {
    if !steps.is_empty() {
        ctx.state
            .record_revert(RevertRecord::new(ctx.line, steps))
            .await;
    }
}

fn instances(model: &ModelDescriptor, count: usize) -> String {
    let suffix = if count == 1 { "instance" } else { "instances" };
    format!("`{}` {} {}", count, model.display_name, suffix)
}

/// Set a new value on every instance matching the old one
pub struct FilterUpdateCommand;

#[async_trait]
impl ScriptCommand for FilterUpdateCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("ATTRIBUTE"),
            Param::required("OLD_VALUE"),
            Param::required("NEW_VALUE"),
            Param::optional("OPERATOR"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Updates every instance whose ATTRIBUTE matches OLD_VALUE under OPERATOR (default `exact`)."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let field = expect_field(&model, &required_text(&args, 1)?)?;
        let op = parse_operator(&args, 4)?;
        let new_value = coerce_value(ctx.store, ctx.models, &model, field, &args[3]).await?;

        let matching = ctx
            .store
            .filter(&model, &condition(field, op, &args[2]))
            .await?;

        let mut steps = Vec::with_capacity(matching.len());
        let mut failure = None;
        for record in &matching {
            match ctx
                .store
                .update(&model, record.pk, &field.name, new_value.clone())
                .await
            {
                Ok(old) => steps.push(InverseOp::Restore {
                    model: model.clone(),
                    pk: record.pk,
                    field: field.name.clone(),
                    value: old,
                }),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        record_steps(ctx, steps).await;
        if let Some(e) = failure {
            return Err(e.into());
        }

        Ok(CommandOutput::message(format!(
            "Updated {} from a `{}` value of `{}` to `{}`",
            instances(&model, matching.len()),
            field.name,
            args[2].literal(),
            args[3].literal()
        )))
    }
}

/// Delete every instance matching a condition
pub struct FilterDeleteCommand;

#[async_trait]
impl ScriptCommand for FilterDeleteCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("ATTRIBUTE"),
            Param::required("VALUE"),
            Param::optional("OPERATOR"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Deletes every instance whose ATTRIBUTE matches VALUE under OPERATOR (default `exact`)."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let field = expect_field(&model, &required_text(&args, 1)?)?;
        let op = parse_operator(&args, 3)?;

        let matching = ctx
            .store
            .filter(&model, &condition(field, op, &args[2]))
            .await?;

        let mut steps = Vec::with_capacity(matching.len());
        let mut failure = None;
        for record in &matching {
            match ctx.store.delete(&model, record.pk).await {
                Ok(removed) => steps.push(InverseOp::Recreate {
                    model: model.clone(),
                    fields: removed.fields,
                }),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        record_steps(ctx, steps).await;
        if let Some(e) = failure {
            return Err(e.into());
        }

        Ok(CommandOutput::message(format!(
            "Deleted {} with a `{}` value of `{}`",
            instances(&model, matching.len()),
            field.name,
            args[2].literal()
        )))
    }
}

/// List the identifiers of every instance matching a condition
pub struct FilterViewCommand;

#[async_trait]
impl ScriptCommand for FilterViewCommand {
    fn group(&self) -> Option<&'static str> {
        Some(GROUP)
    }

    fn name(&self) -> &'static str {
        "VIEW"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("ATTRIBUTE"),
            Param::required("VALUE"),
            Param::optional("OPERATOR"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Lists every instance whose ATTRIBUTE matches VALUE under OPERATOR (default `exact`)."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let field = expect_field(&model, &required_text(&args, 1)?)?;
        let op = parse_operator(&args, 3)?;

        let matching = ctx
            .store
            .filter(&model, &condition(field, op, &args[2]))
            .await?;

        if matching.is_empty() {
            return Ok(CommandOutput::message(format!(
                "No {} instances match.",
                model.display_name
            )));
        }

        let lines: Vec<String> = matching
            .iter()
            .enumerate()
            .map(|(index, record)| format!("{}. {}", index + 1, record.identifier(&model)))
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
