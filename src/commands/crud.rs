//! Record commands: CREATE, DELETE, UPDATE, VIEW, ATTRIBUTES

use async_trait::async_trait;

use super::helpers::{
    arg_text, coerce_value, default_payload, expect_field, expect_model, media_attachment,
    media_file, required_text, save_attachment,
};
use super::{CommandContext, CommandOutput, Param, ScriptCommand};
use crate::error::ScriptError;
use crate::pending::{InverseOp, RevertRecord};
use crate::script::value::display_json;
use crate::script::{Payload, Value};
use crate::store::fetch_by_identifier;

/// Create a record, or stage it until `PUSH` when YIELD is given
pub struct CreateCommand;

#[async_trait]
impl ScriptCommand for CreateCommand {
    fn name(&self) -> &'static str {
        "CREATE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("IDENTIFIER"),
            Param::optional("YIELD"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Creates a model instance. With YIELD the instance is staged until PUSH."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        if model.identified_by_key() {
            return Err(ScriptError::handler(format!(
                "{} instances are named by their `{}`, which the store assigns. They cannot be created by name.",
                model.display_name, model.primary_key
            )));
        }
        let identifier = required_text(&args, 1)?;
        let deferred = match args.get(2) {
            Some(flag) => yield_flag(flag)?,
            None => false,
        };

        let payload = default_payload(ctx.store, ctx.models, &model, &identifier).await?;

        if deferred {
            ctx.state
                .pending
                .lock()
                .await
                .stage(model.clone(), identifier.clone(), payload);
            return Ok(CommandOutput::message(format!(
                "Created `{}` and yielded it until `PUSH`",
                identifier
            )));
        }

        let record = ctx.store.create(&model, payload).await?;
        ctx.state
            .record_revert(RevertRecord::new(
                ctx.line,
                vec![InverseOp::Delete {
                    model,
                    pk: record.pk,
                }],
            ))
            .await;

        Ok(CommandOutput::message(format!("Created `{}`", identifier)))
    }
}

fn yield_flag(value: &Value) -> Result<bool, ScriptError> {
    if let Payload::Boolean(b) = value.target().payload {
        return Ok(b);
    }
    match value.text().to_lowercase().as_str() {
        "yield" | "-yield" => Ok(true),
        _ => Err(ScriptError::handler(format!(
            "Expected `YIELD` or a boolean, got `{}`",
            value.text()
        ))),
    }
}

pub struct DeleteCommand;

#[async_trait]
impl ScriptCommand for DeleteCommand {
    fn name(&self) -> &'static str {
        "DELETE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("MODEL"), Param::required("IDENTIFIER")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Deletes a model instance."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let identifier = required_text(&args, 1)?;

        let record = fetch_by_identifier(ctx.store, &model, &identifier).await?;
        let removed = ctx.store.delete(&model, record.pk).await?;

        ctx.state
            .record_revert(RevertRecord::new(
                ctx.line,
                vec![InverseOp::Recreate {
                    model,
                    fields: removed.fields,
                }],
            ))
            .await;

        Ok(CommandOutput::message(format!("Deleted `{}`", identifier)))
    }
}

/// Set one field. Without a value the first attachment is saved and its
/// path stored. A staged instance is edited in the queue instead.
pub struct UpdateCommand;

#[async_trait]
impl ScriptCommand for UpdateCommand {
    fn name(&self) -> &'static str {
        "UPDATE"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("IDENTIFIER"),
            Param::required("ATTRIBUTE"),
            Param::optional("VALUE"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Updates an attribute of a model instance. Without VALUE the attached file is saved and used."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let identifier = required_text(&args, 1)?;
        let field = expect_field(&model, &required_text(&args, 2)?)?;

        let value = match args.get(3) {
            Some(value) => coerce_value(ctx.store, ctx.models, &model, field, value).await?,
            None => {
                let attachment = ctx.host.attachments().into_iter().next().ok_or_else(|| {
                    ScriptError::handler("No value given and no attachment to save.")
                })?;
                serde_json::Value::String(
                    save_attachment(&ctx.settings.media_path, &attachment).await?,
                )
            }
        };
        let shown = display_json(&value);

        {
            let mut pending = ctx.state.pending.lock().await;
            if let Some(staged) = pending.find_mut(&model, &identifier) {
                staged.payload.insert(field.name.clone(), value);
                return Ok(CommandOutput::message(format!(
                    "Updated yielded `{}`'s {} to `{}`",
                    identifier, field.name, shown
                )));
            }
        }

        let record = fetch_by_identifier(ctx.store, &model, &identifier).await?;
        let old = ctx
            .store
            .update(&model, record.pk, &field.name, value)
            .await?;

        ctx.state
            .record_revert(RevertRecord::new(
                ctx.line,
                vec![InverseOp::Restore {
                    model: model.clone(),
                    pk: record.pk,
                    field: field.name.clone(),
                    value: old,
                }],
            ))
            .await;

        Ok(CommandOutput::message(format!(
            "Updated `{}`'s {} to `{}`",
            identifier, field.name, shown
        )))
    }
}

/// Show one attribute or every attribute of an instance
pub struct ViewCommand;

#[async_trait]
impl ScriptCommand for ViewCommand {
    fn name(&self) -> &'static str {
        "VIEW"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[
            Param::required("MODEL"),
            Param::required("IDENTIFIER"),
            Param::optional("ATTRIBUTE"),
        ];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Displays an attribute of a model instance, or every attribute when ATTRIBUTE is left out."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;
        let identifier = required_text(&args, 1)?;
        let record = fetch_by_identifier(ctx.store, &model, &identifier).await?;

        if let Some(name) = arg_text(&args, 2) {
            let value = if name.eq_ignore_ascii_case(&model.primary_key) {
                serde_json::Value::from(record.pk)
            } else {
                let field = expect_field(&model, &name)?;
                record
                    .get(&field.name)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null)
            };

            let mut output = CommandOutput::message(display_json(&value));
            if let Some(path) = media_file(&value) {
                output = output.with_attachment(media_attachment(&path).await?);
            }
            return Ok(output);
        }

        let mut lines = vec![format!("{}: {}", model.primary_key, record.pk)];
        let mut attachments = Vec::new();

        for field in model.field_names().filter(|f| *f != model.primary_key) {
            let Some(value) = record.get(field) else {
                continue;
            };
            lines.push(format!("{}: {}", field, display_json(value)));
            if let Some(path) = media_file(value) {
                attachments.push(media_attachment(&path).await?);
            }
        }

        Ok(CommandOutput {
            message: Some(lines.join("\n")),
            attachments,
        })
    }
}

/// List the fields of a model
pub struct AttributesCommand;

#[async_trait]
impl ScriptCommand for AttributesCommand {
    fn name(&self) -> &'static str {
        "ATTRIBUTES"
    }

    fn params(&self) -> &'static [Param] {
        const PARAMS: &[Param] = &[Param::required("MODEL")];
        PARAMS
    }

    fn description(&self) -> &'static str {
        "Lists all changeable attributes of a model."
    }

    async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        args: Vec<Value>,
    ) -> Result<CommandOutput, ScriptError> {
        let model = expect_model(&args[0], ctx.models)?;

        let mut text = format!("{} ATTRIBUTES:\n", model.name);
        for field in model.fields.iter().filter(|f| f.name != model.primary_key) {
            text.push_str(&format!(
                "\n- {} ({})",
                field.name.replace(' ', "_").to_uppercase(),
                serde_json::to_value(field.field_type)
                    .ok()
                    .as_ref()
                    .map(display_json)
                    .unwrap_or_default()
            ));
        }

        Ok(CommandOutput::message(text))
    }
}
