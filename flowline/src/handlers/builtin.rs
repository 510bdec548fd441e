//! Built-in action kinds shipped with every orchestrator.

use super::{ActionHandler, ActionHandlerRegistry, ActionMetadata, Invocation};
use crate::context::{AssignDirective, DelegatedParameters, IterationState};
use crate::errors::{ExecutionError, FlowError, HandlerConflictError, ValidationError};
use crate::flow::ActionStep;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Registers every built-in handler into the given registry.
///
/// # Errors
///
/// Returns [`HandlerConflictError`] when a built-in key is already taken.
pub fn install_builtins(registry: &ActionHandlerRegistry) -> Result<(), HandlerConflictError> {
    registry.register(Arc::new(VoidHandler))?;
    registry.register(Arc::new(SleepHandler))?;
    registry.register(Arc::new(ErrorHandler))?;
    registry.register(Arc::new(SequenceHandler))?;
    registry.register(Arc::new(RepeatHandler))?;
    registry.register(Arc::new(DynamicActionHandler))?;
    registry.register(Arc::new(ShellHandler))?;
    Ok(())
}

/// Does nothing. Useful as a placeholder while authoring a pipeline.
#[derive(Debug, Default)]
pub struct VoidHandler;

#[async_trait]
impl ActionHandler for VoidHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new("void").with_alias("noop")
    }

    async fn execute(&self, _invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        Ok(())
    }
}

/// Sleeps for the number of seconds given as the option payload.
#[derive(Debug, Default)]
pub struct SleepHandler;

#[async_trait]
impl ActionHandler for SleepHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new("sleep")
    }

    fn validation_schema(&self) -> Option<Value> {
        Some(json!({"type": "number"}))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let seconds = invocation.options.as_f64().unwrap_or(0.0).max(0.0);
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(())
    }
}

/// Fails unconditionally with the message given as the option payload.
#[derive(Debug, Default)]
pub struct ErrorHandler;

#[async_trait]
impl ActionHandler for ErrorHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new("error")
    }

    fn validation_schema(&self) -> Option<Value> {
        Some(json!({"type": "string"}))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let message = invocation
            .options
            .as_str()
            .unwrap_or("error action reached")
            .to_string();
        Err(ExecutionError::new(message).into())
    }
}

/// Runs a list of sub-actions in declaration order.
///
/// Options are either a bare sequence of steps, or a mapping with `actions`
/// and an optional `shareParameters` flag. With shared parameters every step
/// sees the mutations of the previous one; otherwise each step gets its own
/// isolated bag, seeded with any pending child fan-out pushes.
#[derive(Debug, Default)]
pub struct SequenceHandler;

impl SequenceHandler {
    fn parse(options: &Value) -> Result<(Vec<ActionStep>, bool), FlowError> {
        let (raw_steps, shared) = match options {
            Value::Array(items) => (items.as_slice(), false),
            Value::Object(map) => {
                let items = map
                    .get("actions")
                    .and_then(Value::as_array)
                    .ok_or_else(|| FlowError::document("sequence requires an 'actions' list"))?;
                let shared = map
                    .get("shareParameters")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (items.as_slice(), shared)
            }
            _ => {
                return Err(FlowError::document(
                    "sequence options must be a list of actions or a mapping",
                ))
            }
        };

        let steps = raw_steps
            .iter()
            .map(|raw| ActionStep::from_value(raw.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((steps, shared))
    }
}

#[async_trait]
impl ActionHandler for SequenceHandler {
    fn metadata(&self) -> ActionMetadata {
        // Nested steps render their own options at invocation time.
        ActionMetadata::new("sequence")
            .with_alias("--")
            .skip_template_processing()
    }

    async fn validate(&self, invocation: &Invocation<'_>) -> Result<(), ValidationError> {
        Self::parse(&invocation.options)
            .map(|_| ())
            .map_err(|err| ValidationError::new("sequence", err.to_string()))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let (steps, shared) = Self::parse(&invocation.options)?;

        if shared {
            let mut bag = invocation.parameters.fork_for_child(false);
            for step in &steps {
                invocation
                    .orchestrator
                    .execute_action(
                        step,
                        Arc::clone(&invocation.context),
                        &mut bag,
                        invocation.snapshot,
                        &invocation.wd,
                    )
                    .await?;
            }
            invocation.parameters.absorb(bag);
        } else {
            for step in &steps {
                let mut bag = invocation.parameters.fork_for_child(true);
                invocation
                    .orchestrator
                    .execute_action(
                        step,
                        Arc::clone(&invocation.context),
                        &mut bag,
                        invocation.snapshot,
                        &invocation.wd,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

/// Runs a sub-action a fixed number of times, exposing iteration state.
#[derive(Debug, Default)]
pub struct RepeatHandler;

#[async_trait]
impl ActionHandler for RepeatHandler {
    fn metadata(&self) -> ActionMetadata {
        // The nested action stays raw until each iteration invokes it.
        ActionMetadata::new("repeat").skip_template_processing()
    }

    fn validation_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["times", "action"],
            "properties": {
                "action": {"type": "object"}
            }
        }))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        // `times` may itself be a template expression.
        let times = invocation
            .orchestrator
            .render_value(
                &invocation.context,
                invocation.parameters,
                &invocation.options["times"],
            )?
            .as_u64()
            .ok_or_else(|| FlowError::document("repeat 'times' must be a non-negative integer"))?;
        let step = ActionStep::from_value(invocation.options["action"].clone())?;

        for index in 0..times {
            let mut bag = invocation.parameters.fork_for_child(true);
            #[allow(clippy::cast_possible_truncation)]
            {
                bag.iteration = Some(IterationState::new(index as usize));
            }
            invocation
                .orchestrator
                .execute_action(
                    &step,
                    Arc::clone(&invocation.context),
                    &mut bag,
                    invocation.snapshot,
                    &invocation.wd,
                )
                .await?;
        }
        Ok(())
    }
}

/// An action kind defined by the pipeline itself.
///
/// The `register` built-in creates one of these from its options and places
/// it in the run-scoped dynamic registry on the context. When the registered
/// action is later invoked, its rendered options are exposed to the body at
/// `parameters.options`.
#[derive(Debug)]
pub struct DynamicActionHandler;

#[derive(Debug)]
struct RegisteredAction {
    metadata: ActionMetadata,
    step: ActionStep,
}

#[async_trait]
impl ActionHandler for RegisteredAction {
    fn metadata(&self) -> ActionMetadata {
        self.metadata.clone()
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let mut bag = DelegatedParameters::new()
            .with_parameters(json!({"options": invocation.options}));
        invocation
            .orchestrator
            .execute_action(
                &self.step,
                Arc::clone(&invocation.context),
                &mut bag,
                invocation.snapshot,
                &invocation.wd,
            )
            .await
    }
}

#[async_trait]
impl ActionHandler for DynamicActionHandler {
    fn metadata(&self) -> ActionMetadata {
        // The body must reach the registry untouched.
        ActionMetadata::new("register").skip_template_processing()
    }

    fn validation_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["id", "action"],
            "properties": {
                "id": {"type": "string"},
                "aliases": {"type": "array", "items": {"type": "string"}},
                "action": {"type": "object"}
            }
        }))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let options = &invocation.options;
        let id = options["id"]
            .as_str()
            .ok_or_else(|| FlowError::document("register requires a string 'id'"))?;

        let mut metadata = ActionMetadata::new(id);
        if let Some(aliases) = options.get("aliases").and_then(Value::as_array) {
            for alias in aliases.iter().filter_map(Value::as_str) {
                metadata = metadata.with_alias(alias);
            }
        }
        let step = ActionStep::from_value(options["action"].clone())?;

        invocation
            .context
            .dynamic_action_handlers
            .register(Arc::new(RegisteredAction { metadata, step }))?;
        invocation.snapshot.log(format!("registered action '{id}'"));
        Ok(())
    }
}

/// Runs a shell script on the host.
///
/// The script runs with the orchestrator's full host privileges; pipelines
/// are trusted input.
#[derive(Debug, Default)]
pub struct ShellHandler;

#[async_trait]
impl ActionHandler for ShellHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new("shell").with_alias("exec")
    }

    fn validation_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "required": ["script"],
            "properties": {
                "script": {"type": "string"},
                "executable": {"type": "string"},
                "assignResultTo": {"type": "string"}
            }
        }))
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        let options = invocation.options.clone();
        let script = options["script"].as_str().unwrap_or_default();
        let executable = options
            .get("executable")
            .and_then(Value::as_str)
            .unwrap_or("sh");

        tracing::info!(%executable, wd = %invocation.wd.display(), "running shell script");
        let mut child = Command::new(executable)
            .arg("-c")
            .arg(script)
            .current_dir(&invocation.wd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (status, out_lines, err_lines) =
            tokio::join!(child.wait(), read_lines(stdout), read_lines(stderr));
        let status = status?;

        for line in &out_lines {
            invocation.snapshot.log(line.clone());
        }
        for line in &err_lines {
            invocation.snapshot.log_err(line.clone());
        }

        if !status.success() {
            let code = status.code().unwrap_or(-1);
            return Err(
                ExecutionError::with_exit_code(format!("{executable} exited with {code}"), code)
                    .into(),
            );
        }

        if let Some(path) = options.get("assignResultTo").and_then(Value::as_str) {
            crate::context::assign_to(
                &invocation.context,
                invocation.parameters,
                invocation.snapshot,
                &AssignDirective::ctx(path),
                &json!(out_lines.join("\n")),
            )?;
        }
        Ok(())
    }
}

async fn read_lines<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<String> {
    let Some(reader) = reader else {
        return Vec::new();
    };
    let mut lines = BufReader::new(reader).lines();
    let mut collected = Vec::new();
    while let Ok(Some(line)) = lines.next_line().await {
        collected.push(line);
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::check_schema;

    #[test]
    fn test_install_builtins_registers_all_keys() {
        let registry = ActionHandlerRegistry::new();
        install_builtins(&registry).unwrap();

        for key in [
            "void", "noop", "sleep", "error", "sequence", "--", "repeat", "register", "shell",
            "exec",
        ] {
            assert!(registry.find(key).is_ok(), "missing builtin {key}");
        }
    }

    #[test]
    fn test_install_builtins_twice_conflicts() {
        let registry = ActionHandlerRegistry::new();
        install_builtins(&registry).unwrap();
        assert!(install_builtins(&registry).is_err());
    }

    #[test]
    fn test_sequence_accepts_both_option_shapes() {
        let (steps, shared) =
            SequenceHandler::parse(&json!([{"void": null}, {"sleep": 0}])).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(!shared);

        let (steps, shared) = SequenceHandler::parse(&json!({
            "actions": [{"void": null}],
            "shareParameters": true
        }))
        .unwrap();
        assert_eq!(steps.len(), 1);
        assert!(shared);
    }

    #[test]
    fn test_sequence_rejects_scalar_options() {
        assert!(SequenceHandler::parse(&json!("nope")).is_err());
        assert!(SequenceHandler::parse(&json!({"shareParameters": true})).is_err());
    }

    #[test]
    fn test_nested_kinds_opt_out_of_rendering() {
        assert!(SequenceHandler.metadata().skip_template_processing);
        assert!(RepeatHandler.metadata().skip_template_processing);
        assert!(DynamicActionHandler.metadata().skip_template_processing);
        assert!(!ShellHandler.metadata().skip_template_processing);
    }

    #[test]
    fn test_shell_schema_requires_script() {
        let schema = ShellHandler.validation_schema().unwrap();
        assert!(check_schema("shell", &schema, &json!({"script": "true"})).is_ok());
        assert!(check_schema("shell", &schema, &json!({"executable": "sh"})).is_err());
    }
}
