//! Flow orchestration.
//!
//! The orchestrator drives every action through the same lifecycle: resolve
//! the handler, render options, validate, consult the conditional gate,
//! execute, record. There are no retries; a failure halts the active branch
//! and surfaces through the run result, while the snapshot tree stays
//! available for reporting.

mod document;


pub use document::{ActionStep, FlowDocument, FlowRequirements, METADATA_PREFIX};

use crate::context::{Context, DelegatedParameters};
use crate::errors::FlowError;
use crate::handlers::{install_builtins, ActionHandler, ActionHandlerRegistry, Invocation};
use crate::snapshot::ExecutionSnapshot;
use crate::template::{render_options, MiniJinjaRenderer, TemplateRenderer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of one flow run.
///
/// The snapshot tree is present regardless of success; reporters consume it
/// either way.
#[derive(Debug)]
pub struct FlowRunResult {
    /// Root of the execution trace.
    pub snapshot: ExecutionSnapshot,
    /// Whether the whole tree succeeded.
    pub success: bool,
    /// The error that halted the run, if any.
    pub error: Option<FlowError>,
    /// Total run duration in milliseconds.
    pub duration_ms: f64,
}

/// Drives pipeline documents through the action lifecycle.
pub struct FlowOrchestrator {
    registry: ActionHandlerRegistry,
    renderer: Box<dyn TemplateRenderer>,
}

impl Default for FlowOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowOrchestrator {
    /// Creates an orchestrator with the built-in handlers installed.
    #[must_use]
    pub fn new() -> Self {
        let registry = ActionHandlerRegistry::new();
        // A fresh registry has no keys to conflict with.
        install_builtins(&registry).ok();
        Self {
            registry,
            renderer: Box::new(MiniJinjaRenderer::new()),
        }
    }

    /// Swaps the template rendering backend.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Box<dyn TemplateRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Returns the global handler registry.
    #[must_use]
    pub fn registry(&self) -> &ActionHandlerRegistry {
        &self.registry
    }

    /// Resolves a handler key: global registry first, then the run-scoped
    /// dynamic registry on the context.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::UnknownAction`] when neither registry knows the
    /// key.
    pub fn resolve(
        &self,
        context: &Context,
        key: &str,
    ) -> Result<Arc<dyn ActionHandler>, FlowError> {
        if let Some(handler) = self.registry.get(key) {
            return Ok(handler);
        }
        context
            .dynamic_action_handlers
            .find(key)
            .map_err(Into::into)
    }

    /// Renders a single value in both template passes against the live
    /// bindings.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Template`] on a failing template.
    pub fn render_value(
        &self,
        context: &Context,
        parameters: &DelegatedParameters,
        value: &Value,
    ) -> Result<Value, FlowError> {
        render_options(self.renderer.as_ref(), context, parameters, value)
    }

    /// Runs a document's root step and returns the run result.
    pub async fn execute_flow(
        &self,
        document: &FlowDocument,
        context: Arc<Context>,
        wd: impl Into<PathBuf>,
    ) -> FlowRunResult {
        let wd = wd.into();
        tracing::info!(wd = %wd.display(), "flow started");

        let mut root = ExecutionSnapshot::new("flow", &wd, 0);
        let mut parameters = DelegatedParameters::new();
        let outcome = self
            .execute_action(
                &document.pipeline,
                Arc::clone(&context),
                &mut parameters,
                &mut root,
                &wd,
            )
            .await;

        match &outcome {
            Ok(()) => root.mark_success(),
            Err(err) => {
                tracing::warn!(error = %err, "flow halted");
                root.mark_failure(err);
            }
        }
        root.set_context_state(context.trace_state());
        root.stamp_duration();

        let success = root.subtree_succeeded();
        tracing::info!(success, duration_ms = root.duration_ms(), "flow finished");
        FlowRunResult {
            duration_ms: root.duration_ms(),
            success,
            error: outcome.err(),
            snapshot: root,
        }
    }

    /// Runs one step as a child of the given snapshot.
    ///
    /// The child snapshot is attached to the parent on every path, failure
    /// included, before the error propagates.
    ///
    /// # Errors
    ///
    /// Returns the lifecycle failure that halted the step.
    pub async fn execute_action(
        &self,
        step: &ActionStep,
        context: Arc<Context>,
        parameters: &mut DelegatedParameters,
        parent: &mut ExecutionSnapshot,
        wd: &Path,
    ) -> Result<(), FlowError> {
        let id = match step.id() {
            Ok(id) => id.to_string(),
            Err(err) => {
                let mut snapshot =
                    ExecutionSnapshot::new("unknown", wd, parent.next_child_index());
                snapshot.mark_failure(&err);
                snapshot.stamp_duration();
                parent.add_child(snapshot);
                return Err(err);
            }
        };
        let step_wd = match step.metadata("wd").and_then(Value::as_str) {
            Some(relative) => wd.join(relative),
            None => wd.to_path_buf(),
        };

        let mut snapshot = ExecutionSnapshot::new(&id, &step_wd, parent.next_child_index());
        tracing::debug!(action = %id, index = snapshot.index, "action started");

        let outcome = self
            .run_lifecycle(step, &id, &context, parameters, &mut snapshot, &step_wd)
            .await;
        if let Err(err) = &outcome {
            tracing::warn!(action = %id, error = %err, "action failed");
            snapshot.mark_failure(err);
        }
        snapshot.stamp_duration();
        parent.add_child(snapshot);
        outcome
    }

    async fn run_lifecycle(
        &self,
        step: &ActionStep,
        id: &str,
        context: &Arc<Context>,
        parameters: &mut DelegatedParameters,
        snapshot: &mut ExecutionSnapshot,
        wd: &Path,
    ) -> Result<(), FlowError> {
        let handler = self.resolve(context, id)?;
        let metadata = handler.metadata();

        let raw_options = step.options();
        let options = if metadata.skip_template_processing {
            raw_options
        } else {
            render_options(self.renderer.as_ref(), context, parameters, &raw_options)?
        };
        if metadata.sensitive_options {
            snapshot.record_masked_options();
        } else {
            snapshot.record_options(options.clone());
        }

        let mut invocation = Invocation {
            orchestrator: self,
            context: Arc::clone(context),
            parameters,
            snapshot: &mut *snapshot,
            options,
            wd: wd.to_path_buf(),
        };

        handler.validate(&invocation).await?;
        if !handler.is_should_execute(&invocation).await? {
            drop(invocation);
            tracing::debug!(action = %id, "action skipped by gate");
            snapshot.mark_skipped();
            return Ok(());
        }
        handler.execute(&mut invocation).await?;
        drop(invocation);

        snapshot.set_context_state(context.trace_state());
        snapshot.mark_success();
        Ok(())
    }
}

impl std::fmt::Debug for FlowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowOrchestrator")
            .field("registry", &self.registry)
            .finish()
    }
}
