//! The action-handler extension contract.
//!
//! Every action kind implements [`ActionHandler`], a closed capability set
//! driven by the orchestrator in a fixed sequence: validate, conditional
//! gate, execute. Handlers that only provide an execute body inherit
//! pass-through defaults for the other phases, so the full lifecycle is
//! still observed functionally.

mod builtin;
mod registry;
mod schema;

pub use builtin::{
    install_builtins, DynamicActionHandler, ErrorHandler, RepeatHandler, SequenceHandler,
    ShellHandler, SleepHandler, VoidHandler,
};
pub use registry::ActionHandlerRegistry;
pub use schema::check_schema;

use crate::context::{Context, DelegatedParameters};
use crate::errors::{FlowError, ValidationError};
use crate::flow::FlowOrchestrator;
use crate::snapshot::ExecutionSnapshot;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Static description of an action kind.
#[derive(Debug, Clone, Default)]
pub struct ActionMetadata {
    /// Unique handler id.
    pub id: String,
    /// Alternative lookup keys.
    pub aliases: Vec<String>,
    /// Skip template rendering of the declared options.
    pub skip_template_processing: bool,
    /// Record a mask instead of the option payload in snapshots.
    pub sensitive_options: bool,
}

impl ActionMetadata {
    /// Creates metadata for the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Adds an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Declares that options must not be template-processed.
    #[must_use]
    pub fn skip_template_processing(mut self) -> Self {
        self.skip_template_processing = true;
        self
    }

    /// Declares the options sensitive, masking them in snapshots.
    #[must_use]
    pub fn sensitive_options(mut self) -> Self {
        self.sensitive_options = true;
        self
    }
}

/// Everything a handler receives for one action invocation.
pub struct Invocation<'a> {
    /// The orchestrator driving the run, for nested invocations.
    pub orchestrator: &'a FlowOrchestrator,
    /// The shared run context.
    pub context: Arc<Context>,
    /// The per-invocation parameter bag.
    pub parameters: &'a mut DelegatedParameters,
    /// The snapshot owned by this invocation.
    pub snapshot: &'a mut ExecutionSnapshot,
    /// Rendered options (raw when the handler opts out of rendering).
    pub options: Value,
    /// Working directory of the invocation.
    pub wd: PathBuf,
}

impl std::fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("action_id", &self.snapshot.action_id)
            .field("wd", &self.wd)
            .finish()
    }
}

/// Trait implemented by every action kind.
///
/// Dispatch happens through the [`ActionHandlerRegistry`], never via
/// inheritance chains.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Returns the handler's static metadata.
    fn metadata(&self) -> ActionMetadata;

    /// Returns the declared options schema, if any.
    fn validation_schema(&self) -> Option<Value> {
        None
    }

    /// Checks rendered options before any side effect occurs.
    ///
    /// The default checks the declared schema when one is present. A failure
    /// aborts the invocation and is never retried.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the options are rejected.
    async fn validate(&self, invocation: &Invocation<'_>) -> Result<(), ValidationError> {
        if let Some(declared) = self.validation_schema() {
            check_schema(&self.metadata().id, &declared, &invocation.options)?;
        }
        Ok(())
    }

    /// Conditional gate: may veto execution without failing the run.
    ///
    /// # Errors
    ///
    /// Returns an error only when evaluating the gate itself fails.
    async fn is_should_execute(&self, _invocation: &Invocation<'_>) -> Result<bool, FlowError> {
        Ok(true)
    }

    /// The side-effecting body.
    ///
    /// # Errors
    ///
    /// Returns the execution failure, which fails the active branch.
    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError>;
}

impl std::fmt::Debug for dyn ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandler")
            .field("id", &self.metadata().id)
            .finish()
    }
}

/// Closure signature accepted by [`FnActionHandler`].
pub type ActionFn =
    dyn for<'a, 'b> Fn(&'b mut Invocation<'a>) -> Result<(), FlowError> + Send + Sync;

/// A handler built from a single synchronous closure.
///
/// Covers action kinds with a combined body and no custom validation or
/// gating.
pub struct FnActionHandler {
    metadata: ActionMetadata,
    body: Box<ActionFn>,
}

impl FnActionHandler {
    /// Creates a handler from metadata and a closure body.
    pub fn new<F>(metadata: ActionMetadata, body: F) -> Self
    where
        F: for<'a, 'b> Fn(&'b mut Invocation<'a>) -> Result<(), FlowError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            metadata,
            body: Box::new(body),
        }
    }
}

impl std::fmt::Debug for FnActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnActionHandler")
            .field("id", &self.metadata.id)
            .finish()
    }
}

#[async_trait]
impl ActionHandler for FnActionHandler {
    fn metadata(&self) -> ActionMetadata {
        self.metadata.clone()
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        (self.body)(invocation)
    }
}
