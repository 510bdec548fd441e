//! The mutable state container passed through a run.

use crate::context::DelegatedParameters;
use crate::errors::MergeTypeMismatchError;
use crate::handlers::ActionHandlerRegistry;
use crate::merge::{merge, MergeModifiers};
use crate::template::DelimiterConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Named mutable roots addressable by `$.`-path expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRoot {
    /// General-purpose working data.
    Ctx,
    /// Same shape as `ctx`, excluded from trace output.
    Secrets,
}

/// An entity side-effect record tracked across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// The entity type, e.g. "user" or "deployment".
    #[serde(rename = "type")]
    pub kind: String,
    /// The entity identifier.
    pub id: Value,
    /// Optional free-form payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl EntityRecord {
    /// Creates a new entity record.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            payload: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A human-facing rollup entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// The entry title.
    pub title: String,
    /// The entry status, e.g. "created" or "failed".
    pub status: String,
    /// Optional duration string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Optional free-form payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl SummaryRecord {
    /// Creates a new summary record.
    #[must_use]
    pub fn new(title: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: status.into(),
            duration: None,
            payload: None,
        }
    }

    /// Sets the duration string.
    #[must_use]
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Default, Clone, Serialize)]
struct EntityLog {
    registered: Vec<EntityRecord>,
    unregistered: Vec<EntityRecord>,
    deleted: Vec<EntityRecord>,
}

#[derive(Debug)]
struct ContextState {
    ctx: Value,
    secrets: Value,
    entities: EntityLog,
    summary: Vec<SummaryRecord>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            ctx: json!({}),
            secrets: json!({}),
            entities: EntityLog::default(),
            summary: Vec::new(),
        }
    }
}

/// The single mutable state threaded through one run.
///
/// `ctx` and `secrets` hold plain nested mappings and sequences only; all
/// mutation goes through the path accessors so template resolution stays
/// deterministic. Shared across an execution via `Arc`.
pub struct Context {
    state: RwLock<ContextState>,
    /// Registry for handler kinds registered at run time by the pipeline
    /// itself. Consulted only after the global registry misses; never merged
    /// back into it.
    pub dynamic_action_handlers: ActionHandlerRegistry,
    delimiters: DelimiterConfig,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a new empty context with default template delimiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ContextState::default()),
            dynamic_action_handlers: ActionHandlerRegistry::new(),
            delimiters: DelimiterConfig::default(),
        }
    }

    /// Sets the template delimiter configuration.
    #[must_use]
    pub fn with_delimiters(mut self, delimiters: DelimiterConfig) -> Self {
        self.delimiters = delimiters;
        self
    }

    /// Returns the delimiter configuration.
    #[must_use]
    pub fn delimiters(&self) -> &DelimiterConfig {
        &self.delimiters
    }

    /// Returns a copy of the `ctx` root.
    #[must_use]
    pub fn ctx(&self) -> Value {
        self.state.read().ctx.clone()
    }

    /// Returns a copy of the `secrets` root.
    #[must_use]
    pub fn secrets(&self) -> Value {
        self.state.read().secrets.clone()
    }

    /// Deep-merges an overlay into the named root.
    ///
    /// # Errors
    ///
    /// Returns [`MergeTypeMismatchError`] on container-shape mismatch.
    pub fn merge_into(
        &self,
        root: ContextRoot,
        overlay: &Value,
        modifiers: &MergeModifiers,
    ) -> Result<(), MergeTypeMismatchError> {
        let mut state = self.state.write();
        let target = match root {
            ContextRoot::Ctx => &mut state.ctx,
            ContextRoot::Secrets => &mut state.secrets,
        };
        *target = merge(target, overlay, modifiers)?;
        Ok(())
    }

    /// Runs a closure with mutable access to the named root.
    pub(crate) fn with_root_mut<R>(
        &self,
        root: ContextRoot,
        f: impl FnOnce(&mut Value) -> R,
    ) -> R {
        let mut state = self.state.write();
        let target = match root {
            ContextRoot::Ctx => &mut state.ctx,
            ContextRoot::Secrets => &mut state.secrets,
        };
        f(target)
    }

    /// Records an entity as registered.
    pub fn register_entity(&self, record: EntityRecord) {
        self.state.write().entities.registered.push(record);
    }

    /// Records an entity as unregistered.
    pub fn unregister_entity(&self, record: EntityRecord) {
        self.state.write().entities.unregistered.push(record);
    }

    /// Records an entity as deleted.
    pub fn delete_entity(&self, record: EntityRecord) {
        self.state.write().entities.deleted.push(record);
    }

    /// Returns copies of the entity sequences: registered, unregistered,
    /// deleted.
    #[must_use]
    pub fn entities(&self) -> (Vec<EntityRecord>, Vec<EntityRecord>, Vec<EntityRecord>) {
        let state = self.state.read();
        (
            state.entities.registered.clone(),
            state.entities.unregistered.clone(),
            state.entities.deleted.clone(),
        )
    }

    /// Appends a summary record.
    pub fn add_summary(&self, record: SummaryRecord) {
        self.state.write().summary.push(record);
    }

    /// Returns a copy of the summary rollup.
    #[must_use]
    pub fn summary(&self) -> Vec<SummaryRecord> {
        self.state.read().summary.clone()
    }

    /// Produces the state copy captured into snapshots.
    ///
    /// `secrets` are excluded from trace output by convention.
    #[must_use]
    pub fn trace_state(&self) -> Value {
        let state = self.state.read();
        json!({
            "ctx": state.ctx,
            "entities": state.entities,
            "summary": state.summary,
        })
    }

    /// Produces the `{ctx, secrets, parameters, iteration}` binding object
    /// templates are rendered against.
    #[must_use]
    pub fn to_bindings(&self, parameters: &DelegatedParameters) -> Value {
        let state = self.state.read();
        json!({
            "ctx": state.ctx,
            "secrets": state.secrets,
            "parameters": parameters.parameters,
            "iteration": parameters.iteration,
        })
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Context")
            .field("ctx", &state.ctx)
            .field("summary_len", &state.summary.len())
            .field("dynamic_handlers", &self.dynamic_action_handlers.len())
            .finish()
    }
}
