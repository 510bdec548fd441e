//! Support code for exercising flows in tests.

use crate::errors::{ExecutionError, FlowError};
use crate::handlers::{ActionHandler, ActionMetadata, Invocation};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// Installs a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Records every option payload it is executed with.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    id: String,
    /// Option payloads in invocation order.
    pub recorded: Mutex<Vec<Value>>,
}

impl RecordingHandler {
    /// Creates a recorder registered under the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// Returns the payloads recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<Value> {
        self.recorded.lock().clone()
    }
}

#[async_trait]
impl ActionHandler for RecordingHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(&self.id)
    }

    async fn execute(&self, invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        self.recorded.lock().push(invocation.options.clone());
        Ok(())
    }
}

/// Fails every execution with a fixed message.
#[derive(Debug)]
pub struct FailingHandler {
    id: String,
    message: String,
}

impl FailingHandler {
    /// Creates a handler that always fails.
    #[must_use]
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for FailingHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(&self.id)
    }

    async fn execute(&self, _invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        Err(ExecutionError::new(self.message.clone()).into())
    }
}

/// A handler whose conditional gate always vetoes execution.
#[derive(Debug)]
pub struct SkippingHandler {
    id: String,
}

impl SkippingHandler {
    /// Creates a handler that is always skipped.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl ActionHandler for SkippingHandler {
    fn metadata(&self) -> ActionMetadata {
        ActionMetadata::new(&self.id)
    }

    async fn is_should_execute(&self, _invocation: &Invocation<'_>) -> Result<bool, FlowError> {
        Ok(false)
    }

    async fn execute(&self, _invocation: &mut Invocation<'_>) -> Result<(), FlowError> {
        Err(ExecutionError::new("skipped handler must not execute").into())
    }
}
