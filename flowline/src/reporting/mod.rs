//! Run reporting over the snapshot tree.
//!
//! Reporters consume a finished [`ExecutionSnapshot`] tree and write a
//! rendition of it to an output stream. The tree is handed over whether the
//! run succeeded or failed.

use crate::errors::FlowError;
use crate::snapshot::ExecutionSnapshot;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

/// A report generator over the execution trace.
#[async_trait]
pub trait Reporter: Send + Sync {
    /// The name reports are requested under.
    fn name(&self) -> &str;

    /// Writes the report for the given snapshot tree.
    ///
    /// # Errors
    ///
    /// Returns the failure that prevented report generation.
    async fn generate(
        &self,
        output: &mut (dyn Write + Send),
        options: &Value,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), FlowError>;
}

/// Named collection of available reporters.
#[derive(Default)]
pub struct ReporterSet {
    reporters: RwLock<HashMap<String, Arc<dyn Reporter>>>,
}

impl ReporterSet {
    /// Creates a set with the built-in JSON reporter installed.
    #[must_use]
    pub fn new() -> Self {
        let set = Self::default();
        set.register(Arc::new(JsonReporter));
        set
    }

    /// Registers a reporter under its name, replacing any previous one.
    pub fn register(&self, reporter: Arc<dyn Reporter>) {
        self.reporters
            .write()
            .insert(reporter.name().to_string(), reporter);
    }

    /// Returns the reporter registered under the name, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Reporter>> {
        self.reporters.read().get(name).map(Arc::clone)
    }

    /// Returns the registered reporter names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.reporters.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered reporters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reporters.read().len()
    }

    /// Returns true when no reporters are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reporters.read().is_empty()
    }
}

impl std::fmt::Debug for ReporterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterSet")
            .field("names", &self.names())
            .finish()
    }
}

/// Serializes the whole snapshot tree as pretty-printed JSON.
#[derive(Debug, Default)]
pub struct JsonReporter;

#[async_trait]
impl Reporter for JsonReporter {
    fn name(&self) -> &str {
        "json"
    }

    async fn generate(
        &self,
        output: &mut (dyn Write + Send),
        _options: &Value,
        snapshot: &ExecutionSnapshot,
    ) -> Result<(), FlowError> {
        let rendered = serde_json::to_string_pretty(snapshot)
            .map_err(|err| FlowError::template(err.to_string()))?;
        output.write_all(rendered.as_bytes())?;
        output.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_reporter_emits_tree() {
        let mut snapshot = ExecutionSnapshot::new("flow", "/tmp", 0);
        let mut child = ExecutionSnapshot::new("void", "/tmp", 0);
        child.mark_success();
        snapshot.add_child(child);
        snapshot.mark_success();

        let mut output = Vec::new();
        tokio_test::block_on(JsonReporter.generate(&mut output, &json!({}), &snapshot))
            .unwrap();

        let parsed: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed["action_id"], "flow");
        assert_eq!(parsed["children"][0]["action_id"], "void");
    }

    #[test]
    fn test_set_registration_and_lookup() {
        let set = ReporterSet::new();
        assert_eq!(set.names(), vec!["json"]);
        assert!(set.get("json").is_some());
        assert!(set.get("html").is_none());
    }
}
