//! Execution-snapshot tree.
//!
//! One [`ExecutionSnapshot`] is created per action invocation, forming a tree
//! isomorphic to the pipeline structure. The tree is the sole audit artifact
//! handed to reporters, success or failure.

use crate::errors::FlowError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Output stream a log line was tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Regular output.
    Stdout,
    /// Error-style output.
    Stderr,
}

/// A single log line recorded on a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// The stream the line belongs to.
    pub stream: LogStream,
    /// The line content.
    pub line: String,
    /// When the line was recorded.
    pub at: DateTime<Utc>,
}

/// Placeholder recorded instead of option payloads for sensitive handlers.
pub const MASKED_OPTIONS: &str = "[MASKED]";

/// One node of the execution trace tree.
///
/// Created by the orchestrator immediately before an action's lifecycle runs,
/// mutated only by the owning handler and the orchestrator, and treated as
/// immutable once the lifecycle completes.
#[derive(Debug, Serialize)]
pub struct ExecutionSnapshot {
    /// The resolved handler id or alias actually used.
    pub action_id: String,
    /// Working directory of the invocation.
    pub wd: PathBuf,
    /// Monotonic index among siblings.
    pub index: usize,
    /// Declared options, pre- or post-render per handler opt-out; masked for
    /// sensitive handlers.
    pub options: Option<Value>,
    /// Copy of context state captured after a successful execute phase.
    context_state: Option<Value>,
    /// Free-form log lines.
    logs: Vec<LogEntry>,
    /// Arbitrary handler-attached annotations.
    extras: Map<String, Value>,
    /// Whether the action completed successfully (skips count as success).
    success: bool,
    /// Whether the conditional gate vetoed execution.
    skipped: bool,
    /// Structured error payload if the action failed.
    error: Option<Value>,
    /// Wall-clock start time.
    started_at: DateTime<Utc>,
    /// Execution duration in milliseconds.
    duration_ms: f64,
    /// Child snapshots: sub-actions, loop iterations, conditional branches.
    children: Vec<ExecutionSnapshot>,
    #[serde(skip)]
    timer: Option<Instant>,
}

impl ExecutionSnapshot {
    /// Creates a new snapshot and starts its timer.
    #[must_use]
    pub fn new(action_id: impl Into<String>, wd: impl Into<PathBuf>, index: usize) -> Self {
        Self {
            action_id: action_id.into(),
            wd: wd.into(),
            index,
            options: None,
            context_state: None,
            logs: Vec::new(),
            extras: Map::new(),
            success: false,
            skipped: false,
            error: None,
            started_at: Utc::now(),
            duration_ms: 0.0,
            children: Vec::new(),
            timer: Some(Instant::now()),
        }
    }

    /// Records the option payload as declared.
    pub fn record_options(&mut self, options: Value) {
        self.options = Some(options);
    }

    /// Records a mask instead of the option payload.
    pub fn record_masked_options(&mut self) {
        self.options = Some(Value::String(MASKED_OPTIONS.to_string()));
    }

    /// Appends a stdout-style log line.
    pub fn log(&mut self, line: impl Into<String>) {
        self.push_log(LogStream::Stdout, line.into());
    }

    /// Appends a stderr-style log line.
    pub fn log_err(&mut self, line: impl Into<String>) {
        self.push_log(LogStream::Stderr, line.into());
    }

    fn push_log(&mut self, stream: LogStream, line: String) {
        tracing::debug!(action = %self.action_id, ?stream, %line, "action log");
        self.logs.push(LogEntry {
            stream,
            line,
            at: Utc::now(),
        });
    }

    /// Returns the recorded log lines.
    #[must_use]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    /// Attaches an arbitrary annotation.
    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extras.insert(key.into(), value);
    }

    /// Returns an attached annotation, if present.
    #[must_use]
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    /// Captures a copy of context state onto the snapshot.
    pub fn set_context_state(&mut self, state: Value) {
        self.context_state = Some(state);
    }

    /// Returns the captured context state, if any.
    #[must_use]
    pub fn context_state(&self) -> Option<&Value> {
        self.context_state.as_ref()
    }

    /// Marks the action as completed successfully.
    pub fn mark_success(&mut self) {
        self.success = true;
        self.skipped = false;
    }

    /// Marks the action as vetoed by its conditional gate.
    ///
    /// A skipped action ran no children and is not a failure.
    pub fn mark_skipped(&mut self) {
        self.success = true;
        self.skipped = true;
    }

    /// Marks the action as failed, recording the structured error payload.
    pub fn mark_failure(&mut self, error: &FlowError) {
        self.success = false;
        self.skipped = false;
        self.error = Some(error.to_value());
    }

    /// Stamps the duration from the internal timer.
    ///
    /// Called by the orchestrator regardless of the path taken through the
    /// lifecycle.
    pub fn stamp_duration(&mut self) {
        if let Some(timer) = self.timer.take() {
            self.duration_ms = timer.elapsed().as_secs_f64() * 1000.0;
        }
    }

    /// Attaches a completed child snapshot.
    pub fn add_child(&mut self, child: ExecutionSnapshot) {
        self.children.push(child);
    }

    /// Returns the index the next child will receive.
    #[must_use]
    pub fn next_child_index(&self) -> usize {
        self.children.len()
    }

    /// Returns the child snapshots in declaration order.
    #[must_use]
    pub fn children(&self) -> &[ExecutionSnapshot] {
        &self.children
    }

    /// Returns whether this action itself succeeded (skips included).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns whether the conditional gate vetoed this action.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Returns the structured error payload, if the action failed.
    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        self.error.as_ref()
    }

    /// Returns the wall-clock start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the stamped duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration_ms
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_directory(&self) -> &Path {
        &self.wd
    }

    /// Returns true when this snapshot and every descendant succeeded.
    #[must_use]
    pub fn subtree_succeeded(&self) -> bool {
        self.success && self.children.iter().all(ExecutionSnapshot::subtree_succeeded)
    }

    /// Finds the first failed snapshot in the subtree, depth-first.
    #[must_use]
    pub fn first_failure(&self) -> Option<&ExecutionSnapshot> {
        if !self.success {
            return Some(self);
        }
        self.children.iter().find_map(ExecutionSnapshot::first_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ExecutionError, FlowError};
    use serde_json::json;

    #[test]
    fn test_snapshot_creation() {
        let snap = ExecutionSnapshot::new("copy", "/tmp", 0);
        assert_eq!(snap.action_id, "copy");
        assert_eq!(snap.index, 0);
        assert!(!snap.is_success());
        assert!(snap.children().is_empty());
    }

    #[test]
    fn test_outcome_recording() {
        let mut snap = ExecutionSnapshot::new("copy", "/tmp", 0);
        snap.mark_success();
        snap.stamp_duration();

        assert!(snap.is_success());
        assert!(!snap.is_skipped());
        assert!(snap.duration_ms() >= 0.0);
    }

    #[test]
    fn test_failure_records_error_payload() {
        let mut snap = ExecutionSnapshot::new("shell", "/tmp", 0);
        let err = FlowError::from(ExecutionError::with_exit_code("exit 2", 2));
        snap.mark_failure(&err);

        let payload = snap.error().unwrap();
        assert_eq!(payload["type"], "ExecutionError");
        assert_eq!(payload["exit_code"], 2);
        assert!(!snap.subtree_succeeded());
    }

    #[test]
    fn test_skip_is_not_a_failure() {
        let mut snap = ExecutionSnapshot::new("maybe", "/tmp", 0);
        snap.mark_skipped();

        assert!(snap.is_skipped());
        assert!(snap.subtree_succeeded());
    }

    #[test]
    fn test_subtree_failure_detection() {
        let mut root = ExecutionSnapshot::new("sequence", "/tmp", 0);
        root.mark_success();

        let mut ok_child = ExecutionSnapshot::new("void", "/tmp", 0);
        ok_child.mark_success();
        root.add_child(ok_child);

        let mut bad_child = ExecutionSnapshot::new("error", "/tmp", 1);
        bad_child.mark_failure(&FlowError::from(ExecutionError::new("boom")));
        root.add_child(bad_child);

        assert!(!root.subtree_succeeded());
        assert_eq!(root.first_failure().unwrap().action_id, "error");
    }

    #[test]
    fn test_masked_options() {
        let mut snap = ExecutionSnapshot::new("secret-op", "/tmp", 0);
        snap.record_masked_options();
        assert_eq!(snap.options, Some(json!(MASKED_OPTIONS)));
    }

    #[test]
    fn test_logs_and_extras() {
        let mut snap = ExecutionSnapshot::new("shell", "/tmp", 0);
        snap.log("line one");
        snap.log_err("oops");
        snap.set_extra("attempt", json!(1));

        assert_eq!(snap.logs().len(), 2);
        assert_eq!(snap.logs()[1].stream, LogStream::Stderr);
        assert_eq!(snap.extra("attempt"), Some(&json!(1)));
    }

    #[test]
    fn test_serializes_for_reporters() {
        let mut snap = ExecutionSnapshot::new("void", "/tmp", 0);
        snap.mark_success();
        snap.stamp_duration();

        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["action_id"], "void");
        assert_eq!(value["success"], true);
    }
}
