//! Error types for the flowline engine.
//!
//! The taxonomy distinguishes structural errors (validation, dependency
//! resolution, path syntax) from execution errors raised by action handlers.
//! Structural errors abort the smallest enclosing unit and are never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for flowline operations.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Rendered options failed a handler's declared schema or custom checks.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An action id/alias was not found in any applicable registry.
    #[error("{0}")]
    UnknownAction(#[from] UnknownActionError),

    /// Incompatible shapes met during a deep merge with no modifier.
    #[error("{0}")]
    MergeTypeMismatch(#[from] MergeTypeMismatchError),

    /// A `$.`-path expression did not match the required grammar.
    #[error("{0}")]
    PathSyntax(#[from] PathSyntaxError),

    /// Plugin loading failed: host incompatibility, unmet range or cycle.
    #[error("{0}")]
    Dependency(#[from] DependencyError),

    /// An interactive step was cancelled by the user.
    #[error("{0}")]
    UserInterruption(#[from] UserInterruptionError),

    /// A handler failed during the execute phase.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// Registering a handler collided with an existing id or alias.
    #[error("{0}")]
    HandlerConflict(#[from] HandlerConflictError),

    /// A pipeline document violated its structural invariants.
    #[error("Invalid pipeline document: {0}")]
    Document(String),

    /// Template rendering failed.
    #[error("Template rendering failed: {0}")]
    Template(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FlowError {
    /// Creates a document-shape error.
    #[must_use]
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document(message.into())
    }

    /// Creates a template-rendering error.
    #[must_use]
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    /// Converts the error into a structured payload for snapshot recording.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        let kind = match self {
            Self::Validation(_) => "ValidationError",
            Self::UnknownAction(_) => "UnknownActionError",
            Self::MergeTypeMismatch(_) => "MergeTypeMismatchError",
            Self::PathSyntax(_) => "PathSyntaxError",
            Self::Dependency(_) => "DependencyError",
            Self::UserInterruption(_) => "UserInterruptionError",
            Self::Execution(_) => "ExecutionError",
            Self::HandlerConflict(_) => "HandlerConflictError",
            Self::Document(_) => "DocumentError",
            Self::Template(_) => "TemplateError",
            Self::Io(_) => "IoError",
        };

        let mut payload = serde_json::json!({
            "type": kind,
            "message": self.to_string(),
        });

        if let Self::Execution(err) = self {
            if let Some(code) = err.exit_code {
                payload["exit_code"] = serde_json::json!(code);
            }
        }

        payload
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        Self::Execution(ExecutionError::new(format!("{err:#}")))
    }
}

/// Error raised when rendered options fail a handler's validation.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Validation failed for action '{action_id}': {message}")]
pub struct ValidationError {
    /// The id of the action whose options failed validation.
    pub action_id: String,
    /// The validation failure detail.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            message: message.into(),
        }
    }
}

/// Error raised when an action id or alias cannot be resolved.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Action handler not found for id or alias '{lookup}'")]
pub struct UnknownActionError {
    /// The id or alias that was looked up.
    pub lookup: String,
}

impl UnknownActionError {
    /// Creates a new unknown-action error.
    #[must_use]
    pub fn new(lookup: impl Into<String>) -> Self {
        Self {
            lookup: lookup.into(),
        }
    }
}

/// Error raised when a deep merge meets incompatible container shapes.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Cannot merge {overlay_kind} into {base_kind} at path '{path}'")]
pub struct MergeTypeMismatchError {
    /// The path at which the shapes diverged.
    pub path: String,
    /// The kind of the base value.
    pub base_kind: String,
    /// The kind of the overlay value.
    pub overlay_kind: String,
}

impl MergeTypeMismatchError {
    /// Creates a new merge type-mismatch error.
    #[must_use]
    pub fn new(
        path: impl Into<String>,
        base_kind: impl Into<String>,
        overlay_kind: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            base_kind: base_kind.into(),
            overlay_kind: overlay_kind.into(),
        }
    }
}

/// Error raised when a path expression violates the `$.` grammar.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Invalid path expression '{expression}', expected $.segment(.segment)*")]
pub struct PathSyntaxError {
    /// The offending expression.
    pub expression: String,
}

impl PathSyntaxError {
    /// Creates a new path-syntax error.
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

/// Errors raised during plugin dependency resolution.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum DependencyError {
    /// A plugin's host version range does not match the running host.
    #[error("Plugin '{plugin}' requires host version '{required}', host is '{host}'")]
    HostIncompatible {
        /// The plugin name.
        plugin: String,
        /// The declared host version range.
        required: String,
        /// The actual host version.
        host: String,
    },

    /// A required plugin is missing or its version does not satisfy the range.
    #[error("Plugin '{requirer}' has unmet dependency '{required}' (range '{range}')")]
    Unmet {
        /// The plugin declaring the requirement.
        requirer: String,
        /// The required plugin key.
        required: String,
        /// The declared version range.
        range: String,
    },

    /// The requirement graph contains a cycle.
    #[error("Circular plugin dependency: {}", members.join(" -> "))]
    Cycle {
        /// The plugin keys forming the cycle.
        members: Vec<String>,
    },

    /// A required application is not present on the host.
    #[error("Required application '{application}' was not found on the host")]
    MissingApplication {
        /// The application name.
        application: String,
    },
}

impl DependencyError {
    /// Creates a host-incompatibility error.
    #[must_use]
    pub fn host_incompatible(
        plugin: impl Into<String>,
        required: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self::HostIncompatible {
            plugin: plugin.into(),
            required: required.into(),
            host: host.into(),
        }
    }

    /// Creates an unmet-dependency error.
    #[must_use]
    pub fn unmet(
        requirer: impl Into<String>,
        required: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self::Unmet {
            requirer: requirer.into(),
            required: required.into(),
            range: range.into(),
        }
    }

    /// Creates a cycle error from the member keys.
    #[must_use]
    pub fn cycle(members: Vec<String>) -> Self {
        Self::Cycle { members }
    }

    /// Creates a missing-application error.
    #[must_use]
    pub fn missing_application(application: impl Into<String>) -> Self {
        Self::MissingApplication {
            application: application.into(),
        }
    }
}

/// Error raised when a user cancels an interactive step.
///
/// Propagates like any other execution failure, failing the active branch.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("User interruption: {message}")]
pub struct UserInterruptionError {
    /// The cancellation detail.
    pub message: String,
}

impl UserInterruptionError {
    /// Creates a new user-interruption error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised by a handler during the execute phase.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Execution failed: {message}")]
pub struct ExecutionError {
    /// The failure detail.
    pub message: String,
    /// Subprocess exit code, when the failure came from a spawned process.
    pub exit_code: Option<i32>,
}

impl ExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    /// Creates an execution error carrying a subprocess exit code.
    #[must_use]
    pub fn with_exit_code(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code: Some(exit_code),
        }
    }
}

/// Error raised when a handler registration collides with an existing entry.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("Action handler conflict: '{key}' is already registered")]
pub struct HandlerConflictError {
    /// The colliding id or alias.
    pub key: String,
}

impl HandlerConflictError {
    /// Creates a new handler-conflict error.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("copy", "missing field 'target'");
        assert_eq!(
            err.to_string(),
            "Validation failed for action 'copy': missing field 'target'"
        );
    }

    #[test]
    fn test_merge_mismatch_names_path() {
        let err = MergeTypeMismatchError::new("$.a", "mapping", "boolean");
        assert!(err.to_string().contains("$.a"));
    }

    #[test]
    fn test_dependency_cycle_display() {
        let err = DependencyError::cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "Circular plugin dependency: a -> b -> a");
    }

    #[test]
    fn test_execution_error_to_value_carries_exit_code() {
        let err = FlowError::from(ExecutionError::with_exit_code("command failed", 3));
        let payload = err.to_value();
        assert_eq!(payload["type"], "ExecutionError");
        assert_eq!(payload["exit_code"], 3);
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: FlowError = anyhow::anyhow!("handler blew up").into();
        assert!(matches!(err, FlowError::Execution(_)));
        assert!(err.to_string().contains("handler blew up"));
    }
}
