//! Per-invocation auxiliary bindings.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Loop state exposed to repeating constructs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationState {
    /// Zero-based iteration index.
    pub index: usize,
    /// The current item, when iterating over a sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// The current key, when iterating over a mapping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl IterationState {
    /// Creates iteration state for a bare index.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self {
            index,
            value: None,
            key: None,
        }
    }

    /// Sets the current item.
    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Sets the current key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ChildUpdate {
    pub(crate) segments: Vec<String>,
    pub(crate) value: Value,
}

/// Per-step, non-merged auxiliary bindings passed alongside the context.
///
/// Created fresh by the orchestrator for each nested action invocation and
/// never persisted beyond that invocation's subtree.
#[derive(Debug, Clone)]
pub struct DelegatedParameters {
    /// Caller-supplied parameter bag.
    pub parameters: Value,
    /// Loop state for repeating constructs.
    pub iteration: Option<IterationState>,
    /// Values pushed with `children: true`, waiting to fan out into child
    /// parameter bags at creation time.
    pub(crate) child_updates: Vec<ChildUpdate>,
}

impl Default for DelegatedParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegatedParameters {
    /// Creates an empty parameter bag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parameters: json!({}),
            iteration: None,
            child_updates: Vec::new(),
        }
    }

    /// Sets the parameter bag.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the iteration state.
    #[must_use]
    pub fn with_iteration(mut self, iteration: IterationState) -> Self {
        self.iteration = Some(iteration);
        self
    }

    /// Queues a pushed value for fan-out into child parameter bags.
    pub(crate) fn queue_child_update(&mut self, segments: Vec<String>, value: Value) {
        self.child_updates.push(ChildUpdate { segments, value });
    }

    /// Creates the parameter bag for a nested invocation.
    ///
    /// A shared fork starts from a copy of this bag, which already carries
    /// any `children` pushes. An isolated fork starts empty and receives the
    /// queued `children` pushes on creation. Iteration state never carries
    /// over.
    #[must_use]
    pub fn fork_for_child(&self, isolated: bool) -> Self {
        let mut child = Self {
            parameters: if isolated {
                json!({})
            } else {
                self.parameters.clone()
            },
            iteration: None,
            child_updates: Vec::new(),
        };
        if isolated {
            for update in &self.child_updates {
                push_at(&mut child.parameters, &update.segments, update.value.clone());
            }
        }
        child
    }

    /// Absorbs a finished child bag, used by shared-parameter sub-flows.
    pub fn absorb(&mut self, child: DelegatedParameters) {
        self.parameters = child.parameters;
    }
}

// Best-effort append used for fan-out; paths were validated at push time.
fn push_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut cursor = root;
    for segment in parents {
        let Some(map) = cursor.as_object_mut() else {
            return;
        };
        cursor = map.entry(segment.clone()).or_insert_with(|| json!({}));
    }

    let Some(map) = cursor.as_object_mut() else {
        return;
    };
    let target = map.entry(last.clone()).or_insert_with(|| json!([]));
    if let Some(items) = target.as_array_mut() {
        items.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let parameters = DelegatedParameters::new();
        assert_eq!(parameters.parameters, json!({}));
        assert!(parameters.iteration.is_none());
    }

    #[test]
    fn test_shared_fork_copies_bag_without_iteration() {
        let parent = DelegatedParameters::new()
            .with_parameters(json!({"env": "prod"}))
            .with_iteration(IterationState::new(3));

        let child = parent.fork_for_child(false);
        assert_eq!(child.parameters, json!({"env": "prod"}));
        assert!(child.iteration.is_none());
    }

    #[test]
    fn test_isolated_fork_receives_child_updates() {
        let mut parent = DelegatedParameters::new().with_parameters(json!({"hosts": ["a"]}));
        parent.queue_child_update(vec!["hosts".to_string()], json!("b"));

        let child = parent.fork_for_child(true);
        assert_eq!(child.parameters["hosts"], json!(["b"]));
        // The parent bag itself is untouched by the queued update.
        assert_eq!(parent.parameters["hosts"], json!(["a"]));
    }

    #[test]
    fn test_absorb_shared_bag() {
        let mut parent = DelegatedParameters::new().with_parameters(json!({"n": 1}));
        let mut child = parent.fork_for_child(false);
        child.parameters["n"] = json!(2);

        parent.absorb(child);
        assert_eq!(parent.parameters["n"], json!(2));
    }

    #[test]
    fn test_iteration_builder() {
        let it = IterationState::new(2)
            .with_value(json!("item"))
            .with_key("name");
        assert_eq!(it.index, 2);
        assert_eq!(it.value, Some(json!("item")));
        assert_eq!(it.key.as_deref(), Some("name"));
    }
}
