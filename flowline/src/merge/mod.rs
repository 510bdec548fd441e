//! Structural deep-merge engine.
//!
//! Combines two JSON-shaped values recursively:
//!
//! - mapping x mapping: key-wise union, recursing into shared keys
//! - sequence x sequence: base elements first, then overlay elements
//! - scalar x scalar: overlay wins
//!
//! A [`MergeModifiers`] table can override the default behavior for a
//! specific path (including the root `$`), in which case the modifier's
//! return value is used verbatim for that subtree.

use crate::errors::MergeTypeMismatchError;
use serde_json::Value;
use std::collections::HashMap;

/// Signature of a path-scoped merge override.
///
/// Receives `(base, overlay)` for the subtree at the registered path and
/// returns the merged value. No default recursion happens below it.
pub type MergeModifierFn = dyn Fn(&Value, &Value) -> Value + Send + Sync;

/// Root path marker used by merge and accessor path expressions.
pub const ROOT_PATH: &str = "$";

/// Table of path-scoped merge overrides.
///
/// Paths use the root marker `$` plus dotted segments matching the structure
/// being merged, e.g. `$.config.volumes`.
#[derive(Default)]
pub struct MergeModifiers {
    by_path: HashMap<String, Box<MergeModifierFn>>,
}

impl MergeModifiers {
    /// Creates an empty modifier table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a modifier at the given path, replacing any existing one.
    pub fn insert<F>(&mut self, path: impl Into<String>, modifier: F)
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.by_path.insert(path.into(), Box::new(modifier));
    }

    /// Builder-style variant of [`MergeModifiers::insert`].
    #[must_use]
    pub fn with<F>(mut self, path: impl Into<String>, modifier: F) -> Self
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.insert(path, modifier);
        self
    }

    /// Looks up the modifier registered at a path, if any.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&MergeModifierFn> {
        self.by_path.get(path).map(AsRef::as_ref)
    }

    /// Returns true if no modifiers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl std::fmt::Debug for MergeModifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths: Vec<&String> = self.by_path.keys().collect();
        paths.sort();
        f.debug_struct("MergeModifiers")
            .field("paths", &paths)
            .finish()
    }
}

/// Returns a human-readable kind name for a value, used in error messages.
#[must_use]
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Deep-merges `overlay` into `base`, producing a new value.
///
/// An absent (`null`) operand degrades to returning the other unchanged.
/// Container-shape mismatches fail with an error naming the offending path,
/// unless a modifier is registered at that exact path.
///
/// # Errors
///
/// Returns [`MergeTypeMismatchError`] when incompatible container shapes meet
/// at a path with no registered modifier.
pub fn merge(
    base: &Value,
    overlay: &Value,
    modifiers: &MergeModifiers,
) -> Result<Value, MergeTypeMismatchError> {
    merge_at(ROOT_PATH, base, overlay, modifiers)
}

/// Deep-merges with no modifiers registered.
///
/// # Errors
///
/// Returns [`MergeTypeMismatchError`] on container-shape mismatch.
pub fn merge_plain(base: &Value, overlay: &Value) -> Result<Value, MergeTypeMismatchError> {
    merge(base, overlay, &MergeModifiers::new())
}

fn merge_at(
    path: &str,
    base: &Value,
    overlay: &Value,
    modifiers: &MergeModifiers,
) -> Result<Value, MergeTypeMismatchError> {
    // A modifier short-circuits the subtree, incompatible shapes included.
    if let Some(modifier) = modifiers.get(path) {
        return Ok(modifier(base, overlay));
    }

    match (base, overlay) {
        (Value::Null, other) | (other, Value::Null) => Ok(other.clone()),
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let child_path = format!("{path}.{key}");
                match base_map.get(key) {
                    Some(base_value) => {
                        let value = merge_at(&child_path, base_value, overlay_value, modifiers)?;
                        merged.insert(key.clone(), value);
                    }
                    None => {
                        merged.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
            Ok(Value::Object(merged))
        }
        (Value::Array(base_items), Value::Array(overlay_items)) => {
            let mut merged = base_items.clone();
            merged.extend(overlay_items.iter().cloned());
            Ok(Value::Array(merged))
        }
        (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => Err(
            MergeTypeMismatchError::new(path, value_kind(base), value_kind(overlay)),
        ),
        // Scalar collision, overlay wins even across scalar types.
        (_, _) => Ok(overlay.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_mapping_union_recursive() {
        let base = json!({"a": {"x": 1}, "keep": true});
        let overlay = json!({"a": {"y": 2}, "added": "v"});

        let merged = merge_plain(&base, &overlay).unwrap();
        assert_eq!(
            merged,
            json!({"a": {"x": 1, "y": 2}, "keep": true, "added": "v"})
        );
    }

    #[test]
    fn test_sequence_concatenation() {
        let base = json!({"list": [1, 2]});
        let overlay = json!({"list": [3]});

        let merged = merge_plain(&base, &overlay).unwrap();
        assert_eq!(merged, json!({"list": [1, 2, 3]}));
    }

    #[test]
    fn test_scalar_collision_overlay_wins() {
        let base = json!({"n": 1, "s": "old"});
        let overlay = json!({"n": 2, "s": true});

        let merged = merge_plain(&base, &overlay).unwrap();
        assert_eq!(merged, json!({"n": 2, "s": true}));
    }

    #[test]
    fn test_absent_side_degrades() {
        let value = json!({"a": 1});
        assert_eq!(merge_plain(&Value::Null, &value).unwrap(), value);
        assert_eq!(merge_plain(&value, &Value::Null).unwrap(), value);
    }

    #[test]
    fn test_container_mismatch_names_path() {
        let base = json!({"a": {"b": true}});
        let overlay = json!({"a": true});

        let err = merge_plain(&base, &overlay).unwrap_err();
        assert_eq!(err.path, "$.a");
        assert_eq!(err.base_kind, "mapping");
        assert_eq!(err.overlay_kind, "boolean");
    }

    #[test]
    fn test_sequence_vs_mapping_mismatch() {
        let base = json!({"a": [1]});
        let overlay = json!({"a": {"b": 1}});

        let err = merge_plain(&base, &overlay).unwrap_err();
        assert_eq!(err.path, "$.a");
    }

    #[test]
    fn test_root_modifier_short_circuits() {
        let modifiers = MergeModifiers::new().with(ROOT_PATH, |base, overlay| {
            let a = base["a"].as_i64().unwrap_or(0);
            let b = overlay["a"].as_i64().unwrap_or(0);
            json!({"a": a * 1000 + b})
        });

        let merged = merge(&json!({"a": 11}), &json!({"a": 111}), &modifiers).unwrap();
        assert_eq!(merged, json!({"a": 11111}));
    }

    #[test]
    fn test_path_modifier_overrides_subtree() {
        let modifiers = MergeModifiers::new().with("$.list", |base, overlay| {
            // Replace instead of concatenating.
            if overlay.as_array().is_some_and(|a| !a.is_empty()) {
                overlay.clone()
            } else {
                base.clone()
            }
        });

        let merged = merge(
            &json!({"list": [1, 2], "other": 1}),
            &json!({"list": [9], "other": 2}),
            &modifiers,
        )
        .unwrap();
        assert_eq!(merged, json!({"list": [9], "other": 2}));
    }

    #[test]
    fn test_modifier_allows_incompatible_shapes() {
        let modifiers =
            MergeModifiers::new().with("$.a", |_base, overlay| json!({"wrapped": overlay.clone()}));

        let merged = merge(&json!({"a": {"b": true}}), &json!({"a": true}), &modifiers).unwrap();
        assert_eq!(merged, json!({"a": {"wrapped": true}}));
    }

    #[test]
    fn test_deep_mismatch_path() {
        let base = json!({"a": {"b": {"c": [1]}}});
        let overlay = json!({"a": {"b": {"c": "scalar"}}});

        let err = merge_plain(&base, &overlay).unwrap_err();
        assert_eq!(err.path, "$.a.b.c");
    }
}
