//! Path-addressed accessors over the named context roots.
//!
//! Path expressions take the form `$.segment(.segment)*` and resolve against
//! one of the three named roots (`ctx`, `secrets`, `parameters`).

use crate::context::{Context, ContextRoot, DelegatedParameters};
use crate::errors::{FlowError, MergeTypeMismatchError, PathSyntaxError};
use crate::merge::{merge_plain, value_kind, ROOT_PATH};
use crate::snapshot::ExecutionSnapshot;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // The pattern is a compile-time constant; a failure here is a bug.
        #[allow(clippy::expect_used)]
        Regex::new(r"^\$(\.[A-Za-z0-9_-]+)*$").expect("valid path pattern")
    })
}

/// Parses a `$.`-path expression into its segments.
///
/// The bare root `$` parses to an empty segment list.
///
/// # Errors
///
/// Returns [`PathSyntaxError`] if the expression does not match the grammar.
pub fn parse_path(expression: &str) -> Result<Vec<String>, PathSyntaxError> {
    if !path_pattern().is_match(expression) {
        return Err(PathSyntaxError::new(expression));
    }
    if expression == ROOT_PATH {
        return Ok(Vec::new());
    }
    Ok(expression[2..].split('.').map(String::from).collect())
}

/// Targets and flags for an `assignTo`/`pushTo` operation.
///
/// At least one of `ctx`, `secrets` or `parameters` must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignDirective {
    /// Path into the `ctx` root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<String>,
    /// Path into the `secrets` root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    /// Path into the per-invocation parameter bag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    /// Replace at the path instead of merging/appending.
    #[serde(default)]
    pub r#override: bool,
    /// On push, also fan the value out into pending child parameter bags.
    #[serde(default)]
    pub children: bool,
}

impl AssignDirective {
    /// Creates a directive targeting the `ctx` root.
    #[must_use]
    pub fn ctx(path: impl Into<String>) -> Self {
        Self {
            ctx: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the `secrets` target path.
    #[must_use]
    pub fn with_secrets(mut self, path: impl Into<String>) -> Self {
        self.secrets = Some(path.into());
        self
    }

    /// Sets the `parameters` target path.
    #[must_use]
    pub fn with_parameters(mut self, path: impl Into<String>) -> Self {
        self.parameters = Some(path.into());
        self
    }

    /// Requests replace-instead-of-merge behavior.
    #[must_use]
    pub fn with_override(mut self) -> Self {
        self.r#override = true;
        self
    }

    /// Requests child fan-out on push.
    #[must_use]
    pub fn with_children(mut self) -> Self {
        self.children = true;
        self
    }

    /// Checks that at least one target is present.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Document`] when no target root is named.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.ctx.is_none() && self.secrets.is_none() && self.parameters.is_none() {
            return Err(FlowError::document(
                "assign/push directive requires at least one of ctx, secrets or parameters",
            ));
        }
        Ok(())
    }
}

/// Assigns a value at the directive's paths, creating intermediate mappings.
///
/// Without `override` the value is deep-merged at the path; with it the value
/// replaces whatever was there. The snapshot's context capture is refreshed
/// after the mutation.
///
/// # Errors
///
/// Fails with [`PathSyntaxError`] on a malformed expression, and with
/// [`MergeTypeMismatchError`] when the value cannot land at the path (a bare
/// root assigned a scalar included).
pub fn assign_to(
    context: &Context,
    parameters: &mut DelegatedParameters,
    snapshot: &mut ExecutionSnapshot,
    directive: &AssignDirective,
    value: &Value,
) -> Result<(), FlowError> {
    directive.validate()?;

    if let Some(expression) = &directive.ctx {
        let segments = parse_path(expression)?;
        context.with_root_mut(ContextRoot::Ctx, |root| {
            assign_at(root, &segments, value, directive.r#override)
        })?;
    }
    if let Some(expression) = &directive.secrets {
        let segments = parse_path(expression)?;
        context.with_root_mut(ContextRoot::Secrets, |root| {
            assign_at(root, &segments, value, directive.r#override)
        })?;
    }
    if let Some(expression) = &directive.parameters {
        let segments = parse_path(expression)?;
        assign_at(&mut parameters.parameters, &segments, value, directive.r#override)?;
    }

    snapshot.set_context_state(context.trace_state());
    Ok(())
}

/// Appends a value to the sequence at the directive's paths, creating it if
/// absent.
///
/// `override` replaces the sequence with one containing only the pushed
/// value. `children` additionally queues the value for fan-out into child
/// parameter bags.
///
/// # Errors
///
/// Fails with [`PathSyntaxError`] on a malformed expression, and with
/// [`MergeTypeMismatchError`] when a non-sequence value occupies the path.
pub fn push_to(
    context: &Context,
    parameters: &mut DelegatedParameters,
    snapshot: &mut ExecutionSnapshot,
    directive: &AssignDirective,
    value: &Value,
) -> Result<(), FlowError> {
    directive.validate()?;

    if let Some(expression) = &directive.ctx {
        let segments = parse_path(expression)?;
        context.with_root_mut(ContextRoot::Ctx, |root| {
            push_at(root, expression, &segments, value, directive.r#override)
        })?;
    }
    if let Some(expression) = &directive.secrets {
        let segments = parse_path(expression)?;
        context.with_root_mut(ContextRoot::Secrets, |root| {
            push_at(root, expression, &segments, value, directive.r#override)
        })?;
    }
    if let Some(expression) = &directive.parameters {
        let segments = parse_path(expression)?;
        push_at(
            &mut parameters.parameters,
            expression,
            &segments,
            value,
            directive.r#override,
        )?;
        if directive.children {
            parameters.queue_child_update(segments, value.clone());
        }
    }

    snapshot.set_context_state(context.trace_state());
    Ok(())
}

fn assign_at(
    root: &mut Value,
    segments: &[String],
    value: &Value,
    replace: bool,
) -> Result<(), FlowError> {
    let Some((last, parents)) = segments.split_last() else {
        // Bare root: it must remain addressable, so only mappings may land.
        if !value.is_object() {
            return Err(MergeTypeMismatchError::new(
                ROOT_PATH,
                value_kind(root),
                value_kind(value),
            )
            .into());
        }
        if replace {
            *root = value.clone();
        } else {
            *root = merge_plain(root, value)?;
        }
        return Ok(());
    };

    let target = descend(root, parents)?;
    let Some(map) = target.as_object_mut() else {
        return Err(MergeTypeMismatchError::new(
            path_of(parents),
            value_kind(target),
            "mapping",
        )
        .into());
    };

    match map.get(last) {
        Some(existing) if !replace => {
            let merged = merge_plain(existing, value)?;
            map.insert(last.clone(), merged);
        }
        _ => {
            map.insert(last.clone(), value.clone());
        }
    }
    Ok(())
}

fn push_at(
    root: &mut Value,
    expression: &str,
    segments: &[String],
    value: &Value,
    replace: bool,
) -> Result<(), FlowError> {
    let Some((last, parents)) = segments.split_last() else {
        // The root is a mapping; a sequence can never live there.
        return Err(PathSyntaxError::new(expression).into());
    };

    let target = descend(root, parents)?;
    let Some(map) = target.as_object_mut() else {
        return Err(MergeTypeMismatchError::new(
            path_of(parents),
            value_kind(target),
            "mapping",
        )
        .into());
    };

    let slot = map.entry(last.clone()).or_insert_with(|| json!([]));
    if replace {
        *slot = json!([value.clone()]);
        return Ok(());
    }
    let Some(items) = slot.as_array_mut() else {
        return Err(MergeTypeMismatchError::new(
            path_of(segments),
            value_kind(slot),
            "sequence",
        )
        .into());
    };
    items.push(value.clone());
    Ok(())
}

/// Walks intermediate segments, creating mappings as needed.
fn descend<'a>(root: &'a mut Value, parents: &[String]) -> Result<&'a mut Value, FlowError> {
    let mut cursor = root;
    for (depth, segment) in parents.iter().enumerate() {
        let kind = value_kind(cursor);
        let Some(map) = cursor.as_object_mut() else {
            return Err(MergeTypeMismatchError::new(
                path_of(&parents[..depth]),
                kind,
                "mapping",
            )
            .into());
        };
        cursor = map.entry(segment.clone()).or_insert_with(|| json!({}));
    }
    Ok(cursor)
}

fn path_of(segments: &[String]) -> String {
    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("{ROOT_PATH}.{}", segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fixture() -> (Context, DelegatedParameters, ExecutionSnapshot) {
        (
            Context::new(),
            DelegatedParameters::new(),
            ExecutionSnapshot::new("test", "/tmp", 0),
        )
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path("$").unwrap(), Vec::<String>::new());
        assert_eq!(parse_path("$.a").unwrap(), vec!["a"]);
        assert_eq!(parse_path("$.a.b-c.d_e").unwrap(), vec!["a", "b-c", "d_e"]);
    }

    #[test]
    fn test_parse_path_rejects_bad_grammar() {
        for bad in ["", "a.b", "$.", "$..a", "$.a.", "ctx.$.a", "$.a b"] {
            assert!(parse_path(bad).is_err(), "expected rejection of {bad:?}");
        }
    }

    #[test]
    fn test_assign_to_all_three_roots() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$.ctx_test")
            .with_secrets("$.secrets_test")
            .with_parameters("$.parameters_test");

        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &directive,
            &json!("test"),
        )
        .unwrap();

        assert_eq!(context.ctx()["ctx_test"], json!("test"));
        assert_eq!(context.secrets()["secrets_test"], json!("test"));
        assert_eq!(parameters.parameters["parameters_test"], json!("test"));
        assert!(snapshot.context_state().is_some());
    }

    #[test]
    fn test_assign_creates_intermediate_mappings() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$.a.b.c");

        assign_to(&context, &mut parameters, &mut snapshot, &directive, &json!(7)).unwrap();
        assert_eq!(context.ctx(), json!({"a": {"b": {"c": 7}}}));
    }

    #[test]
    fn test_assign_merges_unless_override() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$.cfg");

        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &directive,
            &json!({"a": 1}),
        )
        .unwrap();
        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &directive,
            &json!({"b": 2}),
        )
        .unwrap();
        assert_eq!(context.ctx()["cfg"], json!({"a": 1, "b": 2}));

        let replacing = AssignDirective::ctx("$.cfg").with_override();
        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &replacing,
            &json!({"only": true}),
        )
        .unwrap();
        assert_eq!(context.ctx()["cfg"], json!({"only": true}));
    }

    #[test]
    fn test_assign_rejects_scalar_at_root() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$");

        let err = assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &directive,
            &json!("scalar"),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::MergeTypeMismatch(_)));
    }

    #[test]
    fn test_assign_mapping_at_root_merges() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$");

        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &directive,
            &json!({"a": 1}),
        )
        .unwrap();
        assert_eq!(context.ctx(), json!({"a": 1}));
    }

    #[test]
    fn test_push_creates_and_appends() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$.hosts");

        push_to(&context, &mut parameters, &mut snapshot, &directive, &json!("a")).unwrap();
        push_to(&context, &mut parameters, &mut snapshot, &directive, &json!("b")).unwrap();
        assert_eq!(context.ctx()["hosts"], json!(["a", "b"]));
    }

    #[test]
    fn test_push_override_replaces_sequence() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::ctx("$.hosts");
        push_to(&context, &mut parameters, &mut snapshot, &directive, &json!("a")).unwrap();

        let replacing = AssignDirective::ctx("$.hosts").with_override();
        push_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &replacing,
            &json!("z"),
        )
        .unwrap();
        assert_eq!(context.ctx()["hosts"], json!(["z"]));
    }

    #[test]
    fn test_push_rejects_non_sequence_target() {
        let (context, mut parameters, mut snapshot) = fixture();
        assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &AssignDirective::ctx("$.value"),
            &json!(42),
        )
        .unwrap();

        let err = push_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &AssignDirective::ctx("$.value"),
            &json!("x"),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::MergeTypeMismatch(_)));
    }

    #[test]
    fn test_push_children_queues_fan_out() {
        let (context, mut parameters, mut snapshot) = fixture();
        let directive = AssignDirective::default()
            .with_parameters("$.queue")
            .with_children();

        push_to(&context, &mut parameters, &mut snapshot, &directive, &json!(1)).unwrap();

        assert_eq!(parameters.parameters["queue"], json!([1]));
        let child = parameters.fork_for_child(true);
        assert_eq!(child.parameters["queue"], json!([1]));
    }

    #[test]
    fn test_directive_requires_a_target() {
        let (context, mut parameters, mut snapshot) = fixture();
        let err = assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &AssignDirective::default(),
            &json!(1),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::Document(_)));
    }

    #[test]
    fn test_bad_path_surfaces_syntax_error() {
        let (context, mut parameters, mut snapshot) = fixture();
        let err = assign_to(
            &context,
            &mut parameters,
            &mut snapshot,
            &AssignDirective::ctx("ctx.oops"),
            &json!(1),
        )
        .unwrap_err();
        assert!(matches!(err, FlowError::PathSyntax(_)));
    }
}
