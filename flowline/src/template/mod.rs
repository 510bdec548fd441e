//! Template rendering of option payloads.
//!
//! Two delimiter profiles coexist in one document. Every options payload is
//! rendered in two passes against the live bindings: the *global* profile
//! first, then the *local* profile. The delimiters are disjoint, so a global
//! expression may expand into local markers that the second pass resolves,
//! and a nested construct can hold back its body for a later invocation.

use crate::context::{Context, DelegatedParameters};
use crate::errors::FlowError;
use minijinja::syntax::SyntaxConfig;
use minijinja::Environment;
use serde_json::{Map, Value};

/// One set of expression, block and comment delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterProfile {
    /// Variable-expression delimiters.
    pub variable: (String, String),
    /// Block-statement delimiters.
    pub block: (String, String),
    /// Comment delimiters.
    pub comment: (String, String),
}

impl DelimiterProfile {
    /// The profile resolved in the first pass over an options payload.
    #[must_use]
    pub fn global() -> Self {
        Self {
            variable: ("<%".into(), "%>".into()),
            block: ("<&".into(), "&>".into()),
            comment: ("<#".into(), "#>".into()),
        }
    }

    /// The profile resolved in the second pass over an options payload.
    #[must_use]
    pub fn local() -> Self {
        Self {
            variable: ("<$".into(), "$>".into()),
            block: ("<@".into(), "@>".into()),
            comment: ("<~".into(), "~>".into()),
        }
    }

    /// Returns whether the string contains anything this profile would touch.
    #[must_use]
    pub fn mentions(&self, text: &str) -> bool {
        text.contains(&self.variable.0)
            || text.contains(&self.block.0)
            || text.contains(&self.comment.0)
    }

    /// Returns whether the string is exactly one variable expression.
    ///
    /// Such templates render to a typed value rather than a string.
    #[must_use]
    pub fn is_single_expression(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.starts_with(&self.variable.0)
            && trimmed.ends_with(&self.variable.1)
            && trimmed.matches(&self.variable.0).count() == 1
            && !trimmed.contains(&self.block.0)
    }

    fn syntax(&self) -> Result<SyntaxConfig, FlowError> {
        SyntaxConfig::builder()
            .variable_delimiters(self.variable.0.clone(), self.variable.1.clone())
            .block_delimiters(self.block.0.clone(), self.block.1.clone())
            .comment_delimiters(self.comment.0.clone(), self.comment.1.clone())
            .build()
            .map_err(|err| FlowError::template(err.to_string()))
    }
}

/// The global/local delimiter pair a run operates with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimiterConfig {
    /// First-pass profile.
    pub global: DelimiterProfile,
    /// Second-pass profile.
    pub local: DelimiterProfile,
}

impl Default for DelimiterConfig {
    fn default() -> Self {
        Self {
            global: DelimiterProfile::global(),
            local: DelimiterProfile::local(),
        }
    }
}

/// String-template rendering backend.
pub trait TemplateRenderer: Send + Sync {
    /// Renders a template string against the bindings.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Template`] on a syntax or evaluation failure.
    fn render_str(
        &self,
        template: &str,
        profile: &DelimiterProfile,
        bindings: &Value,
    ) -> Result<String, FlowError>;
}

/// The default renderer, backed by `minijinja`.
#[derive(Debug, Default)]
pub struct MiniJinjaRenderer;

impl MiniJinjaRenderer {
    /// Creates a renderer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render_str(
        &self,
        template: &str,
        profile: &DelimiterProfile,
        bindings: &Value,
    ) -> Result<String, FlowError> {
        let mut env = Environment::new();
        env.set_syntax(profile.syntax()?);
        env.render_str(template, minijinja::Value::from_serialize(bindings))
            .map_err(|err| FlowError::template(err.to_string()))
    }
}

/// Renders every string in a value tree, mapping keys included.
///
/// A string that is exactly one variable expression is re-read as YAML after
/// rendering, so numbers, booleans and structures survive the round trip.
/// Strings without any of the profile's delimiters pass through untouched.
///
/// # Errors
///
/// Returns [`FlowError::Template`] on the first failing template.
pub fn render_tree(
    renderer: &dyn TemplateRenderer,
    profile: &DelimiterProfile,
    bindings: &Value,
    value: &Value,
) -> Result<Value, FlowError> {
    match value {
        Value::String(text) => render_scalar(renderer, profile, bindings, text),
        Value::Array(items) => {
            let rendered = items
                .iter()
                .map(|item| render_tree(renderer, profile, bindings, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(rendered))
        }
        Value::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (key, item) in map {
                let key = if profile.mentions(key) {
                    renderer.render_str(key, profile, bindings)?
                } else {
                    key.clone()
                };
                rendered.insert(key, render_tree(renderer, profile, bindings, item)?);
            }
            Ok(Value::Object(rendered))
        }
        _ => Ok(value.clone()),
    }
}

fn render_scalar(
    renderer: &dyn TemplateRenderer,
    profile: &DelimiterProfile,
    bindings: &Value,
    text: &str,
) -> Result<Value, FlowError> {
    if !profile.mentions(text) {
        return Ok(Value::String(text.to_string()));
    }
    let single = profile.is_single_expression(text);
    let rendered = renderer.render_str(text, profile, bindings)?;
    if single {
        if let Ok(typed) = serde_yaml::from_str::<Value>(&rendered) {
            return Ok(typed);
        }
    }
    Ok(Value::String(rendered))
}

/// Renders an options payload in both passes against the live bindings:
/// global profile first, then local.
///
/// # Errors
///
/// Returns [`FlowError::Template`] on the first failing template.
pub fn render_options(
    renderer: &dyn TemplateRenderer,
    context: &Context,
    parameters: &DelegatedParameters,
    value: &Value,
) -> Result<Value, FlowError> {
    let bindings = context.to_bindings(parameters);
    let delimiters = context.delimiters();
    let first = render_tree(renderer, &delimiters.global, &bindings, value)?;
    render_tree(renderer, &delimiters.local, &bindings, &first)
}
