//! The declarative pipeline document.

use crate::errors::FlowError;
use semver::VersionReq;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Prefix marking a step key as orchestrator metadata rather than the action
/// kind.
pub const METADATA_PREFIX: &str = "$";

/// One step of a pipeline.
///
/// A step is a mapping with exactly one non-metadata key naming the action
/// kind; its value is the option payload. Keys starting with `$` carry
/// orchestrator metadata (`$wd`, annotations) and never reach the handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionStep(Map<String, Value>);

impl ActionStep {
    /// Creates a step from an action kind and its options.
    #[must_use]
    pub fn new(id: impl Into<String>, options: Value) -> Self {
        let mut map = Map::new();
        map.insert(id.into(), options);
        Self(map)
    }

    /// Builds a step from a raw value, checking its shape.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Document`] unless the value is a mapping with
    /// exactly one non-metadata key.
    pub fn from_value(value: Value) -> Result<Self, FlowError> {
        let Value::Object(map) = value else {
            return Err(FlowError::document("an action step must be a mapping"));
        };
        let step = Self(map);
        step.validate()?;
        Ok(step)
    }

    /// Checks that exactly one non-metadata key is present.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Document`] describing the malformed step.
    pub fn validate(&self) -> Result<(), FlowError> {
        let action_keys: Vec<&String> = self
            .0
            .keys()
            .filter(|key| !key.starts_with(METADATA_PREFIX))
            .collect();
        match action_keys.as_slice() {
            [_] => Ok(()),
            [] => Err(FlowError::document("an action step names no action")),
            keys => Err(FlowError::document(format!(
                "an action step must name exactly one action, found {}",
                keys.iter()
                    .map(|key| format!("'{key}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Returns the action kind this step invokes.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Document`] on a malformed step.
    pub fn id(&self) -> Result<&str, FlowError> {
        self.validate()?;
        self.0
            .keys()
            .find(|key| !key.starts_with(METADATA_PREFIX))
            .map(String::as_str)
            .ok_or_else(|| FlowError::document("an action step names no action"))
    }

    /// Returns the option payload for the action kind.
    #[must_use]
    pub fn options(&self) -> Value {
        self.0
            .iter()
            .find(|(key, _)| !key.starts_with(METADATA_PREFIX))
            .map_or(Value::Null, |(_, value)| value.clone())
    }

    /// Returns a metadata entry by its unprefixed name.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&Value> {
        self.0.get(&format!("{METADATA_PREFIX}{name}"))
    }
}

/// Host and plugin requirements declared by a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowRequirements {
    /// Required host engine version range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_version: Option<VersionReq>,
    /// Required plugins with their version ranges.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub plugins: HashMap<String, VersionReq>,
    /// Executables that must be resolvable on the host `PATH`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<String>,
}

/// A parsed pipeline document.
///
/// The `pipeline` node is exactly one action step; multi-step flows use the
/// `sequence` action kind as their root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    /// Document format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Human description of the flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Host, plugin and application requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<FlowRequirements>,
    /// The root action step.
    pub pipeline: ActionStep,
}

impl FlowDocument {
    /// Creates a document from a root step.
    #[must_use]
    pub fn new(pipeline: ActionStep) -> Self {
        Self {
            version: None,
            description: None,
            requires: None,
            pipeline,
        }
    }

    /// Parses a document from YAML and validates the root step.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Document`] on malformed YAML or a malformed step.
    pub fn from_yaml(source: &str) -> Result<Self, FlowError> {
        let document: Self = serde_yaml::from_str(source)
            .map_err(|err| FlowError::document(err.to_string()))?;
        document.pipeline.validate()?;
        Ok(document)
    }
}
