//! Plugin packaging and installation.
//!
//! A plugin bundles action handlers and reporters under a name and a semver
//! version, and may require a host version range and other plugins.
//! Installation resolves the dependency graph first, then registers each
//! plugin's contributions in dependency order.

mod resolver;

pub use resolver::PluginDependencyResolver;

use crate::errors::{DependencyError, FlowError};
use crate::flow::FlowRequirements;
use crate::handlers::{ActionHandler, ActionHandlerRegistry};
use crate::reporting::{Reporter, ReporterSet};
use semver::{Version, VersionReq};
use std::collections::HashMap;
use std::sync::Arc;

/// Version ranges a plugin demands from its surroundings.
#[derive(Debug, Clone, Default)]
pub struct PluginRequirements {
    /// Required host engine version range.
    pub host_version: Option<VersionReq>,
    /// Required plugins with their version ranges.
    pub plugins: HashMap<String, VersionReq>,
}

/// A named, versioned bundle of handlers and reporters.
pub struct Plugin {
    name: String,
    version: Version,
    requirements: PluginRequirements,
    handlers: Vec<Arc<dyn ActionHandler>>,
    reporters: Vec<Arc<dyn Reporter>>,
}

impl Plugin {
    /// Creates an empty plugin.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            requirements: PluginRequirements::default(),
            handlers: Vec::new(),
            reporters: Vec::new(),
        }
    }

    /// Adds an action handler contribution.
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Adds a reporter contribution.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    /// Declares a required host version range.
    #[must_use]
    pub fn requires_host(mut self, range: VersionReq) -> Self {
        self.requirements.host_version = Some(range);
        self
    }

    /// Declares a dependency on another plugin.
    #[must_use]
    pub fn requires_plugin(mut self, name: impl Into<String>, range: VersionReq) -> Self {
        self.requirements.plugins.insert(name.into(), range);
        self
    }

    /// The plugin name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The plugin version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// The declared requirements.
    #[must_use]
    pub fn requirements(&self) -> &PluginRequirements {
        &self.requirements
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version.to_string())
            .field("handlers", &self.handlers.len())
            .field("reporters", &self.reporters.len())
            .finish()
    }
}

/// Resolves the plugin graph and registers every contribution.
///
/// Plugins register in dependency order, dependencies first, so a dependent
/// plugin can rely on its dependencies' handlers being present.
///
/// Returns the plugin names in registration order.
///
/// # Errors
///
/// Fails with [`DependencyError`] on an unresolvable graph, and with
/// [`FlowError::HandlerConflict`] when a contributed handler key collides.
pub fn register_plugins(
    plugins: &[Plugin],
    host: &Version,
    registry: &ActionHandlerRegistry,
    reporters: &ReporterSet,
) -> Result<Vec<String>, FlowError> {
    let resolver = PluginDependencyResolver::new(host.clone());
    let ordered = resolver.resolve(plugins)?;

    let mut registered = Vec::with_capacity(ordered.len());
    for plugin in ordered {
        tracing::info!(plugin = %plugin.name(), version = %plugin.version(), "registering plugin");
        for handler in &plugin.handlers {
            registry.register(Arc::clone(handler))?;
        }
        for reporter in &plugin.reporters {
            reporters.register(Arc::clone(reporter));
        }
        registered.push(plugin.name().to_string());
    }
    Ok(registered)
}

/// Checks a document's `requires` block against the host.
///
/// `installed` maps installed plugin names to their versions. Applications
/// are resolved on the host `PATH`.
///
/// # Errors
///
/// Returns the first [`DependencyError`] encountered.
pub fn verify_flow_requirements(
    requires: &FlowRequirements,
    host: &Version,
    installed: &HashMap<String, Version>,
) -> Result<(), DependencyError> {
    if let Some(range) = &requires.host_version {
        if !range.matches(host) {
            return Err(DependencyError::host_incompatible(
                "flow",
                range.to_string(),
                host.to_string(),
            ));
        }
    }

    let mut names: Vec<&String> = requires.plugins.keys().collect();
    names.sort();
    for name in names {
        let range = &requires.plugins[name];
        match installed.get(name) {
            Some(version) if range.matches(version) => {}
            _ => {
                return Err(DependencyError::unmet(
                    "flow",
                    name.clone(),
                    range.to_string(),
                ))
            }
        }
    }

    for application in &requires.applications {
        if which::which(application).is_err() {
            return Err(DependencyError::missing_application(application.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ActionMetadata, FnActionHandler};

    fn handler(id: &str) -> Arc<dyn ActionHandler> {
        Arc::new(FnActionHandler::new(ActionMetadata::new(id), |_| Ok(())))
    }

    fn req(range: &str) -> VersionReq {
        VersionReq::parse(range).unwrap()
    }

    #[test]
    fn test_register_plugins_in_dependency_order() {
        let plugins = vec![
            Plugin::new("consumer", Version::new(1, 0, 0))
                .requires_plugin("base", req("^2"))
                .with_handler(handler("consume")),
            Plugin::new("base", Version::new(2, 1, 0)).with_handler(handler("base-op")),
        ];

        let registry = ActionHandlerRegistry::new();
        let reporters = ReporterSet::new();
        let order =
            register_plugins(&plugins, &Version::new(0, 9, 0), &registry, &reporters).unwrap();

        assert_eq!(order, vec!["base", "consumer"]);
        assert!(registry.find("base-op").is_ok());
        assert!(registry.find("consume").is_ok());
    }

    #[test]
    fn test_register_plugins_surfaces_handler_conflict() {
        let plugins = vec![
            Plugin::new("one", Version::new(1, 0, 0)).with_handler(handler("dup")),
            Plugin::new("two", Version::new(1, 0, 0)).with_handler(handler("dup")),
        ];

        let registry = ActionHandlerRegistry::new();
        let reporters = ReporterSet::new();
        let err = register_plugins(&plugins, &Version::new(1, 0, 0), &registry, &reporters)
            .unwrap_err();
        assert!(matches!(err, FlowError::HandlerConflict(_)));
    }

    #[test]
    fn test_verify_requirements_host_range() {
        let requires = FlowRequirements {
            host_version: Some(req(">=2.0")),
            ..FlowRequirements::default()
        };

        assert!(
            verify_flow_requirements(&requires, &Version::new(2, 3, 0), &HashMap::new()).is_ok()
        );
        let err = verify_flow_requirements(&requires, &Version::new(1, 9, 0), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, DependencyError::HostIncompatible { .. }));
    }

    #[test]
    fn test_verify_requirements_plugin_versions() {
        let mut requires = FlowRequirements::default();
        requires.plugins.insert("aws".into(), req("^1.2"));

        let mut installed = HashMap::new();
        installed.insert("aws".to_string(), Version::new(1, 5, 0));
        assert!(verify_flow_requirements(&requires, &Version::new(1, 0, 0), &installed).is_ok());

        installed.insert("aws".to_string(), Version::new(2, 0, 0));
        let err = verify_flow_requirements(&requires, &Version::new(1, 0, 0), &installed)
            .unwrap_err();
        assert!(matches!(err, DependencyError::Unmet { .. }));
    }

    #[test]
    fn test_verify_requirements_applications() {
        let present = FlowRequirements {
            applications: vec!["sh".into()],
            ..FlowRequirements::default()
        };
        assert!(
            verify_flow_requirements(&present, &Version::new(1, 0, 0), &HashMap::new()).is_ok()
        );

        let absent = FlowRequirements {
            applications: vec!["no-such-binary-flowline".into()],
            ..FlowRequirements::default()
        };
        let err = verify_flow_requirements(&absent, &Version::new(1, 0, 0), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, DependencyError::MissingApplication { .. }));
    }
}
