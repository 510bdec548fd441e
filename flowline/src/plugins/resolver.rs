//! Plugin dependency graph resolution.

use super::Plugin;
use crate::errors::DependencyError;
use semver::Version;
use std::collections::{HashMap, HashSet};

/// Resolves which plugins can be installed, and in what order.
#[derive(Debug, Clone)]
pub struct PluginDependencyResolver {
    host: Version,
}

impl PluginDependencyResolver {
    /// Creates a resolver for the given host engine version.
    #[must_use]
    pub fn new(host: Version) -> Self {
        Self { host }
    }

    /// Checks every plugin against the host and the set, and returns the
    /// plugins ordered with dependencies before their dependents.
    ///
    /// # Errors
    ///
    /// Fails fast with [`DependencyError::HostIncompatible`] on a host range
    /// miss, [`DependencyError::Unmet`] when a required plugin is absent or
    /// out of range, and [`DependencyError::Cycle`] naming the members of a
    /// circular dependency.
    pub fn resolve<'a>(&self, plugins: &'a [Plugin]) -> Result<Vec<&'a Plugin>, DependencyError> {
        for plugin in plugins {
            if let Some(range) = &plugin.requirements().host_version {
                if !range.matches(&self.host) {
                    return Err(DependencyError::host_incompatible(
                        plugin.name(),
                        range.to_string(),
                        self.host.to_string(),
                    ));
                }
            }
        }

        let by_name: HashMap<&str, &Plugin> = plugins
            .iter()
            .map(|plugin| (plugin.name(), plugin))
            .collect();

        for plugin in plugins {
            let mut required: Vec<&String> = plugin.requirements().plugins.keys().collect();
            required.sort();
            for name in required {
                let range = &plugin.requirements().plugins[name];
                match by_name.get(name.as_str()) {
                    Some(dependency) if range.matches(dependency.version()) => {}
                    _ => {
                        return Err(DependencyError::unmet(
                            plugin.name(),
                            name.clone(),
                            range.to_string(),
                        ))
                    }
                }
            }
        }

        let mut visited = HashSet::new();
        let mut in_stack = HashSet::new();
        let mut path = Vec::new();
        let mut order = Vec::new();
        for plugin in plugins {
            visit(
                plugin,
                &by_name,
                &mut visited,
                &mut in_stack,
                &mut path,
                &mut order,
            )?;
        }
        Ok(order)
    }
}

fn visit<'a>(
    plugin: &'a Plugin,
    by_name: &HashMap<&str, &'a Plugin>,
    visited: &mut HashSet<String>,
    in_stack: &mut HashSet<String>,
    path: &mut Vec<String>,
    order: &mut Vec<&'a Plugin>,
) -> Result<(), DependencyError> {
    let name = plugin.name();
    if in_stack.contains(name) {
        let start = path.iter().position(|member| member == name).unwrap_or(0);
        let mut members: Vec<String> = path[start..].to_vec();
        members.push(name.to_string());
        return Err(DependencyError::cycle(members));
    }
    if visited.contains(name) {
        return Ok(());
    }

    visited.insert(name.to_string());
    in_stack.insert(name.to_string());
    path.push(name.to_string());

    let mut required: Vec<&String> = plugin.requirements().plugins.keys().collect();
    required.sort();
    for dependency in required {
        if let Some(&dependency) = by_name.get(dependency.as_str()) {
            visit(dependency, by_name, visited, in_stack, path, order)?;
        }
    }

    in_stack.remove(name);
    path.pop();
    // Post-order: dependencies land before their dependents.
    order.push(plugin);
    Ok(())
}
