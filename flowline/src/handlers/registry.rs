//! Lookup table of available action kinds.

use super::ActionHandler;
use crate::errors::{HandlerConflictError, UnknownActionError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of action handlers, addressable by id or alias.
///
/// Ids are unique across the registry and every alias maps to exactly one
/// handler. The same contract backs both the global registry and the
/// run-scoped dynamic registry on the context.
#[derive(Default)]
pub struct ActionHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
    aliases: RwLock<HashMap<String, String>>,
}

impl ActionHandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under its id and all of its aliases.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerConflictError`] when the id or any alias collides
    /// with an existing entry; nothing is registered in that case.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) -> Result<(), HandlerConflictError> {
        let metadata = handler.metadata();
        let mut handlers = self.handlers.write();
        let mut aliases = self.aliases.write();

        let collides = |key: &str| handlers.contains_key(key) || aliases.contains_key(key);
        if collides(&metadata.id) {
            return Err(HandlerConflictError::new(&metadata.id));
        }
        for alias in &metadata.aliases {
            if collides(alias) || *alias == metadata.id {
                return Err(HandlerConflictError::new(alias));
            }
        }

        for alias in &metadata.aliases {
            aliases.insert(alias.clone(), metadata.id.clone());
        }
        handlers.insert(metadata.id, handler);
        Ok(())
    }

    /// Removes the id and all of its aliases atomically.
    ///
    /// Returns true when a handler was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let mut handlers = self.handlers.write();
        let mut aliases = self.aliases.write();

        if handlers.remove(id).is_none() {
            return false;
        }
        aliases.retain(|_, owner| owner != id);
        true
    }

    /// Looks up a handler by id or alias.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn ActionHandler>> {
        let handlers = self.handlers.read();
        if let Some(handler) = handlers.get(key) {
            return Some(Arc::clone(handler));
        }
        let aliases = self.aliases.read();
        aliases
            .get(key)
            .and_then(|id| handlers.get(id))
            .map(Arc::clone)
    }

    /// Looks up a handler by id or alias, failing on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownActionError`] naming the lookup key.
    pub fn find(&self, key: &str) -> Result<Arc<dyn ActionHandler>, UnknownActionError> {
        self.get(key).ok_or_else(|| UnknownActionError::new(key))
    }

    /// Returns the registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Returns true when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Removes all handlers and aliases.
    pub fn clear(&self) {
        self.handlers.write().clear();
        self.aliases.write().clear();
    }
}

impl std::fmt::Debug for ActionHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandlerRegistry")
            .field("handler_count", &self.handlers.read().len())
            .field("alias_count", &self.aliases.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ActionMetadata, FnActionHandler};

    fn handler(id: &str, aliases: &[&str]) -> Arc<dyn ActionHandler> {
        let mut metadata = ActionMetadata::new(id);
        for alias in aliases {
            metadata = metadata.with_alias(*alias);
        }
        Arc::new(FnActionHandler::new(metadata, |_invocation| Ok(())))
    }

    #[test]
    fn test_register_and_find_by_id_and_alias() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &["cp", "duplicate"])).unwrap();
        registry.register(handler("move", &["mv"])).unwrap();

        for key in ["copy", "cp", "duplicate", "move", "mv"] {
            assert!(registry.find(key).is_ok(), "lookup failed for {key}");
        }
    }

    #[test]
    fn test_find_unknown_names_lookup_key() {
        let registry = ActionHandlerRegistry::new();
        let err = registry.find("missing").unwrap_err();
        assert_eq!(err.lookup, "missing");
    }

    #[test]
    fn test_id_collision_rejected() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &[])).unwrap();

        let err = registry.register(handler("copy", &[])).unwrap_err();
        assert_eq!(err.key, "copy");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_alias_collision_rejected_without_partial_registration() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &["cp"])).unwrap();

        let err = registry.register(handler("capture", &["cap", "cp"])).unwrap_err();
        assert_eq!(err.key, "cp");
        // The rejected handler contributed nothing.
        assert!(registry.get("capture").is_none());
        assert!(registry.get("cap").is_none());
    }

    #[test]
    fn test_alias_colliding_with_existing_id_rejected() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &[])).unwrap();

        let err = registry.register(handler("other", &["copy"])).unwrap_err();
        assert_eq!(err.key, "copy");
    }

    #[test]
    fn test_unregister_removes_id_and_aliases_atomically() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &["cp", "duplicate"])).unwrap();
        registry.register(handler("move", &["mv"])).unwrap();

        assert!(registry.unregister("copy"));

        for key in ["copy", "cp", "duplicate"] {
            assert!(registry.find(key).is_err(), "{key} should be gone");
        }
        assert!(registry.find("move").is_ok());
        assert!(registry.find("mv").is_ok());
    }

    #[test]
    fn test_unregister_unknown_returns_false() {
        let registry = ActionHandlerRegistry::new();
        assert!(!registry.unregister("missing"));
    }

    #[test]
    fn test_clear() {
        let registry = ActionHandlerRegistry::new();
        registry.register(handler("copy", &["cp"])).unwrap();
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.get("cp").is_none());
    }
}
