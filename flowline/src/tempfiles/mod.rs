//! Temporary path bookkeeping for a run.
//!
//! Handlers that need scratch files register them here so one cleanup pass
//! at the end of a run removes everything that was not explicitly kept.

use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TempEntry {
    path: PathBuf,
    keep: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    root: Option<PathBuf>,
    entries: Vec<TempEntry>,
}

/// Tracks temporary files and directories created during a run.
#[derive(Debug, Default)]
pub struct TempPathRegistry {
    state: RwLock<RegistryState>,
}

impl TempPathRegistry {
    /// Creates an empty registry. The backing directory is created lazily.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_root(&self) -> io::Result<PathBuf> {
        let mut state = self.state.write();
        if let Some(root) = &state.root {
            return Ok(root.clone());
        }
        let root = std::env::temp_dir().join(format!("flowline-{}", Uuid::new_v4()));
        fs::create_dir_all(&root)?;
        state.root = Some(root.clone());
        Ok(root)
    }

    /// Creates an empty temporary file and registers it.
    ///
    /// With `keep`, cleanup leaves the file in place.
    ///
    /// # Errors
    ///
    /// Returns the IO failure that prevented creation.
    pub fn create_file(&self, prefix: &str, keep: bool) -> io::Result<PathBuf> {
        let root = self.ensure_root()?;
        let path = root.join(format!("{prefix}-{}", Uuid::new_v4()));
        fs::File::create(&path)?;
        self.track(path.clone(), keep);
        Ok(path)
    }

    /// Creates a temporary directory and registers it.
    ///
    /// # Errors
    ///
    /// Returns the IO failure that prevented creation.
    pub fn create_dir(&self, prefix: &str, keep: bool) -> io::Result<PathBuf> {
        let root = self.ensure_root()?;
        let path = root.join(format!("{prefix}-{}", Uuid::new_v4()));
        fs::create_dir_all(&path)?;
        self.track(path.clone(), keep);
        Ok(path)
    }

    fn track(&self, path: PathBuf, keep: bool) {
        self.state.write().entries.push(TempEntry { path, keep });
    }

    /// Returns the currently tracked paths.
    #[must_use]
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Removes every tracked path not marked `keep`.
    ///
    /// Already-missing paths count as removed. Kept entries and entries that
    /// failed to delete stay tracked, so the pass is safe to repeat. Returns
    /// the failures.
    pub fn cleanup(&self) -> Vec<(PathBuf, io::Error)> {
        let mut state = self.state.write();
        let mut failures = Vec::new();
        let mut remaining = Vec::new();

        for entry in state.entries.drain(..) {
            if entry.keep {
                remaining.push(entry);
                continue;
            }
            match remove_path(&entry.path) {
                Ok(()) => {
                    tracing::debug!(path = %entry.path.display(), "removed temp path");
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(path = %entry.path.display(), error = %err, "temp cleanup failed");
                    failures.push((entry.path.clone(), err));
                    remaining.push(entry);
                }
            }
        }
        state.entries = remaining;

        // Drop the backing directory once nothing is tracked under it.
        if state.entries.is_empty() {
            if let Some(root) = state.root.take() {
                let _ = fs::remove_dir(&root);
            }
        }
        failures
    }

    /// Forgets every tracked path without touching the filesystem.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.root = None;
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

static GLOBAL: RwLock<Option<Arc<TempPathRegistry>>> = RwLock::new(None);

/// Returns the process-wide registry, creating it on first use.
#[must_use]
pub fn global_temp_registry() -> Arc<TempPathRegistry> {
    if let Some(registry) = GLOBAL.read().as_ref() {
        return Arc::clone(registry);
    }
    let mut slot = GLOBAL.write();
    if let Some(registry) = slot.as_ref() {
        return Arc::clone(registry);
    }
    let registry = Arc::new(TempPathRegistry::new());
    *slot = Some(Arc::clone(&registry));
    registry
}

/// Drops the process-wide registry. Mainly for tests.
pub fn reset_global_temp_registry() {
    *GLOBAL.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_cleanup() {
        let registry = TempPathRegistry::new();
        let file = registry.create_file("scratch", false).unwrap();
        let dir = registry.create_dir("work", false).unwrap();
        assert!(file.is_file());
        assert!(dir.is_dir());

        let failures = registry.cleanup();
        assert!(failures.is_empty());
        assert!(!file.exists());
        assert!(!dir.exists());
        assert!(registry.tracked().is_empty());
    }

    #[test]
    fn test_cleanup_retains_kept_entries() {
        let registry = TempPathRegistry::new();
        let kept = registry.create_file("kept", true).unwrap();
        let dropped = registry.create_file("dropped", false).unwrap();

        let failures = registry.cleanup();
        assert!(failures.is_empty());
        assert!(kept.is_file());
        assert!(!dropped.exists());
        assert_eq!(registry.tracked(), vec![kept.clone()]);

        // Leave nothing behind.
        std::fs::remove_file(&kept).unwrap();
        registry.reset();
    }

    #[test]
    fn test_cleanup_tolerates_already_missing_paths() {
        let registry = TempPathRegistry::new();
        let file = registry.create_file("gone", false).unwrap();
        std::fs::remove_file(&file).unwrap();

        let failures = registry.cleanup();
        assert!(failures.is_empty());
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let registry = TempPathRegistry::new();
        registry.create_file("once", false).unwrap();
        assert!(registry.cleanup().is_empty());
        assert!(registry.cleanup().is_empty());
    }

    #[test]
    fn test_global_registry_is_shared() {
        reset_global_temp_registry();
        let first = global_temp_registry();
        let second = global_temp_registry();
        assert!(Arc::ptr_eq(&first, &second));
        reset_global_temp_registry();
    }
}
