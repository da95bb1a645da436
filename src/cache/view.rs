// Externally visible view cache.
// Holds precomputed dashboard views written by the primer and read before live computation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{OctodashError, Result};

use super::paths::view_file;
use super::store::{read_dir_cached, write_cached};

/// Map of view path to its last stored value.
///
/// Values are replaced whole, so a reader sees either the previous or the new
/// value. There is no TTL: freshness is up to whoever writes. A path can be
/// flagged to bypass the cache exactly once, which makes the next
/// [`lookup`](ViewCache::lookup) miss regardless of who performs it.
#[derive(Debug, Default)]
pub struct ViewCache {
    entries: RwLock<HashMap<String, Arc<Value>>>,
    bypass: Mutex<HashSet<String>>,
    persist_dir: Option<PathBuf>,
}

impl ViewCache {
    /// Create an in-memory view cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a view cache that snapshots every stored view into `dir` and
    /// starts out with whatever snapshots are already there.
    pub fn persistent(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let snapshots = read_dir_cached::<Value>(&dir)?;
        info!(dir = %dir.display(), count = snapshots.len(), "loaded view snapshots");

        let entries = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.key, Arc::new(snapshot.data)))
            .collect();

        Ok(Self {
            entries: RwLock::new(entries),
            bypass: Mutex::new(HashSet::new()),
            persist_dir: Some(dir),
        })
    }

    /// Snapshot directory, if persistence is enabled.
    pub fn persist_dir(&self) -> Option<&Path> {
        self.persist_dir.as_deref()
    }

    /// Make the next lookup of `path` miss.
    pub fn bypass_once(&self, path: &str) {
        if let Ok(mut bypass) = self.bypass.lock() {
            bypass.insert(path.to_string());
        }
    }

    /// Whether `path` is currently flagged to bypass.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass
            .lock()
            .map(|bypass| bypass.contains(path))
            .unwrap_or(false)
    }

    /// Read a view, consuming a pending bypass flag for `path`.
    pub fn lookup(&self, path: &str) -> Option<Arc<Value>> {
        let bypassed = self
            .bypass
            .lock()
            .map(|mut bypass| bypass.remove(path))
            .unwrap_or(false);
        if bypassed {
            debug!(path, "view cache bypassed");
            return None;
        }
        self.peek(path)
    }

    /// Read a view without touching bypass flags.
    pub fn peek(&self, path: &str) -> Option<Arc<Value>> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(path).cloned())
    }

    /// Replace the stored value for `path`.
    ///
    /// The in-memory value is updated before the snapshot is written, so a
    /// failed disk write still leaves readers with the new value.
    pub fn store(&self, path: &str, value: Value) -> Result<()> {
        let value = Arc::new(value);
        {
            let mut entries = self
                .entries
                .write()
                .map_err(|e| OctodashError::Other(format!("view cache lock poisoned: {}", e)))?;
            entries.insert(path.to_string(), Arc::clone(&value));
        }

        if let Some(dir) = &self.persist_dir {
            write_cached(&view_file(dir, path), path, &*value)?;
        }
        Ok(())
    }

    /// Paths that currently hold a value.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }
}
