// On-disk snapshots for the view cache.
// Handles JSON serialization and atomic filesystem writes.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::error::Result;

/// Wrapper for persisted data with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    /// Cache key the data was stored under.
    pub key: String,
    /// The cached data.
    pub data: T,
    /// When the data was cached.
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    /// Create a new cached data entry.
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            key: key.into(),
            data,
            cached_at: Utc::now(),
        }
    }
}

/// Read cached JSON data from a file.
pub fn read_cached<T: DeserializeOwned>(path: &Path) -> Result<Option<CachedData<T>>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let cached: CachedData<T> = serde_json::from_str(&contents)?;
    Ok(Some(cached))
}

/// Write data to cache as JSON.
pub fn write_cached<T: Serialize>(path: &Path, key: &str, data: &T) -> Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let cached = CachedData::new(key, data);
    let json = serde_json::to_string(&cached)?;

    // Write atomically via temp file
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

/// Load every snapshot in a directory.
///
/// Unreadable or corrupt files are skipped with a warning; a missing
/// directory yields nothing.
pub fn read_dir_cached<T: DeserializeOwned>(dir: &Path) -> Result<Vec<CachedData<T>>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut loaded = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_cached::<T>(&path) {
            Ok(Some(cached)) => loaded.push(cached),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable snapshot"),
        }
    }
    Ok(loaded)
}
