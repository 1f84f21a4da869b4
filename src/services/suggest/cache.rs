use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;

use crate::error::{CoreError, Result};

const CACHE_FILE: &str = "suggestions.json";

/// New entries accumulated before the cache is written out.
pub const FLUSH_EVERY: usize = 10;

/// Source-hash -> suggestion store, persisted as a flat JSON object.
#[derive(Debug, Default)]
pub struct SuggestionCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
    pending: usize,
}

pub fn default_cache_path() -> PathBuf {
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        return PathBuf::from(local)
            .join("SekaiTranslator")
            .join("qa")
            .join(CACHE_FILE);
    }
    if let Some(dirs) = ProjectDirs::from("", "", "sekai-qa") {
        return dirs.cache_dir().join(CACHE_FILE);
    }
    PathBuf::from(CACHE_FILE)
}

impl SuggestionCache {
    /// Cache that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads `path`; a missing or unreadable file starts an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        tracing::debug!(path = %path.display(), entries = entries.len(), "suggestion cache loaded");

        Self {
            path: Some(path),
            entries,
            pending: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Stores a suggestion. Returns `true` once enough new entries piled up to flush.
    pub fn insert(&mut self, key: String, suggestion: String) -> bool {
        if self.entries.insert(key, suggestion).is_none() {
            self.pending += 1;
        }
        self.pending >= FLUSH_EVERY
    }

    pub fn is_dirty(&self) -> bool {
        self.pending > 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            self.pending = 0;
            return Ok(());
        };

        let json = serde_json::to_string_pretty(&self.entries)?;
        write_atomic(path, json.as_bytes())?;
        self.pending = 0;

        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, String> {
    if !path.exists() {
        return BTreeMap::new();
    }

    let data = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("failed to read {}: {e}", path.display());
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&data) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("failed to parse {}: {e}", path.display());
            BTreeMap::new()
        }
    }
}

/// Writes next to the target and renames over it, so a crash keeps the old file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);

    if let Some(parent) = tmp.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
    }

    fs::write(&tmp, bytes).map_err(|e| CoreError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))?;

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file_name = match path.file_name().and_then(|s| s.to_str()) {
        Some(n) => n.to_string(),
        None => CACHE_FILE.to_string(),
    };
    p.set_file_name(format!("{file_name}.tmp"));
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let cache = SuggestionCache::load(temp.path().join("none.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE);
        fs::write(&path, "{ not json").unwrap();
        let cache = SuggestionCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(CACHE_FILE);

        let mut cache = SuggestionCache::load(&path);
        cache.insert("k1".into(), "Hello".into());
        assert!(cache.is_dirty());
        cache.save().unwrap();
        assert!(!cache.is_dirty());
        assert!(!tmp_path(&path).exists());

        let reloaded = SuggestionCache::load(&path);
        assert_eq!(reloaded.get("k1"), Some("Hello"));
    }

    #[test]
    fn test_flush_due_after_ten_new_entries() {
        let mut cache = SuggestionCache::in_memory();
        for i in 0..FLUSH_EVERY - 1 {
            assert!(!cache.insert(format!("k{i}"), "v".into()));
        }
        // overwriting an existing key is not a new entry
        assert!(!cache.insert("k0".into(), "w".into()));
        assert!(cache.insert("last".into(), "v".into()));
        cache.save().unwrap();
        assert!(!cache.is_dirty());
    }
}
