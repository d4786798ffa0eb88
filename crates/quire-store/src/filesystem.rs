//! Read-only adapter over a directory of JSON files.
//!
//! A collection named `articles` is read from `<root>/articles.json` (an
//! array of records) or, when that file does not exist, from every `*.json`
//! file below `<root>/articles/` in path order. Each file holds an array of
//! records or a single record object.
//!
//! Records missing `_position` get their index within the collection, in
//! walk order, and records missing `_visible` are visible, so hand-written
//! content files can leave both out.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use quire_types::{Record, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageAdapter;

/// Filesystem adapter with a per-collection parse cache.
pub struct FilesystemAdapter {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<Record>>>>,
}

impl FilesystemAdapter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop the cached copy of one collection. Returns `true` if it was cached.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.cache.write().expect("lock poisoned").remove(name).is_some();
        debug!(collection = name, removed, "collection cache invalidated");
        removed
    }

    /// Drop every cached collection.
    pub fn invalidate_all(&self) {
        self.cache.write().expect("lock poisoned").clear();
        debug!("collection cache cleared");
    }

    fn cached(&self, name: &str) -> Option<Arc<Vec<Record>>> {
        self.cache.read().expect("lock poisoned").get(name).cloned()
    }

    fn load(&self, name: &str) -> StoreResult<Vec<Record>> {
        let file = self.root.join(format!("{name}.json"));
        let dir = self.root.join(name);

        if file.is_file() {
            return read_records(&file, 0);
        }
        if !dir.is_dir() {
            debug!(collection = name, root = %self.root.display(), "collection not found; empty");
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| StoreError::Walk {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
                let offset = records.len();
                records.extend(read_records(path, offset)?);
            }
        }
        Ok(records)
    }
}

/// Records of one file. `offset` is the collection index of its first
/// record.
fn read_records(path: &Path, offset: usize) -> StoreResult<Vec<Record>> {
    let text = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&text).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(StoreError::InvalidRecord {
                location: path.display().to_string(),
                reason: format!("expected an array or an object, got {other}"),
            })
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let mut record = Record::from_value(item).map_err(|e| StoreError::InvalidRecord {
                location: format!("{}[{index}]", path.display()),
                reason: e.to_string(),
            })?;
            if !record.contains_key("_position") {
                record.insert("_position", offset + index);
            }
            if !record.contains_key("_visible") {
                record.insert("_visible", true);
            }
            Ok(record)
        })
        .collect()
}

impl StorageAdapter for FilesystemAdapter {
    fn collection(&self, name: &str) -> StoreResult<Vec<Record>> {
        if let Some(records) = self.cached(name) {
            return Ok(records.as_ref().clone());
        }

        let records = Arc::new(self.load(name)?);
        debug!(collection = name, records = records.len(), "collection loaded from disk");
        self.cache
            .write()
            .expect("lock poisoned")
            .entry(name.to_string())
            .or_insert_with(|| Arc::clone(&records));
        Ok(records.as_ref().clone())
    }
}

impl std::fmt::Debug for FilesystemAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.cache.read().expect("lock poisoned").len();
        f.debug_struct("FilesystemAdapter")
            .field("root", &self.root)
            .field("cached_collections", &cached)
            .finish()
    }
}
