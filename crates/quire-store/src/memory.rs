use std::collections::HashMap;
use std::sync::RwLock;

use quire_types::{EntryId, Record, ID_KEY};

use crate::error::StoreResult;
use crate::traits::StorageAdapter;

/// In-memory, HashMap-based adapter.
///
/// Intended for tests and embedding. Collections are held behind a
/// `RwLock` for safe concurrent access. Records are cloned on read/write.
pub struct InMemoryAdapter {
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryAdapter {
    /// Create a new empty adapter.
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Builder-style variant of [`InMemoryAdapter::replace`].
    pub fn with_collection(self, name: &str, records: Vec<Record>) -> Self {
        self.replace(name, records);
        self
    }

    /// Replace the whole content of a collection.
    pub fn replace(&self, name: &str, records: Vec<Record>) {
        self.collections
            .write()
            .expect("lock poisoned")
            .insert(name.to_string(), records);
    }

    /// Append a record, assigning a generated `_id` when it has none.
    pub fn insert(&self, name: &str, mut record: Record) -> EntryId {
        let id = ensure_id(&mut record);
        self.collections
            .write()
            .expect("lock poisoned")
            .entry(name.to_string())
            .or_default()
            .push(record);
        id
    }

    /// Number of records in a collection.
    pub fn len(&self, name: &str) -> usize {
        self.collections
            .read()
            .expect("lock poisoned")
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Returns `true` if no collection holds any record.
    pub fn is_empty(&self) -> bool {
        self.collections
            .read()
            .expect("lock poisoned")
            .values()
            .all(Vec::is_empty)
    }

    /// Remove all collections.
    pub fn clear(&self) {
        self.collections.write().expect("lock poisoned").clear();
    }

    /// Sorted list of collection names.
    pub fn collection_names(&self) -> Vec<String> {
        let map = self.collections.read().expect("lock poisoned");
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for InMemoryAdapter {
    fn collection(&self, name: &str) -> StoreResult<Vec<Record>> {
        let map = self.collections.read().expect("lock poisoned");
        Ok(map.get(name).cloned().unwrap_or_default())
    }

    /// Upsert by `_id`: an existing record with the same id is replaced in
    /// place, otherwise the record is appended.
    fn persist(&self, name: &str, mut record: Record) -> StoreResult<EntryId> {
        let id = ensure_id(&mut record);
        let mut map = self.collections.write().expect("lock poisoned");
        let records = map.entry(name.to_string()).or_default();
        match records.iter_mut().find(|r| r.id().as_ref() == Some(&id)) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(id)
    }
}

fn ensure_id(record: &mut Record) -> EntryId {
    if let Some(id) = record.id() {
        return id;
    }
    let id = EntryId::generate();
    record.insert(ID_KEY, id.to_value());
    id
}

impl std::fmt::Debug for InMemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAdapter")
            .field("collections", &self.collection_names())
            .finish()
    }
}
