use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use quire_types::EntryId;
use tracing::trace;

use crate::entity::Entity;

/// Identity-map key: mapper kind plus record id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub kind: String,
    pub id: EntryId,
}

impl EntityKey {
    pub fn new(kind: impl Into<String>, id: EntryId) -> Self {
        Self { kind: kind.into(), id }
    }
}

/// Entities materialized during one traversal.
///
/// The map owns them: association proxies only keep weak handles, so an
/// entity lives as long as the traversal that loaded it. Within one map a
/// given `(kind, id)` always resolves to the same `Arc<Entity>`; the first
/// materialization wins. Call [`IdentityMap::reset`] between unrelated
/// requests, never in the middle of a traversal.
#[derive(Default)]
pub struct IdentityMap {
    entities: RwLock<HashMap<EntityKey, Arc<Entity>>>,
    anonymous: RwLock<Vec<Arc<Entity>>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str, id: &EntryId) -> Option<Arc<Entity>> {
        let key = EntityKey::new(kind, id.clone());
        let found = self.entities.read().expect("lock poisoned").get(&key).cloned();
        if found.is_some() {
            trace!(kind, id = %id, "identity map hit");
        }
        found
    }

    /// Keep `entity` for the rest of the traversal. When an entity with the
    /// same key is already held, that one is returned instead.
    pub fn register(&self, entity: Arc<Entity>) -> Arc<Entity> {
        let Some(id) = entity.id() else {
            self.anonymous.write().expect("lock poisoned").push(Arc::clone(&entity));
            return entity;
        };
        let key = EntityKey::new(entity.kind(), id);
        let mut entities = self.entities.write().expect("lock poisoned");
        Arc::clone(entities.entry(key).or_insert(entity))
    }

    pub fn contains(&self, kind: &str, id: &EntryId) -> bool {
        let key = EntityKey::new(kind, id.clone());
        self.entities.read().expect("lock poisoned").contains_key(&key)
    }

    /// Number of entities held by id.
    pub fn len(&self) -> usize {
        self.entities.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.anonymous.read().expect("lock poisoned").is_empty()
    }

    /// Release every entity.
    pub fn reset(&self) {
        self.entities.write().expect("lock poisoned").clear();
        self.anonymous.write().expect("lock poisoned").clear();
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let anonymous = self.anonymous.read().expect("lock poisoned").len();
        f.debug_struct("IdentityMap")
            .field("entities", &self.len())
            .field("anonymous", &anonymous)
            .finish()
    }
}
