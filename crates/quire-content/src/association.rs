//! Lazy association proxies.
//!
//! Every proxy is attached to its owner when the owner is built and
//! resolves its targets on first use. Resolved targets are memoized as weak
//! handles: the [`IdentityMap`] passed to `resolve` owns them, so an entity
//! graph with back-references never forms a reference cycle. A memo whose
//! targets were released re-resolves on the next call.

use std::fmt;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use quire_types::{EntryId, Record, Value};
use tracing::debug;

use crate::criteria::{Criteria, Criterion};
use crate::entity::Entity;
use crate::error::{ContentError, ContentResult};
use crate::identity::IdentityMap;
use crate::mapper::Mapper;
use crate::repository::{ContentEntryRepository, ScopedRepository};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    Embedded,
    BelongsTo,
    HasMany,
    ManyToMany,
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedded => write!(f, "embedded"),
            Self::BelongsTo => write!(f, "belongs_to"),
            Self::HasMany => write!(f, "has_many"),
            Self::ManyToMany => write!(f, "many_to_many"),
        }
    }
}

/// Result of resolving an association.
#[derive(Clone, Debug)]
pub enum Resolved {
    One(Option<Arc<Entity>>),
    Many(Vec<Arc<Entity>>),
}

impl Resolved {
    pub fn into_vec(self) -> Vec<Arc<Entity>> {
        match self {
            Self::One(entity) => entity.into_iter().collect(),
            Self::Many(entities) => entities,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct OwnerSlot(OnceLock<Weak<Entity>>);

impl OwnerSlot {
    fn attach(&self, owner: Weak<Entity>) {
        // first attachment wins
        let _ = self.0.set(owner);
    }

    fn get(&self) -> Option<Arc<Entity>> {
        self.0.get()?.upgrade()
    }
}

#[derive(Default)]
struct Memo(RwLock<Option<Vec<Weak<Entity>>>>);

impl Memo {
    /// The memoized targets, unless one of them was released.
    fn get(&self) -> Option<Vec<Arc<Entity>>> {
        let memo = self.0.read().expect("lock poisoned");
        memo.as_ref()?.iter().map(Weak::upgrade).collect()
    }

    fn set(&self, entities: &[Arc<Entity>]) {
        let handles: Vec<Weak<Entity>> = entities.iter().map(Arc::downgrade).collect();
        *self.0.write().expect("lock poisoned") = Some(handles);
    }
}

// ---------------------------------------------------------------------------
// Association
// ---------------------------------------------------------------------------

pub enum Association {
    Embedded(EmbeddedAssociation),
    BelongsTo(BelongsToAssociation),
    HasMany(HasManyAssociation),
    ManyToMany(ManyToManyAssociation),
}

impl Association {
    pub fn kind(&self) -> AssociationKind {
        match self {
            Self::Embedded(_) => AssociationKind::Embedded,
            Self::BelongsTo(_) => AssociationKind::BelongsTo,
            Self::HasMany(_) => AssociationKind::HasMany,
            Self::ManyToMany(_) => AssociationKind::ManyToMany,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Embedded(a) => &a.name,
            Self::BelongsTo(a) => &a.name,
            Self::HasMany(a) => &a.name,
            Self::ManyToMany(a) => &a.name,
        }
    }

    pub(crate) fn attach(&self, owner: Weak<Entity>) {
        match self {
            Self::Embedded(a) => a.owner.attach(owner),
            Self::BelongsTo(a) => a.owner.attach(owner),
            Self::HasMany(a) => a.owner.attach(owner),
            Self::ManyToMany(a) => a.owner.attach(owner),
        }
    }

    /// The entity this proxy belongs to, while it is alive.
    pub fn owner(&self) -> Option<Arc<Entity>> {
        match self {
            Self::Embedded(a) => a.owner.get(),
            Self::BelongsTo(a) => a.owner.get(),
            Self::HasMany(a) => a.owner.get(),
            Self::ManyToMany(a) => a.owner.get(),
        }
    }

    pub fn resolve(&self, identity: &IdentityMap) -> ContentResult<Resolved> {
        match self {
            Self::Embedded(a) => Ok(Resolved::Many(a.resolve()?)),
            Self::BelongsTo(a) => Ok(Resolved::One(a.resolve(identity)?)),
            Self::HasMany(a) => Ok(Resolved::Many(a.resolve(identity)?)),
            Self::ManyToMany(a) => Ok(Resolved::Many(a.resolve(identity)?)),
        }
    }

    /// Write the owner-side keys of this association into `target`.
    pub fn serialize(&self, target: &mut Record) {
        match self {
            Self::Embedded(a) => a.serialize(target),
            Self::BelongsTo(a) => a.serialize(target),
            Self::HasMany(_) => {}
            Self::ManyToMany(a) => a.serialize(target),
        }
    }
}

impl fmt::Debug for Association {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Association")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Embedded
// ---------------------------------------------------------------------------

/// Values stored inside the owner record, materialized with the target
/// mapper. Embedded entities belong to their owner and bypass the identity
/// map.
pub struct EmbeddedAssociation {
    name: String,
    raw: Value,
    target: Arc<Mapper>,
    repository: ContentEntryRepository,
    owner: OwnerSlot,
    resolved: OnceLock<Vec<Arc<Entity>>>,
}

impl EmbeddedAssociation {
    pub(crate) fn new(
        name: impl Into<String>,
        raw: Value,
        target: Arc<Mapper>,
        repository: ContentEntryRepository,
    ) -> Self {
        Self {
            name: name.into(),
            raw,
            target,
            repository,
            owner: OwnerSlot::default(),
            resolved: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` when the owner holds a list rather than a single value.
    pub fn is_many(&self) -> bool {
        self.raw.is_array()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn resolve(&self) -> ContentResult<Vec<Arc<Entity>>> {
        if let Some(entities) = self.resolved.get() {
            return Ok(entities.clone());
        }

        let values: Vec<&Value> = match &self.raw {
            Value::Null => Vec::new(),
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let locale = self.repository.scope().default_locale.clone();
        let entities = values
            .into_iter()
            .map(|value| {
                let record =
                    Record::from_value(value.clone()).map_err(|e| ContentError::InvalidEmbedded {
                        association: self.name.clone(),
                        reason: e.to_string(),
                    })?;
                self.target.build_entity(&self.repository, record, &locale)
            })
            .collect::<ContentResult<Vec<_>>>()?;

        Ok(self.resolved.get_or_init(|| entities).clone())
    }

    pub fn serialize(&self, target: &mut Record) {
        target.insert(self.name.as_str(), self.raw.clone());
    }
}

// ---------------------------------------------------------------------------
// BelongsTo
// ---------------------------------------------------------------------------

/// The owner holds the target's id under `foreign_key`.
pub struct BelongsToAssociation {
    name: String,
    foreign_key: String,
    target_id: RwLock<Option<EntryId>>,
    repository: ScopedRepository,
    owner: OwnerSlot,
    memo: Memo,
}

impl BelongsToAssociation {
    pub(crate) fn new(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        target_id: Option<EntryId>,
        repository: ScopedRepository,
    ) -> Self {
        Self {
            name: name.into(),
            foreign_key: foreign_key.into(),
            target_id: RwLock::new(target_id),
            repository,
            owner: OwnerSlot::default(),
            memo: Memo::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn target_id(&self) -> Option<EntryId> {
        self.target_id.read().expect("lock poisoned").clone()
    }

    /// Repository of the target content type.
    pub fn repository(&self) -> &ScopedRepository {
        &self.repository
    }

    /// The target entry. A missing or dangling key resolves to `None`.
    pub fn resolve(&self, identity: &IdentityMap) -> ContentResult<Option<Arc<Entity>>> {
        if let Some(mut memo) = self.memo.get() {
            return Ok(memo.pop());
        }
        let Some(id) = self.target_id() else {
            self.memo.set(&[]);
            return Ok(None);
        };

        let target = self.repository.find(identity, &id)?;
        if target.is_none() {
            debug!(association = %self.name, id = %id, "dangling belongs_to key");
        }
        self.memo.set(target.as_slice());
        Ok(target)
    }

    /// Point the association at `target`, or clear it.
    pub fn assign(&self, target: Option<&Arc<Entity>>) {
        *self.target_id.write().expect("lock poisoned") = target.and_then(|t| t.id());
        let targets: Vec<Arc<Entity>> = target.into_iter().cloned().collect();
        self.memo.set(&targets);
    }

    pub fn serialize(&self, target: &mut Record) {
        let id = self.target_id().map_or(Value::Null, |id| id.to_value());
        target.insert(self.foreign_key.as_str(), id);
    }
}

// ---------------------------------------------------------------------------
// HasMany
// ---------------------------------------------------------------------------

/// Entries of the target type whose inverse key holds the owner's id.
pub struct HasManyAssociation {
    name: String,
    repository: ScopedRepository,
    owner: OwnerSlot,
    memo: Memo,
}

impl HasManyAssociation {
    /// `repository` is already filtered by the inverse key and ordered.
    pub(crate) fn new(name: impl Into<String>, repository: ScopedRepository) -> Self {
        Self {
            name: name.into(),
            repository,
            owner: OwnerSlot::default(),
            memo: Memo::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scoped repository this association reads from.
    pub fn repository(&self) -> &ScopedRepository {
        &self.repository
    }

    /// Empty when the owner has no id.
    pub fn resolve(&self, identity: &IdentityMap) -> ContentResult<Vec<Arc<Entity>>> {
        if let Some(memo) = self.memo.get() {
            return Ok(memo);
        }
        if self.owner.get().and_then(|owner| owner.id()).is_none() {
            return Ok(Vec::new());
        }

        let entries = self.repository.all(identity, Criteria::new())?;
        self.memo.set(&entries);
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// ManyToMany
// ---------------------------------------------------------------------------

/// The owner holds an ordered list of target ids under `foreign_key`.
pub struct ManyToManyAssociation {
    name: String,
    foreign_key: String,
    target_ids: RwLock<Vec<EntryId>>,
    repository: ScopedRepository,
    owner: OwnerSlot,
    memo: Memo,
}

impl ManyToManyAssociation {
    pub(crate) fn new(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        target_ids: Vec<EntryId>,
        repository: ScopedRepository,
    ) -> Self {
        Self {
            name: name.into(),
            foreign_key: foreign_key.into(),
            target_ids: RwLock::new(target_ids),
            repository,
            owner: OwnerSlot::default(),
            memo: Memo::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }

    pub fn target_ids(&self) -> Vec<EntryId> {
        self.target_ids.read().expect("lock poisoned").clone()
    }

    pub fn repository(&self) -> &ScopedRepository {
        &self.repository
    }

    /// Targets in the order of the owner's id list. Ids with no matching
    /// entry are left out.
    pub fn resolve(&self, identity: &IdentityMap) -> ContentResult<Vec<Arc<Entity>>> {
        if let Some(memo) = self.memo.get() {
            return Ok(memo);
        }
        let ids = self.target_ids();
        if ids.is_empty() {
            self.memo.set(&[]);
            return Ok(Vec::new());
        }

        let criteria = Criteria::new().with(
            "_id.in",
            Criterion::List(ids.iter().map(|id| Criterion::Value(id.to_value())).collect()),
        );
        let mut found = self.repository.all(identity, criteria)?;

        let mut ordered = Vec::with_capacity(ids.len());
        for id in &ids {
            match found.iter().position(|entry| entry.id().as_ref() == Some(id)) {
                Some(index) => ordered.push(found.swap_remove(index)),
                None => debug!(
                    association = %self.name,
                    id = %id,
                    "dropping missing many_to_many target"
                ),
            }
        }
        self.memo.set(&ordered);
        Ok(ordered)
    }

    /// Replace the targets, keeping their order.
    pub fn assign(&self, targets: &[Arc<Entity>]) {
        let ids: Vec<EntryId> = targets.iter().filter_map(|t| t.id()).collect();
        *self.target_ids.write().expect("lock poisoned") = ids;
        self.memo.set(targets);
    }

    pub fn serialize(&self, target: &mut Record) {
        let ids = self.target_ids().iter().map(EntryId::to_value).collect();
        target.insert(self.foreign_key.as_str(), Value::Array(ids));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, ids, record};
    use quire_types::json;

    fn article(identity: &IdentityMap, id: &str) -> Arc<Entity> {
        let repository = fixtures::repository();
        fixtures::scoped(&repository, "articles")
            .find(identity, &EntryId::from(id))
            .unwrap()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // BelongsTo
    // -----------------------------------------------------------------------

    #[test]
    fn belongs_to_resolves_through_the_identity_map() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let lorem = article(&identity, "lorem-ipsum");

        let a = hello.belongs_to("author").unwrap().resolve(&identity).unwrap().unwrap();
        let b = lorem.belongs_to("author").unwrap().resolve(&identity).unwrap().unwrap();
        assert_eq!(a.id(), Some(EntryId::from("jane")));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dangling_key_resolves_to_none() {
        let identity = IdentityMap::new();
        let dolor = article(&identity, "dolor-sit");
        let author = dolor.belongs_to("author").unwrap();
        assert_eq!(author.target_id(), Some(EntryId::from("ghost")));
        assert!(author.resolve(&identity).unwrap().is_none());
    }

    #[test]
    fn owner_back_reference() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let owner = hello.association("author").unwrap().owner().unwrap();
        assert!(Arc::ptr_eq(&owner, &hello));
    }

    #[test]
    fn assign_updates_the_written_key() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let repository = fixtures::repository();
        let john = fixtures::scoped(&repository, "authors")
            .find(&identity, &EntryId::from("john"))
            .unwrap()
            .unwrap();

        let author = hello.belongs_to("author").unwrap();
        author.assign(Some(&john));
        let resolved = author.resolve(&identity).unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &john));

        let mut out = Record::new();
        author.serialize(&mut out);
        assert_eq!(out.get("author_id"), Some(&json!("john")));

        author.assign(None);
        author.serialize(&mut out);
        assert_eq!(out.get("author_id"), Some(&Value::Null));
    }

    #[test]
    fn released_memo_re_resolves() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let author = hello.belongs_to("author").unwrap();
        let first = author.resolve(&identity).unwrap().unwrap();
        let weak = Arc::downgrade(&first);

        drop(first);
        identity.reset();
        assert!(weak.upgrade().is_none());

        let next = IdentityMap::new();
        let again = author.resolve(&next).unwrap().unwrap();
        assert_eq!(again.id(), Some(EntryId::from("jane")));
        assert!(next.contains(again.kind(), &EntryId::from("jane")));
    }

    // -----------------------------------------------------------------------
    // HasMany
    // -----------------------------------------------------------------------

    #[test]
    fn has_many_is_ordered_and_scoped_to_visible_entries() {
        let identity = IdentityMap::new();
        let repository = fixtures::repository();
        let jane = fixtures::scoped(&repository, "authors")
            .find(&identity, &EntryId::from("jane"))
            .unwrap()
            .unwrap();

        let articles = jane.has_many("articles").unwrap().resolve(&identity).unwrap();
        // ordered by `_position desc`
        assert_eq!(
            ids(&articles),
            vec![EntryId::from("lorem-ipsum"), EntryId::from("hello-world")]
        );

        // back-references land on the same entity
        let author = articles[0].belongs_to("author").unwrap().resolve(&identity).unwrap().unwrap();
        assert!(Arc::ptr_eq(&author, &jane));
    }

    #[test]
    fn has_many_of_transient_owner_is_empty() {
        let repository = fixtures::repository();
        let authors = fixtures::scoped(&repository, "authors");
        let draft = authors.build(record(json!({ "name": "New" }))).unwrap();
        let articles = draft.has_many("articles").unwrap().resolve(&IdentityMap::new()).unwrap();
        assert!(articles.is_empty());
    }

    #[test]
    fn bidirectional_graph_is_released_with_the_identity_map() {
        let identity = IdentityMap::new();
        let repository = fixtures::repository();
        let jane = fixtures::scoped(&repository, "authors")
            .find(&identity, &EntryId::from("jane"))
            .unwrap()
            .unwrap();
        let articles = jane.has_many("articles").unwrap().resolve(&identity).unwrap();
        for article in &articles {
            article.belongs_to("author").unwrap().resolve(&identity).unwrap();
        }
        let weak_jane = Arc::downgrade(&jane);
        let weak_article = Arc::downgrade(&articles[0]);

        drop(articles);
        drop(jane);
        identity.reset();
        assert!(weak_jane.upgrade().is_none());
        assert!(weak_article.upgrade().is_none());
    }

    // -----------------------------------------------------------------------
    // ManyToMany
    // -----------------------------------------------------------------------

    #[test]
    fn many_to_many_keeps_the_owner_order() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let tags = hello.many_to_many("tags").unwrap();
        assert_eq!(tags.foreign_key(), "tag_ids");

        // storage holds cms before rust
        let resolved = tags.resolve(&identity).unwrap();
        assert_eq!(ids(&resolved), vec![EntryId::from("rust"), EntryId::from("cms")]);
    }

    #[test]
    fn many_to_many_drops_missing_ids() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let draft = articles
            .build(record(json!({ "title": "Draft", "tag_ids": ["gone", "cms", "rust"] })))
            .unwrap();
        let resolved = draft.many_to_many("tags").unwrap().resolve(&IdentityMap::new()).unwrap();
        assert_eq!(ids(&resolved), vec![EntryId::from("cms"), EntryId::from("rust")]);
    }

    #[test]
    fn many_to_many_assign_and_serialize() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let tags = hello.many_to_many("tags").unwrap();
        let resolved = tags.resolve(&identity).unwrap();

        let reversed: Vec<_> = resolved.iter().rev().cloned().collect();
        tags.assign(&reversed);
        assert_eq!(tags.target_ids(), vec![EntryId::from("cms"), EntryId::from("rust")]);

        let mut out = Record::new();
        hello.association("tags").unwrap().serialize(&mut out);
        assert_eq!(out.get("tag_ids"), Some(&json!(["cms", "rust"])));
    }

    #[test]
    fn resolve_dispatches_by_kind() {
        let identity = IdentityMap::new();
        let hello = article(&identity, "hello-world");
        let author = hello.association("author").unwrap();
        assert_eq!(author.kind(), AssociationKind::BelongsTo);
        assert!(matches!(author.resolve(&identity).unwrap(), Resolved::One(Some(_))));

        let tags = hello.association("tags").unwrap().resolve(&identity).unwrap();
        assert_eq!(tags.into_vec().len(), 2);
        assert_eq!(AssociationKind::ManyToMany.to_string(), "many_to_many");
    }
}
