//! Query-facing repositories.
//!
//! [`ContentEntryRepository`] binds a storage adapter, a content-type source
//! and a [`Scope`]. [`ContentEntryRepository::with`] scopes it to one content
//! type; the resulting [`ScopedRepository`] answers queries. Scoped
//! repositories are immutable values: [`ScopedRepository::filtered`] and
//! [`ScopedRepository::ordered`] return new ones.

use std::fmt;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use quire_store::{Conditions, Direction, OrderBy, Query, StorageAdapter};
use quire_types::{EntryId, Locale, Record, Value};
use tracing::debug;

use crate::association::Association;
use crate::conditions::ConditionTranslator;
use crate::config::RepositoryConfig;
use crate::content_type::{by_id_or_name, ContentType, ContentTypeSource, FieldKind};
use crate::criteria::Criteria;
use crate::entity::{Attribute, Entity};
use crate::error::{ConfigError, ContentResult};
use crate::identity::IdentityMap;
use crate::localized::LocalizedValue;
use crate::mapper::{Mapper, MapperRegistry};
use crate::scope::Scope;

struct Settings {
    entries_collection: String,
    time_zone: FixedOffset,
}

// ---------------------------------------------------------------------------
// Unscoped repository
// ---------------------------------------------------------------------------

/// Content entries of one site, read in one locale.
#[derive(Clone)]
pub struct ContentEntryRepository {
    adapter: Arc<dyn StorageAdapter>,
    content_types: Arc<dyn ContentTypeSource>,
    scope: Scope,
    mappers: Arc<MapperRegistry>,
    settings: Arc<Settings>,
}

impl ContentEntryRepository {
    /// A repository over the `content_entries` collection, in UTC.
    pub fn new(
        adapter: Arc<dyn StorageAdapter>,
        content_types: Arc<dyn ContentTypeSource>,
        scope: Scope,
    ) -> Self {
        let defaults = RepositoryConfig::default();
        Self {
            adapter,
            content_types,
            scope,
            mappers: Arc::new(MapperRegistry::new()),
            settings: Arc::new(Settings {
                entries_collection: defaults.entries_collection,
                time_zone: Utc.fix(),
            }),
        }
    }

    /// A repository following `config`, rendering in `locale` (the site
    /// default when `None`).
    pub fn from_config(
        adapter: Arc<dyn StorageAdapter>,
        content_types: Arc<dyn ContentTypeSource>,
        config: &RepositoryConfig,
        locale: Option<Locale>,
    ) -> Result<Self, ConfigError> {
        let time_zone = config.time_zone_offset()?;
        Ok(Self {
            adapter,
            content_types,
            scope: config.scope(locale),
            mappers: Arc::new(MapperRegistry::new()),
            settings: Arc::new(Settings {
                entries_collection: config.entries_collection.clone(),
                time_zone,
            }),
        })
    }

    /// The same repository rendering in another locale. Mappers are shared.
    pub fn with_locale(&self, locale: impl Into<Locale>) -> Self {
        Self {
            scope: self.scope.with_locale(locale),
            ..self.clone()
        }
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    pub fn content_types(&self) -> &Arc<dyn ContentTypeSource> {
        &self.content_types
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn locale(&self) -> &Locale {
        &self.scope.locale
    }

    pub fn time_zone(&self) -> FixedOffset {
        self.settings.time_zone
    }

    pub fn mappers(&self) -> &MapperRegistry {
        &self.mappers
    }

    /// Scope the repository to a content type.
    pub fn with(&self, content_type: Arc<ContentType>) -> ContentResult<ScopedRepository> {
        let mapper = self.mappers.for_content_type(&content_type, self.content_types.as_ref())?;
        let local_conditions = Criteria::new().with("content_type_id", content_type.id.to_value());
        Ok(ScopedRepository {
            base: self.clone(),
            content_type,
            mapper,
            local_conditions,
            order_by: None,
        })
    }

    /// Scope the repository to the content type with this slug, if any.
    pub fn with_slug(&self, slug: &str) -> ContentResult<Option<ScopedRepository>> {
        match self.content_types.by_slug(slug)? {
            Some(content_type) => self.with(content_type).map(Some),
            None => Ok(None),
        }
    }

    /// `/{slug}` of the content type, under `/{locale}` outside the default
    /// locale.
    pub fn base_url(&self, content_type: &ContentType) -> String {
        if self.scope.is_default_locale() {
            format!("/{}", content_type.slug)
        } else {
            format!("/{}/{}", self.scope.locale, content_type.slug)
        }
    }

    /// The entry after `entry` in its content type's order.
    pub fn next(
        &self,
        identity: &IdentityMap,
        entry: Option<&Entity>,
    ) -> ContentResult<Option<Arc<Entity>>> {
        self.adjacent(identity, entry, true)
    }

    /// The entry before `entry` in its content type's order.
    pub fn previous(
        &self,
        identity: &IdentityMap,
        entry: Option<&Entity>,
    ) -> ContentResult<Option<Arc<Entity>>> {
        self.adjacent(identity, entry, false)
    }

    fn adjacent(
        &self,
        identity: &IdentityMap,
        entry: Option<&Entity>,
        forward: bool,
    ) -> ContentResult<Option<Arc<Entity>>> {
        let Some(entry) = entry else {
            return Ok(None);
        };
        let Some(content_type) = entry.content_type() else {
            return Ok(None);
        };
        let order = content_type.order_by();
        let Some((field, direction)) = order.first() else {
            return Ok(None);
        };
        let Some(current) = entry.value_in(field, &self.scope.locale).cloned() else {
            return Ok(None);
        };

        let operator = match (forward, direction) {
            (true, Direction::Asc) | (false, Direction::Desc) => "gt",
            (true, Direction::Desc) | (false, Direction::Asc) => "lt",
        };
        let search = if forward { order.clone() } else { order.reversed() };
        let criteria = Criteria::new().with(format!("{field}.{operator}"), current);

        self.with(Arc::clone(content_type))?
            .ordered(search)
            .first(identity, criteria)
    }

    fn collection(&self) -> &str {
        &self.settings.entries_collection
    }
}

impl fmt::Debug for ContentEntryRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentEntryRepository")
            .field("collection", &self.settings.entries_collection)
            .field("scope", &self.scope)
            .field("time_zone", &self.settings.time_zone)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Scoped repository
// ---------------------------------------------------------------------------

/// What [`ScopedRepository::value_for`] found for a field name.
#[derive(Debug)]
pub enum FieldValue<'a> {
    Value(&'a Value),
    Localized(&'a LocalizedValue),
    Association(&'a Association),
    /// A has-many association narrowed by extra criteria.
    Entries(ScopedRepository),
}

/// Entries sharing one select option.
#[derive(Clone, Debug)]
pub struct SelectOptionGroup {
    /// `None` for the trailing group of entries whose option is unknown.
    pub option_id: Option<EntryId>,
    /// Option name in the active locale.
    pub name: Option<String>,
    pub entries: Vec<Arc<Entity>>,
}

/// Repository bound to one content type.
#[derive(Clone)]
pub struct ScopedRepository {
    base: ContentEntryRepository,
    content_type: Arc<ContentType>,
    mapper: Arc<Mapper>,
    local_conditions: Criteria,
    order_by: Option<OrderBy>,
}

impl ScopedRepository {
    pub fn content_type(&self) -> &Arc<ContentType> {
        &self.content_type
    }

    pub fn mapper(&self) -> &Arc<Mapper> {
        &self.mapper
    }

    pub fn base(&self) -> &ContentEntryRepository {
        &self.base
    }

    pub fn scope(&self) -> &Scope {
        self.base.scope()
    }

    /// Criteria applied to every query of this repository.
    pub fn local_conditions(&self) -> &Criteria {
        &self.local_conditions
    }

    /// A copy with `criteria` merged into the local conditions. `self` is
    /// left untouched.
    pub fn filtered(&self, criteria: Criteria) -> Self {
        Self {
            local_conditions: self.local_conditions.merged(&criteria),
            ..self.clone()
        }
    }

    /// A copy sorting by `order` unless a query gives its own `order_by`.
    pub fn ordered(&self, order: OrderBy) -> Self {
        Self {
            order_by: Some(order),
            ..self.clone()
        }
    }

    /// Split `criteria` into persisted conditions and an `order_by`
    /// override. Local conditions are not included.
    pub fn conditions_without_order_by(
        &self,
        criteria: &Criteria,
    ) -> ContentResult<(Conditions, Option<OrderBy>)> {
        let locale = &self.base.scope.locale;
        ConditionTranslator::new(&self.content_type, locale, self.base.time_zone())
            .translate(criteria)
    }

    fn query(&self, criteria: &Criteria) -> ContentResult<Query> {
        let merged = self.local_conditions.merged(criteria);
        let (conditions, order_by) = self.conditions_without_order_by(&merged)?;
        let order_by = order_by
            .or_else(|| self.order_by.clone())
            .unwrap_or_else(|| self.content_type.order_by());
        Ok(Query::new(conditions)
            .with_order(order_by)
            .with_locale(self.base.scope.locale.clone())
            .with_site(self.base.scope.site_id.clone()))
    }

    fn materialize(
        &self,
        identity: &IdentityMap,
        records: Vec<Record>,
    ) -> ContentResult<Vec<Arc<Entity>>> {
        records
            .into_iter()
            .map(|record| self.mapper.to_entity(&self.base, identity, record))
            .collect()
    }

    /// Matching entries in the content type's order.
    pub fn all(
        &self,
        identity: &IdentityMap,
        criteria: Criteria,
    ) -> ContentResult<Vec<Arc<Entity>>> {
        let query = self.query(&criteria)?;
        let records = self.base.adapter.query(self.base.collection(), &query)?;
        debug!(
            content_type = %self.content_type.slug,
            conditions = query.conditions.len(),
            records = records.len(),
            "content entries query"
        );
        self.materialize(identity, records)
    }

    pub fn first(
        &self,
        identity: &IdentityMap,
        criteria: Criteria,
    ) -> ContentResult<Option<Arc<Entity>>> {
        let query = self.query(&criteria)?.with_limit(1);
        match self.base.adapter.first(self.base.collection(), &query)? {
            Some(record) => self.mapper.to_entity(&self.base, identity, record).map(Some),
            None => Ok(None),
        }
    }

    pub fn count(&self, criteria: Criteria) -> ContentResult<usize> {
        let query = self.query(&criteria)?;
        Ok(self.base.adapter.count(self.base.collection(), &query)?)
    }

    /// `true` if at least one entry matches.
    pub fn exists(&self, criteria: Criteria) -> ContentResult<bool> {
        let query = self.query(&criteria)?.with_limit(1);
        Ok(self.base.adapter.first(self.base.collection(), &query)?.is_some())
    }

    /// The entry with this id, visible or not.
    pub fn find(&self, identity: &IdentityMap, id: &EntryId) -> ContentResult<Option<Arc<Entity>>> {
        if let Some(entity) = identity.get(self.mapper.kind(), id) {
            return Ok(Some(entity));
        }
        let criteria = Criteria::new().with("_id", id.clone()).with("_visible", Value::Null);
        self.first(identity, criteria)
    }

    /// The entry with this slug in the active locale. `None` without
    /// touching the adapter when no slug is given.
    pub fn by_slug(
        &self,
        identity: &IdentityMap,
        slug: Option<&str>,
    ) -> ContentResult<Option<Arc<Entity>>> {
        let Some(slug) = slug else {
            return Ok(None);
        };
        self.first(identity, Criteria::new().with("_slug", slug))
    }

    /// A transient entry. Localized attributes given as scalars are read in
    /// the active locale.
    pub fn build(&self, attributes: Record) -> ContentResult<Arc<Entity>> {
        self.mapper
            .build_entity(&self.base, attributes, &self.base.scope.locale)
    }

    /// The persisted form of `entity`.
    pub fn serialize(&self, entity: &Entity) -> Record {
        self.mapper.serialize(entity, &self.base.scope)
    }

    /// Serialize `entity` and hand it to the adapter.
    pub fn persist(&self, entity: &Entity) -> ContentResult<EntryId> {
        let record = self.serialize(entity);
        let id = self.base.adapter.persist(self.base.collection(), record)?;
        debug!(content_type = %self.content_type.slug, id = %id, "content entry persisted");
        Ok(id)
    }

    /// Value of `name` on `entry`. A has-many field yields its repository
    /// narrowed by `criteria`; the association's own repository is left
    /// untouched.
    pub fn value_for<'a>(
        &self,
        entry: Option<&'a Entity>,
        name: &str,
        criteria: Criteria,
    ) -> Option<FieldValue<'a>> {
        let entry = entry?;
        if let Some(association) = entry.has_many(name) {
            return Some(FieldValue::Entries(association.repository().filtered(criteria)));
        }
        match entry.attribute(name)? {
            Attribute::Raw(value) => Some(FieldValue::Value(value)),
            Attribute::Localized(value) => Some(FieldValue::Localized(value)),
            Attribute::Association(association) => Some(FieldValue::Association(association)),
        }
    }

    /// Every entry, visible or not, grouped by the option of a select
    /// field in option order. Entries whose option is unknown come last, in
    /// a group without option.
    pub fn group_by_select_option(
        &self,
        identity: &IdentityMap,
        name: &str,
    ) -> ContentResult<Vec<SelectOptionGroup>> {
        let select = self.content_type.field(name).filter(|f| f.kind == FieldKind::Select);
        let Some(field) = select else {
            return Ok(Vec::new());
        };
        let locale = &self.base.scope.locale;
        let options = self.base.content_types.select_options(&self.content_type, name)?;
        let key = field.persisted_name();

        let mut groups: Vec<SelectOptionGroup> = options
            .iter()
            .map(|option| SelectOptionGroup {
                option_id: Some(option.id.clone()),
                name: option.name_in(locale).map(str::to_string),
                entries: Vec::new(),
            })
            .collect();
        let mut unmapped = Vec::new();

        let entries = self.all(identity, Criteria::new().with("_visible", Value::Null))?;
        for entry in entries {
            let index = entry
                .value_in(&key, locale)
                .and_then(|value| by_id_or_name(&options, value, locale))
                .and_then(|option| {
                    groups.iter().position(|g| g.option_id.as_ref() == Some(&option.id))
                });
            match index {
                Some(index) => groups[index].entries.push(entry),
                None => unmapped.push(entry),
            }
        }

        if !unmapped.is_empty() {
            groups.push(SelectOptionGroup {
                option_id: None,
                name: None,
                entries: unmapped,
            });
        }
        Ok(groups)
    }
}

impl fmt::Debug for ScopedRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRepository")
            .field("content_type", &self.content_type.slug)
            .field("local_conditions", &self.local_conditions)
            .field("order_by", &self.order_by)
            .field("locale", &self.base.scope.locale)
            .finish()
    }
}
