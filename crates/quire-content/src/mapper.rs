//! Record to entity translation.
//!
//! A [`Mapper`] is a static schema descriptor: default attributes, localized
//! attribute names and association declarations, fixed when it is built.
//! Content-type mappers are derived from a [`ContentType`] with
//! [`Mapper::for_content_type`] and cached in a [`MapperRegistry`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use quire_store::OrderBy;
use quire_types::text::{singularize, slugify};
use quire_types::{EntryId, Locale, Record, Value};

use crate::association::{
    Association, AssociationKind, BelongsToAssociation, EmbeddedAssociation, HasManyAssociation,
    ManyToManyAssociation,
};
use crate::content_type::{ContentType, ContentTypeSource, FieldKind};
use crate::criteria::Criteria;
use crate::entity::{Entity, EntityParts};
use crate::error::{ConfigError, ContentResult};
use crate::identity::IdentityMap;
use crate::localized::LocalizedValue;
use crate::repository::ContentEntryRepository;
use crate::scope::Scope;

/// Attributes every content entry treats as localized, on top of the
/// content type's localized fields.
pub const ENTRY_LOCALIZED_ATTRIBUTES: &[&str] =
    &["_slug", "_label", "seo_title", "meta_description", "meta_keywords"];

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

pub type ComputedDefault = Arc<dyn Fn(&Scope) -> Value + Send + Sync>;

/// Value of a default attribute.
#[derive(Clone)]
pub enum DefaultValue {
    Literal(Value),
    /// Computed from the repository scope when the entity is built.
    Computed(ComputedDefault),
}

impl DefaultValue {
    pub fn computed(f: impl Fn(&Scope) -> Value + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    pub fn evaluate(&self, scope: &Scope) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Computed(f) => f(scope),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<Value> for DefaultValue {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

#[derive(Clone, Debug)]
pub enum AssociationTarget {
    /// Entries of another content type.
    ContentType(Arc<ContentType>),
    /// Values stored inside the owner, built with this mapper.
    Embedded(Arc<Mapper>),
}

#[derive(Clone, Debug, Default)]
pub struct AssociationOptions {
    /// Owner-side key (`author_id`, `tag_ids`). Derived from the name when
    /// unset.
    pub foreign_key: Option<String>,
    /// Name of the belongs_to field on the target pointing back at the
    /// owner (has_many only).
    pub inverse_of: Option<String>,
    pub order_by: Option<OrderBy>,
}

/// A validated association declaration.
#[derive(Clone, Debug)]
pub struct AssociationSpec {
    pub kind: AssociationKind,
    pub name: String,
    pub target: AssociationTarget,
    /// Owner-side key for embedded, belongs_to and many_to_many; the
    /// target-side inverse key for has_many.
    pub foreign_key: String,
    pub order_by: Option<OrderBy>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

struct PendingAssociation {
    kind: AssociationKind,
    name: String,
    target: Option<AssociationTarget>,
    options: AssociationOptions,
}

pub struct MapperBuilder {
    kind: String,
    default_attributes: Vec<(String, DefaultValue)>,
    localized_attributes: Vec<String>,
    associations: Vec<PendingAssociation>,
    content_type: Option<Arc<ContentType>>,
    label_field: Option<String>,
}

impl MapperBuilder {
    fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            default_attributes: Vec::new(),
            localized_attributes: Vec::new(),
            associations: Vec::new(),
            content_type: None,
            label_field: None,
        }
    }

    pub fn default_attribute(
        mut self,
        name: impl Into<String>,
        value: impl Into<DefaultValue>,
    ) -> Self {
        self.default_attributes.push((name.into(), value.into()));
        self
    }

    pub fn localized_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.localized_attributes.contains(&name) {
                self.localized_attributes.push(name);
            }
        }
        self
    }

    /// Declare an association. Targets are checked by [`MapperBuilder::build`].
    pub fn association(
        mut self,
        kind: AssociationKind,
        name: impl Into<String>,
        target: Option<AssociationTarget>,
        options: AssociationOptions,
    ) -> Self {
        self.associations.push(PendingAssociation {
            kind,
            name: name.into(),
            target,
            options,
        });
        self
    }

    pub fn embedded(self, name: impl Into<String>, target: Arc<Mapper>) -> Self {
        self.association(
            AssociationKind::Embedded,
            name,
            Some(AssociationTarget::Embedded(target)),
            AssociationOptions::default(),
        )
    }

    pub fn belongs_to(
        self,
        name: impl Into<String>,
        target: Option<Arc<ContentType>>,
        options: AssociationOptions,
    ) -> Self {
        let target = target.map(AssociationTarget::ContentType);
        self.association(AssociationKind::BelongsTo, name, target, options)
    }

    pub fn has_many(
        self,
        name: impl Into<String>,
        target: Option<Arc<ContentType>>,
        options: AssociationOptions,
    ) -> Self {
        let target = target.map(AssociationTarget::ContentType);
        self.association(AssociationKind::HasMany, name, target, options)
    }

    pub fn many_to_many(
        self,
        name: impl Into<String>,
        target: Option<Arc<ContentType>>,
        options: AssociationOptions,
    ) -> Self {
        let target = target.map(AssociationTarget::ContentType);
        self.association(AssociationKind::ManyToMany, name, target, options)
    }

    /// Content type of the entities this mapper builds.
    pub fn content_type(mut self, content_type: Arc<ContentType>) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Attribute holding the entry label; enables `_label` and `_slug`
    /// derivation.
    pub fn label_field(mut self, name: impl Into<String>) -> Self {
        self.label_field = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Mapper, ConfigError> {
        let mut seen = HashSet::new();
        let mut associations = Vec::with_capacity(self.associations.len());

        for pending in self.associations {
            if !seen.insert(pending.name.clone()) {
                return Err(ConfigError::DuplicateAssociation {
                    mapper: self.kind,
                    association: pending.name,
                });
            }
            let Some(target) = pending.target else {
                return Err(ConfigError::MissingTarget {
                    mapper: self.kind,
                    association: pending.name,
                });
            };

            let embedded_target = matches!(target, AssociationTarget::Embedded(_));
            if embedded_target != (pending.kind == AssociationKind::Embedded) {
                return Err(ConfigError::TargetMismatch {
                    mapper: self.kind,
                    association: pending.name,
                    kind: pending.kind,
                });
            }

            let foreign_key = match (pending.options.foreign_key, pending.kind) {
                (Some(key), _) => key,
                (None, AssociationKind::Embedded) => pending.name.clone(),
                (None, AssociationKind::BelongsTo) => format!("{}_id", pending.name),
                (None, AssociationKind::ManyToMany) => {
                    format!("{}_ids", singularize(&pending.name))
                }
                (None, AssociationKind::HasMany) => match pending.options.inverse_of {
                    Some(inverse) => format!("{inverse}_id"),
                    None => {
                        return Err(ConfigError::MissingInverse {
                            mapper: self.kind,
                            association: pending.name,
                        })
                    }
                },
            };

            associations.push(AssociationSpec {
                kind: pending.kind,
                name: pending.name,
                target,
                foreign_key,
                order_by: pending.options.order_by,
            });
        }

        Ok(Mapper {
            kind: self.kind,
            default_attributes: self.default_attributes,
            localized_attributes: self.localized_attributes,
            associations,
            content_type: self.content_type,
            label_field: self.label_field,
        })
    }
}

// ---------------------------------------------------------------------------
// Mapper
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Mapper {
    kind: String,
    default_attributes: Vec<(String, DefaultValue)>,
    localized_attributes: Vec<String>,
    associations: Vec<AssociationSpec>,
    content_type: Option<Arc<ContentType>>,
    label_field: Option<String>,
}

impl Mapper {
    pub fn builder(kind: impl Into<String>) -> MapperBuilder {
        MapperBuilder::new(kind)
    }

    /// The mapper of a content type's entries.
    ///
    /// Association targets are looked up in `source`; a field naming no
    /// target, or an unknown one, is a configuration error.
    pub fn for_content_type(
        content_type: Arc<ContentType>,
        source: &dyn ContentTypeSource,
    ) -> ContentResult<Self> {
        let kind = format!("content_entry:{}", content_type.id);
        let mut builder = Mapper::builder(kind.as_str())
            .content_type(Arc::clone(&content_type))
            .localized_attributes(content_type.localized_names())
            .localized_attributes(ENTRY_LOCALIZED_ATTRIBUTES.iter().copied())
            .default_attribute("_visible", true)
            .default_attribute("content_type_id", content_type.id.to_value())
            .default_attribute(
                "site_id",
                DefaultValue::computed(|scope| {
                    scope.site_id.as_ref().map_or(Value::Null, EntryId::to_value)
                }),
            );

        if let Some(label) = content_type.label_field_name() {
            let persisted = content_type
                .field(label)
                .map_or_else(|| label.to_string(), |f| f.persisted_name());
            builder = builder.label_field(persisted);
        }
        for field in content_type.fields_with_default() {
            if let Some(default) = &field.default {
                builder = builder.default_attribute(field.persisted_name(), default.clone());
            }
        }

        for field in content_type.association_fields() {
            let target = match &field.target_id {
                Some(id) => Some(source.find(id)?.ok_or_else(|| ConfigError::UnknownTarget {
                    mapper: kind.clone(),
                    association: field.name.clone(),
                    target: id.clone(),
                })?),
                None => None,
            };
            builder = match field.kind {
                FieldKind::BelongsTo => builder.belongs_to(
                    field.name.as_str(),
                    target,
                    AssociationOptions {
                        foreign_key: Some(field.persisted_name()),
                        ..AssociationOptions::default()
                    },
                ),
                FieldKind::ManyToMany => builder.many_to_many(
                    field.name.as_str(),
                    target,
                    AssociationOptions {
                        foreign_key: Some(field.persisted_name()),
                        ..AssociationOptions::default()
                    },
                ),
                _ => {
                    // the inverse key is whatever the target's belongs-to field persists as
                    let foreign_key = field
                        .inverse_of
                        .as_deref()
                        .and_then(|inverse| target.as_ref()?.field(inverse))
                        .map(|inverse| inverse.persisted_name());
                    builder.has_many(
                        field.name.as_str(),
                        target,
                        AssociationOptions {
                            foreign_key,
                            inverse_of: field.inverse_of.clone(),
                            order_by: field.association_order(),
                        },
                    )
                }
            };
        }

        Ok(builder.build()?)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn content_type(&self) -> Option<&Arc<ContentType>> {
        self.content_type.as_ref()
    }

    pub fn localized_attributes(&self) -> &[String] {
        &self.localized_attributes
    }

    pub fn is_localized(&self, name: &str) -> bool {
        self.localized_attributes.iter().any(|n| n == name)
    }

    pub fn default_attributes(&self) -> &[(String, DefaultValue)] {
        &self.default_attributes
    }

    pub fn associations(&self) -> &[AssociationSpec] {
        &self.associations
    }

    pub fn association(&self, name: &str) -> Option<&AssociationSpec> {
        self.associations.iter().find(|a| a.name == name)
    }

    /// Materialize a persisted record.
    ///
    /// A record whose id is already in `identity` yields the entity held
    /// there, unchanged. Otherwise the entity is built and registered.
    pub fn to_entity(
        &self,
        repository: &ContentEntryRepository,
        identity: &IdentityMap,
        record: Record,
    ) -> ContentResult<Arc<Entity>> {
        if let Some(id) = record.id() {
            if let Some(existing) = identity.get(&self.kind, &id) {
                return Ok(existing);
            }
        }
        let default_locale = repository.scope().default_locale.clone();
        let entity = self.build_entity(repository, record, &default_locale)?;
        Ok(identity.register(entity))
    }

    /// Build an entity without consulting an identity map. Localized
    /// attributes given as scalars are read as `scalar_locale` values.
    pub fn build_entity(
        &self,
        repository: &ContentEntryRepository,
        record: Record,
        scalar_locale: &Locale,
    ) -> ContentResult<Arc<Entity>> {
        let parts = self.deserialize(repository, record, scalar_locale)?;
        Ok(Arc::new_cyclic(|owner| {
            for association in parts.associations.values() {
                association.attach(owner.clone());
            }
            Entity::from_parts(parts)
        }))
    }

    fn deserialize(
        &self,
        repository: &ContentEntryRepository,
        record: Record,
        scalar_locale: &Locale,
    ) -> ContentResult<EntityParts> {
        let scope = repository.scope();
        let mut attributes = record;

        let mut localized = BTreeMap::new();
        for name in &self.localized_attributes {
            let raw = attributes.remove(name);
            localized.insert(
                name.clone(),
                LocalizedValue::from_persisted(name.as_str(), raw.as_ref(), scalar_locale),
            );
        }

        let owner_id = attributes.id();
        let mut associations = BTreeMap::new();
        for spec in &self.associations {
            let association =
                self.attach_association(repository, spec, &mut attributes, owner_id.as_ref())?;
            associations.insert(spec.name.clone(), association);
        }

        if let Some(label_field) = &self.label_field {
            derive_label_and_slug(label_field, &mut attributes, &mut localized, scope);
        }
        self.apply_defaults(&mut attributes, &mut localized, scope);

        let base_url = self.content_type.as_deref().map(|ct| repository.base_url(ct));
        Ok(EntityParts {
            kind: self.kind.clone(),
            attributes,
            localized,
            associations,
            content_type: self.content_type.clone(),
            base_url,
        })
    }

    fn attach_association(
        &self,
        repository: &ContentEntryRepository,
        spec: &AssociationSpec,
        attributes: &mut Record,
        owner_id: Option<&EntryId>,
    ) -> ContentResult<Association> {
        let name = spec.name.as_str();
        let key = spec.foreign_key.as_str();

        let association = match (&spec.target, spec.kind) {
            (AssociationTarget::Embedded(target), AssociationKind::Embedded) => {
                let raw = attributes.remove(key).unwrap_or(Value::Null);
                let embedded =
                    EmbeddedAssociation::new(name, raw, Arc::clone(target), repository.clone());
                Association::Embedded(embedded)
            }
            (AssociationTarget::ContentType(target), AssociationKind::BelongsTo) => {
                let given = attributes.remove(name);
                let target_id = match attributes.get(key) {
                    Some(value) => EntryId::from_value(value),
                    None => given.as_ref().and_then(id_of),
                };
                if let (false, Some(id)) = (attributes.contains_key(key), &target_id) {
                    attributes.insert(key, id.to_value());
                }
                let target_repository = repository.with(Arc::clone(target))?;
                Association::BelongsTo(BelongsToAssociation::new(
                    name,
                    key,
                    target_id,
                    target_repository,
                ))
            }
            (AssociationTarget::ContentType(target), AssociationKind::HasMany) => {
                let inverse = owner_id.map_or(Value::Null, EntryId::to_value);
                let mut target_repository = repository
                    .with(Arc::clone(target))?
                    .filtered(Criteria::new().with(key, inverse));
                if let Some(order) = &spec.order_by {
                    target_repository = target_repository.ordered(order.clone());
                }
                Association::HasMany(HasManyAssociation::new(name, target_repository))
            }
            (AssociationTarget::ContentType(target), AssociationKind::ManyToMany) => {
                let given = attributes.remove(name);
                let target_ids = match attributes.get(key).or(given.as_ref()) {
                    Some(Value::Array(items)) => items.iter().filter_map(id_of).collect(),
                    Some(value) => id_of(value).into_iter().collect(),
                    None => Vec::new(),
                };
                let target_repository = repository.with(Arc::clone(target))?;
                Association::ManyToMany(ManyToManyAssociation::new(
                    name,
                    key,
                    target_ids,
                    target_repository,
                ))
            }
            _ => {
                return Err(ConfigError::TargetMismatch {
                    mapper: self.kind.clone(),
                    association: spec.name.clone(),
                    kind: spec.kind,
                }
                .into())
            }
        };
        Ok(association)
    }

    /// Defaults only fill gaps: a value already present, raw or localized,
    /// is kept.
    fn apply_defaults(
        &self,
        attributes: &mut Record,
        localized: &mut BTreeMap<String, LocalizedValue>,
        scope: &Scope,
    ) {
        for (name, default) in &self.default_attributes {
            if let Some(value) = localized.get_mut(name) {
                if value.read(scope.default_locale.as_str()).is_none() {
                    let computed = default.evaluate(scope);
                    if !computed.is_null() {
                        value.write(scope.default_locale.clone(), computed);
                    }
                }
                continue;
            }
            if attributes.has_value(name) {
                continue;
            }
            let computed = default.evaluate(scope);
            if !computed.is_null() {
                attributes.insert(name.as_str(), computed);
            }
        }
    }

    /// A fresh persisted record for `entity`: its raw attributes, the scope
    /// attributes, every localized attribute's locale map and the owner-side
    /// association keys.
    pub fn serialize(&self, entity: &Entity, scope: &Scope) -> Record {
        let mut record = entity.attributes().clone();
        scope.apply(&mut record);
        for name in &self.localized_attributes {
            if let Some(value) = entity.localized(name).filter(|v| !v.is_empty()) {
                value.serialize(&mut record, name);
            }
        }
        for association in entity.associations() {
            association.serialize(&mut record);
        }
        record
    }
}

/// Id carried by a raw reference: a bare id or a map holding `_id`/`id`.
fn id_of(value: &Value) -> Option<EntryId> {
    match value {
        Value::Object(map) => map
            .get("_id")
            .or_else(|| map.get("id"))
            .and_then(EntryId::from_value),
        other => EntryId::from_value(other),
    }
}

/// Keep the label field and `_label` in sync, then derive missing slugs.
///
/// A `_label` given by the record fills label-field locales that are
/// missing; the entity's `_label` then mirrors the label field. Every site
/// locale with a label and no slug gets the slugified label.
fn derive_label_and_slug(
    label_field: &str,
    attributes: &mut Record,
    localized: &mut BTreeMap<String, LocalizedValue>,
    scope: &Scope,
) {
    let given = localized.remove("_label").unwrap_or_else(|| LocalizedValue::new("_label"));

    let label = match localized.get_mut(label_field) {
        Some(field) => {
            for (locale, value) in given.translations() {
                if field.read(locale.as_str()).is_none() && !value.is_null() {
                    field.write(locale.clone(), value.clone());
                }
            }
            field.renamed("_label")
        }
        None => {
            if !attributes.has_value(label_field) {
                if let Some(value) = given.read(scope.default_locale.as_str()) {
                    attributes.insert(label_field, value.clone());
                }
            }
            let mut label = LocalizedValue::new("_label");
            if let Some(value) = attributes.get(label_field).filter(|v| !v.is_null()) {
                label.write(scope.default_locale.clone(), value.clone());
            }
            label
        }
    };

    let slug = localized.entry("_slug".to_string()).or_insert_with(|| LocalizedValue::new("_slug"));
    for locale in &scope.locales {
        if slug.read(locale.as_str()).is_some() {
            continue;
        }
        if let Some(text) = label.read_str(locale.as_str()) {
            slug.write(locale.clone(), slugify(text));
        }
    }
    localized.insert("_label".to_string(), label);
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Content-type mappers, built once per content type id.
#[derive(Default)]
pub struct MapperRegistry {
    mappers: RwLock<HashMap<EntryId, Arc<Mapper>>>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_content_type(
        &self,
        content_type: &Arc<ContentType>,
        source: &dyn ContentTypeSource,
    ) -> ContentResult<Arc<Mapper>> {
        if let Some(mapper) = self.mappers.read().expect("lock poisoned").get(&content_type.id) {
            return Ok(Arc::clone(mapper));
        }
        let mapper = Arc::new(Mapper::for_content_type(Arc::clone(content_type), source)?);
        let mut mappers = self.mappers.write().expect("lock poisoned");
        Ok(Arc::clone(mappers.entry(content_type.id.clone()).or_insert(mapper)))
    }

    pub fn len(&self) -> usize {
        self.mappers.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every mapper, for instance after content types changed.
    pub fn clear(&self) {
        self.mappers.write().expect("lock poisoned").clear();
    }
}

impl fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperRegistry").field("mappers", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_type::{ContentTypeRegistry, Field};
    use crate::error::ContentError;
    use crate::fixtures::{self, record};
    use proptest::prelude::*;
    use quire_types::json;

    fn en() -> Locale {
        Locale::from("en")
    }

    // -----------------------------------------------------------------------
    // Builder
    // -----------------------------------------------------------------------

    #[test]
    fn missing_target_is_a_configuration_error() {
        let err = Mapper::builder("post")
            .belongs_to("author", None, AssociationOptions::default())
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingTarget { ref association, .. } if association == "author"
        ));
    }

    #[test]
    fn duplicate_and_mismatched_associations_are_rejected() {
        let authors = Arc::new(fixtures::authors_type());
        let err = Mapper::builder("post")
            .belongs_to("author", Some(Arc::clone(&authors)), AssociationOptions::default())
            .belongs_to("author", Some(Arc::clone(&authors)), AssociationOptions::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateAssociation { .. }));

        let err = Mapper::builder("post")
            .association(
                AssociationKind::Embedded,
                "author",
                Some(AssociationTarget::ContentType(authors)),
                AssociationOptions::default(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TargetMismatch { kind: AssociationKind::Embedded, .. }));
    }

    #[test]
    fn has_many_needs_an_inverse() {
        let err = Mapper::builder("author")
            .has_many(
                "articles",
                Some(Arc::new(fixtures::articles_type())),
                AssociationOptions::default(),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingInverse { .. }));
    }

    #[test]
    fn derived_foreign_keys() {
        let tags = Arc::new(fixtures::tags_type());
        let mapper = Mapper::builder("post")
            .belongs_to("author", Some(Arc::clone(&tags)), AssociationOptions::default())
            .many_to_many("categories", Some(Arc::clone(&tags)), AssociationOptions::default())
            .has_many(
                "comments",
                Some(tags),
                AssociationOptions {
                    inverse_of: Some("post".to_string()),
                    ..AssociationOptions::default()
                },
            )
            .build()
            .unwrap();
        let keys: Vec<_> = mapper.associations().iter().map(|a| a.foreign_key.as_str()).collect();
        assert_eq!(keys, vec!["author_id", "category_ids", "post_id"]);
    }

    #[test]
    fn unknown_target_content_type() {
        let registry = ContentTypeRegistry::new().with(fixtures::articles_type());
        let err =
            Mapper::for_content_type(Arc::new(fixtures::articles_type()), &registry).unwrap_err();
        assert!(matches!(
            err,
            ContentError::Config(ConfigError::UnknownTarget { ref association, .. })
                if association == "author"
        ));
    }

    #[test]
    fn content_entry_declarations() {
        let registry = fixtures::registry_with(fixtures::articles_type());
        let mapper =
            Mapper::for_content_type(Arc::new(fixtures::articles_type()), registry.as_ref())
                .unwrap();
        let localized =
            ["title", "body", "category_id", "_slug", "_label", "seo_title", "meta_keywords"];
        for name in localized {
            assert!(mapper.is_localized(name), "{name} should be localized");
        }
        assert!(!mapper.is_localized("published_on"));
        let defaults: Vec<_> =
            mapper.default_attributes().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(defaults, vec!["_visible", "content_type_id", "site_id", "featured"]);
        assert_eq!(mapper.associations().len(), 2);
    }

    // -----------------------------------------------------------------------
    // Deserialize
    // -----------------------------------------------------------------------

    #[test]
    fn localized_attributes_are_always_wrapped() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let identity = IdentityMap::new();
        let entity = articles
            .mapper()
            .to_entity(
                &repository,
                &identity,
                record(json!({ "_id": 9, "title": "Plain", "body": null })),
            )
            .unwrap();

        assert!(entity.get("title").is_none());
        assert_eq!(entity.localized("title").unwrap().read_str("en"), Some("Plain"));
        assert!(entity.localized("body").unwrap().is_empty());
        assert!(entity.localized("seo_title").is_some());
    }

    #[test]
    fn label_fills_missing_default_locale_and_slugs_follow() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let entity = articles
            .mapper()
            .to_entity(
                &repository,
                &IdentityMap::new(),
                record(json!({
                    "_id": "update",
                    "title": { "fr": "Mise a jour #1" },
                    "_label": "Update #1"
                })),
            )
            .unwrap();

        let title = entity.localized("title").unwrap();
        assert_eq!(title.read_str("en"), Some("Update #1"));
        assert_eq!(title.read_str("fr"), Some("Mise a jour #1"));
        assert_eq!(entity.localized("_label").unwrap().translations(), title.translations());
        assert_eq!(entity.slug(&en()), Some("update-number-1"));
        assert_eq!(entity.slug(&Locale::from("fr")), Some("mise-a-jour-number-1"));
    }

    #[test]
    fn stored_slugs_are_kept() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let entity = articles
            .mapper()
            .to_entity(
                &repository,
                &IdentityMap::new(),
                record(json!({
                    "_id": 1, "title": { "en": "Hello" }, "_slug": { "en": "custom" }
                })),
            )
            .unwrap();
        assert_eq!(entity.slug(&en()), Some("custom"));
        assert_eq!(entity.label(&en()), Some("Hello"));
    }

    #[test]
    fn defaults_fill_gaps_only() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let identity = IdentityMap::new();
        let mapper = articles.mapper();

        let bare = mapper.to_entity(&repository, &identity, record(json!({ "_id": 1 }))).unwrap();
        assert_eq!(bare.get("_visible"), Some(&json!(true)));
        assert_eq!(bare.get("featured"), Some(&json!(false)));
        assert_eq!(bare.get("content_type_id"), Some(&json!(1)));
        // no site in scope
        assert!(bare.get("site_id").is_none());

        let given = mapper
            .to_entity(
                &repository,
                &identity,
                record(json!({ "_id": 2, "_visible": false, "featured": true })),
            )
            .unwrap();
        assert_eq!(given.get("_visible"), Some(&json!(false)));
        assert_eq!(given.get("featured"), Some(&json!(true)));
    }

    #[test]
    fn computed_defaults_read_the_scope() {
        let repository = ContentEntryRepository::new(
            fixtures::adapter(),
            fixtures::registry_with(fixtures::articles_type()),
            fixtures::scope().with_site(5),
        );
        let articles = fixtures::scoped(&repository, "articles");
        let entity = articles.build(record(json!({ "title": "New" }))).unwrap();
        assert_eq!(entity.get("site_id"), Some(&json!(5)));
        assert_eq!(articles.serialize(&entity).get("site_id"), Some(&json!(5)));
    }

    #[test]
    fn base_url_depends_on_locale() {
        let repository = fixtures::repository();
        let identity = IdentityMap::new();
        let hello = fixtures::scoped(&repository, "articles")
            .find(&identity, &EntryId::from("hello-world"))
            .unwrap()
            .unwrap();
        assert_eq!(hello.base_url(), Some("/articles"));
        assert_eq!(hello.url(&en()).as_deref(), Some("/articles/hello-world"));

        let french = repository.with_locale("fr");
        let bonjour = fixtures::scoped(&french, "articles")
            .find(&IdentityMap::new(), &EntryId::from("hello-world"))
            .unwrap()
            .unwrap();
        assert_eq!(bonjour.base_url(), Some("/fr/articles"));
        assert_eq!(bonjour.url(&Locale::from("fr")).as_deref(), Some("/fr/articles/bonjour-monde"));
    }

    // -----------------------------------------------------------------------
    // Identity
    // -----------------------------------------------------------------------

    #[test]
    fn first_materialization_wins() {
        let repository = fixtures::repository();
        let mapper = fixtures::scoped(&repository, "articles").mapper().clone();
        let identity = IdentityMap::new();

        let first = mapper
            .to_entity(&repository, &identity, record(json!({ "_id": 7, "title": "First" })))
            .unwrap();
        let second = mapper
            .to_entity(&repository, &identity, record(json!({ "_id": 7, "title": "Second" })))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.label(&en()), Some("First"));
        assert_eq!(identity.len(), 1);

        identity.reset();
        let fresh = mapper
            .to_entity(&repository, &identity, record(json!({ "_id": 7, "title": "Second" })))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert_eq!(fresh.label(&en()), Some("Second"));
    }

    #[test]
    fn transient_entities_are_kept_anonymously() {
        let repository = fixtures::repository();
        let mapper = fixtures::scoped(&repository, "articles").mapper().clone();
        let identity = IdentityMap::new();
        let a = mapper.to_entity(&repository, &identity, record(json!({ "title": "A" }))).unwrap();
        let b = mapper.to_entity(&repository, &identity, record(json!({ "title": "A" }))).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(identity.len(), 0);
        assert!(!identity.is_empty());
    }

    // -----------------------------------------------------------------------
    // Serialize
    // -----------------------------------------------------------------------

    #[test]
    fn serialize_writes_locale_maps_and_keys() {
        let repository = fixtures::repository();
        let articles = fixtures::scoped(&repository, "articles");
        let identity = IdentityMap::new();
        let hello = articles.find(&identity, &EntryId::from("hello-world")).unwrap().unwrap();

        let out = articles.serialize(&hello);
        assert_eq!(out.get("title"), Some(&json!({ "en": "Hello world", "fr": "Bonjour monde" })));
        assert_eq!(out.get("category_id"), Some(&json!({ "en": 0 })));
        assert_eq!(out.get("author_id"), Some(&json!("jane")));
        assert_eq!(out.get("tag_ids"), Some(&json!(["rust", "cms"])));
        assert_eq!(out.get("_id"), Some(&json!("hello-world")));
        assert!(!out.contains_key("body"));
    }

    #[test]
    fn embedded_values_use_the_target_mapper() {
        let address = Arc::new(
            Mapper::builder("address")
                .localized_attributes(["city"])
                .build()
                .unwrap(),
        );
        let person = Mapper::builder("person").embedded("addresses", address).build().unwrap();
        let repository = fixtures::repository();
        let identity = IdentityMap::new();

        let raw = json!([
            { "street": "Main", "city": { "en": "Paris" } },
            { "street": "Side", "city": "Lyon" }
        ]);
        let entity = person
            .to_entity(
                &repository,
                &identity,
                record(json!({ "_id": 1, "addresses": raw.clone() })),
            )
            .unwrap();

        let embedded = entity.embedded("addresses").unwrap();
        assert!(embedded.is_many());
        let addresses = embedded.resolve().unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(addresses[0].localized("city").unwrap().read_str("en"), Some("Paris"));
        assert_eq!(addresses[1].localized("city").unwrap().read_str("en"), Some("Lyon"));
        assert!(Arc::ptr_eq(&addresses[0], &embedded.resolve().unwrap()[0]));
        // embedded entities stay out of the identity map
        assert_eq!(identity.len(), 1);

        let out = person.serialize(&entity, repository.scope());
        assert_eq!(out.get("addresses"), Some(&raw));
    }

    proptest! {
        #[test]
        fn localized_attribute_round_trips(
            titles in prop::collection::btree_map("[a-z]{2}", "[A-Za-z ]{1,12}", 1..4)
        ) {
            let map: quire_types::Map<String, Value> = titles
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
            let repository = fixtures::repository();
            let articles = fixtures::scoped(&repository, "articles");
            let entity = articles
                .mapper()
                .to_entity(
                    &repository,
                    &IdentityMap::new(),
                    record(json!({ "_id": "p", "body": Value::Object(map.clone()) })),
                )
                .unwrap();

            let out = articles.serialize(&entity);
            prop_assert_eq!(out.get("body"), Some(&Value::Object(map)));
        }
    }

    #[test]
    fn field_defaults_of_localized_fields() {
        let articles = fixtures::articles_type()
            .with_field(Field::new("subtitle", FieldKind::String).localized().with_default("-"));
        let repository = fixtures::repository_over(fixtures::adapter(), articles);
        let scoped = fixtures::scoped(&repository, "articles");
        let entity = scoped.build(record(json!({ "title": "T" }))).unwrap();
        assert_eq!(entity.localized("subtitle").unwrap().read_str("en"), Some("-"));
    }

    #[test]
    fn has_many_uses_the_persisted_name_of_the_inverse_field() {
        let mut articles = fixtures::articles_type();
        for field in &mut articles.fields {
            if field.name == "author" {
                field.persisted_name = Some("writer_ref".to_string());
            }
        }
        let entries = fixtures::entries()
            .into_iter()
            .map(|mut entry| {
                if let Some(author) = entry.remove("author_id") {
                    entry.insert("writer_ref", author);
                }
                entry
            })
            .collect();
        let adapter = std::sync::Arc::new(
            quire_store::InMemoryAdapter::new().with_collection("content_entries", entries),
        );
        let repository = fixtures::repository_over(adapter, articles);
        let authors = fixtures::scoped(&repository, "authors");
        let identity = IdentityMap::new();
        let jane = authors.find(&identity, &EntryId::from("jane")).unwrap().unwrap();

        let articles = jane.has_many("articles").unwrap();
        assert!(articles.repository().local_conditions().contains_key("writer_ref"));
        assert!(!articles.repository().local_conditions().contains_key("author_id"));
        let written = articles.resolve(&identity).unwrap();
        assert_eq!(
            fixtures::ids(&written),
            vec![EntryId::from("lorem-ipsum"), EntryId::from("hello-world")]
        );
    }
}
