//! Materialized content entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use quire_types::{EntryId, Locale, Record, Value};

use crate::association::{
    Association, BelongsToAssociation, EmbeddedAssociation, HasManyAssociation,
    ManyToManyAssociation,
};
use crate::content_type::ContentType;
use crate::localized::LocalizedValue;

/// What an attribute name refers to on an entity.
#[derive(Clone, Copy, Debug)]
pub enum Attribute<'a> {
    Raw(&'a Value),
    Localized(&'a LocalizedValue),
    Association(&'a Association),
}

/// A typed view of one record.
///
/// Localized attributes are always held as [`LocalizedValue`]s and
/// associations as lazy proxies; everything else stays a raw value. Entities
/// are created by a [`Mapper`](crate::Mapper) and are immutable afterwards,
/// except for association targets changed through `assign`.
pub struct Entity {
    kind: String,
    attributes: Record,
    localized: BTreeMap<String, LocalizedValue>,
    associations: BTreeMap<String, Association>,
    content_type: Option<Arc<ContentType>>,
    base_url: Option<String>,
}

pub(crate) struct EntityParts {
    pub kind: String,
    pub attributes: Record,
    pub localized: BTreeMap<String, LocalizedValue>,
    pub associations: BTreeMap<String, Association>,
    pub content_type: Option<Arc<ContentType>>,
    pub base_url: Option<String>,
}

impl Entity {
    pub(crate) fn from_parts(parts: EntityParts) -> Self {
        Self {
            kind: parts.kind,
            attributes: parts.attributes,
            localized: parts.localized,
            associations: parts.associations,
            content_type: parts.content_type,
            base_url: parts.base_url,
        }
    }

    /// Kind of the mapper that built this entity.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// `None` until the entity is persisted.
    pub fn id(&self) -> Option<EntryId> {
        self.attributes.id()
    }

    pub fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    /// Look up an attribute by name. Associations shadow localized values,
    /// which shadow raw attributes.
    pub fn attribute(&self, name: &str) -> Option<Attribute<'_>> {
        if let Some(association) = self.associations.get(name) {
            return Some(Attribute::Association(association));
        }
        if let Some(value) = self.localized.get(name) {
            return Some(Attribute::Localized(value));
        }
        self.attributes.get(name).map(Attribute::Raw)
    }

    /// Raw (non-localized) attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn localized(&self, name: &str) -> Option<&LocalizedValue> {
        self.localized.get(name)
    }

    pub fn is_localized(&self, name: &str) -> bool {
        self.localized.contains_key(name)
    }

    /// Value of an attribute in `locale`: the translation for localized
    /// attributes, the raw value otherwise. Null reads as `None`.
    pub fn value_in(&self, name: &str, locale: &Locale) -> Option<&Value> {
        match self.localized.get(name) {
            Some(value) => value.read(locale.as_str()),
            None => self.attributes.get(name).filter(|v| !v.is_null()),
        }
    }

    pub fn localized_attributes(&self) -> impl Iterator<Item = &LocalizedValue> {
        self.localized.values()
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> impl Iterator<Item = &Association> {
        self.associations.values()
    }

    pub fn embedded(&self, name: &str) -> Option<&EmbeddedAssociation> {
        match self.associations.get(name) {
            Some(Association::Embedded(association)) => Some(association),
            _ => None,
        }
    }

    pub fn belongs_to(&self, name: &str) -> Option<&BelongsToAssociation> {
        match self.associations.get(name) {
            Some(Association::BelongsTo(association)) => Some(association),
            _ => None,
        }
    }

    pub fn has_many(&self, name: &str) -> Option<&HasManyAssociation> {
        match self.associations.get(name) {
            Some(Association::HasMany(association)) => Some(association),
            _ => None,
        }
    }

    pub fn many_to_many(&self, name: &str) -> Option<&ManyToManyAssociation> {
        match self.associations.get(name) {
            Some(Association::ManyToMany(association)) => Some(association),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<&Arc<ContentType>> {
        self.content_type.as_ref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn label(&self, locale: &Locale) -> Option<&str> {
        self.value_in("_label", locale).and_then(Value::as_str)
    }

    pub fn slug(&self, locale: &Locale) -> Option<&str> {
        self.value_in("_slug", locale).and_then(Value::as_str)
    }

    pub fn position(&self) -> Option<i64> {
        self.attributes.get("_position").and_then(Value::as_i64)
    }

    /// Entries without `_visible` are visible.
    pub fn is_visible(&self) -> bool {
        self.attributes
            .get("_visible")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    /// The raw attributes. Localized values live apart, see
    /// [`Entity::localized`].
    pub fn attributes(&self) -> &Record {
        &self.attributes
    }

    /// URL of this entry: the content type's base URL plus the slug in
    /// `locale`.
    pub fn url(&self, locale: &Locale) -> Option<String> {
        let base = self.base_url.as_deref()?;
        let slug = self.slug(locale)?;
        Some(format!("{}/{slug}", base.trim_end_matches('/')))
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind)
            .field("id", &self.id())
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("localized", &self.localized.keys().collect::<Vec<_>>())
            .field("associations", &self.associations.keys().collect::<Vec<_>>())
            .finish()
    }
}
