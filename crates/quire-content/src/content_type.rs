//! Content-type schema: the fields of one kind of content entry.

use std::sync::{Arc, RwLock};

use quire_store::{OrderBy, Query, StorageAdapter};
use quire_types::text::singularize;
use quire_types::{EntryId, Locale, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ContentError, ContentResult};

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Text,
    Email,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Select,
    BelongsTo,
    HasMany,
    ManyToMany,
    Tags,
    File,
    Json,
}

/// One option of a `select` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    #[serde(rename = "_id")]
    pub id: EntryId,
    /// A plain name or a locale map of names.
    pub name: Value,
    #[serde(default)]
    pub position: i64,
}

impl SelectOption {
    pub fn new(id: impl Into<EntryId>, name: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            position: 0,
        }
    }

    pub fn at(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    /// Display name in `locale`. Plain names read the same in every locale.
    pub fn name_in(&self, locale: &Locale) -> Option<&str> {
        match &self.name {
            Value::Object(names) => names.get(locale.as_str()).and_then(Value::as_str),
            other => other.as_str(),
        }
    }

    fn has_name(&self, name: &str) -> bool {
        match &self.name {
            Value::Object(names) => names.values().any(|n| n.as_str() == Some(name)),
            other => other.as_str() == Some(name),
        }
    }
}

/// One field of a content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default)]
    pub localized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<EntryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse_of: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub select_options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            localized: false,
            persisted_name: None,
            target_id: None,
            inverse_of: None,
            order_by: None,
            select_options: Vec::new(),
            default: None,
        }
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn with_target(mut self, target_id: impl Into<EntryId>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_inverse_of(mut self, inverse_of: impl Into<String>) -> Self {
        self.inverse_of = Some(inverse_of.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> Self {
        self.select_options = options;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_persisted_name(mut self, name: impl Into<String>) -> Self {
        self.persisted_name = Some(name.into());
        self
    }

    /// Key of this field in persisted records.
    pub fn persisted_name(&self) -> String {
        if let Some(name) = &self.persisted_name {
            return name.clone();
        }
        match self.kind {
            FieldKind::Select | FieldKind::BelongsTo => format!("{}_id", self.name),
            FieldKind::ManyToMany => format!("{}_ids", singularize(&self.name)),
            _ => self.name.clone(),
        }
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, FieldKind::BelongsTo | FieldKind::HasMany | FieldKind::ManyToMany)
    }

    /// Order of a has-many association's entries, when the field sets one.
    pub fn association_order(&self) -> Option<OrderBy> {
        self.order_by
            .as_deref()
            .map(OrderBy::parse_str)
            .filter(|order| !order.is_empty())
    }

    /// Find an option by id, else by its name in `locale`, else by its
    /// name in any locale.
    pub fn select_option(&self, value: &Value, locale: &Locale) -> Option<&SelectOption> {
        by_id_or_name(&self.select_options, value, locale)
    }
}

/// Option lookup shared by [`Field::select_option`] and callers holding an
/// option list from a [`ContentTypeSource`].
pub fn by_id_or_name<'a>(
    options: &'a [SelectOption],
    value: &Value,
    locale: &Locale,
) -> Option<&'a SelectOption> {
    if let Some(id) = EntryId::from_value(value) {
        if let Some(option) = options.iter().find(|o| o.id == id) {
            return Some(option);
        }
    }
    let name = value.as_str()?;
    options
        .iter()
        .find(|o| o.name_in(locale) == Some(name))
        .or_else(|| options.iter().find(|o| o.has_name(name)))
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentType {
    #[serde(rename = "_id")]
    pub id: EntryId,
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_field_name: Option<String>,
    /// `"title desc"` or `{"title": "desc"}`; entries sort by position
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl ContentType {
    pub fn new(id: impl Into<EntryId>, slug: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id: id.into(),
            name: slug.clone(),
            slug,
            label_field_name: None,
            order_by: None,
            fields: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_label_field(mut self, name: impl Into<String>) -> Self {
        self.label_field_name = Some(name.into());
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<Value>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declared order of entries, ascending position by default.
    pub fn order_by(&self) -> OrderBy {
        self.order_by
            .as_ref()
            .and_then(OrderBy::parse)
            .filter(|order| !order.is_empty())
            .unwrap_or_else(OrderBy::position)
    }

    /// Name of the field used as entry label: the declared one, else the
    /// first field.
    pub fn label_field_name(&self) -> Option<&str> {
        self.label_field_name
            .as_deref()
            .or_else(|| self.fields.first().map(|f| f.name.as_str()))
    }

    /// Persisted names of the localized fields.
    pub fn localized_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.localized)
            .map(Field::persisted_name)
            .collect()
    }

    fn fields_of(&self, kind: FieldKind) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.kind == kind)
    }

    pub fn selects(&self) -> impl Iterator<Item = &Field> {
        self.fields_of(FieldKind::Select)
    }

    pub fn belongs_to(&self) -> impl Iterator<Item = &Field> {
        self.fields_of(FieldKind::BelongsTo)
    }

    pub fn has_many(&self) -> impl Iterator<Item = &Field> {
        self.fields_of(FieldKind::HasMany)
    }

    pub fn many_to_many(&self) -> impl Iterator<Item = &Field> {
        self.fields_of(FieldKind::ManyToMany)
    }

    pub fn dates_and_date_times(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| matches!(f.kind, FieldKind::Date | FieldKind::DateTime))
    }

    pub fn association_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_association())
    }

    pub fn fields_with_default(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.default.is_some())
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where repositories look up content types.
pub trait ContentTypeSource: Send + Sync {
    fn find(&self, id: &EntryId) -> ContentResult<Option<Arc<ContentType>>>;

    fn by_slug(&self, slug: &str) -> ContentResult<Option<Arc<ContentType>>>;

    /// Every content type, in declaration order.
    fn all(&self) -> ContentResult<Vec<Arc<ContentType>>>;

    /// Options of a select field, ordered by position.
    fn select_options(
        &self,
        content_type: &ContentType,
        field: &str,
    ) -> ContentResult<Vec<SelectOption>> {
        let mut options = content_type
            .field(field)
            .map(|f| f.select_options.clone())
            .unwrap_or_default();
        options.sort_by_key(|o| o.position);
        Ok(options)
    }
}

/// Content types held in memory.
#[derive(Default)]
pub struct ContentTypeRegistry {
    types: RwLock<Vec<Arc<ContentType>>>,
}

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, content_type: ContentType) -> Self {
        self.register(content_type);
        self
    }

    /// Add a content type, replacing one with the same id.
    pub fn register(&self, content_type: ContentType) -> Arc<ContentType> {
        let content_type = Arc::new(content_type);
        let mut types = self.types.write().expect("lock poisoned");
        match types.iter_mut().find(|t| t.id == content_type.id) {
            Some(existing) => *existing = Arc::clone(&content_type),
            None => types.push(Arc::clone(&content_type)),
        }
        content_type
    }

    pub fn len(&self) -> usize {
        self.types.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<ContentType> for ContentTypeRegistry {
    fn from_iter<I: IntoIterator<Item = ContentType>>(iter: I) -> Self {
        let registry = Self::new();
        for content_type in iter {
            registry.register(content_type);
        }
        registry
    }
}

impl ContentTypeSource for ContentTypeRegistry {
    fn find(&self, id: &EntryId) -> ContentResult<Option<Arc<ContentType>>> {
        let types = self.types.read().expect("lock poisoned");
        Ok(types.iter().find(|t| &t.id == id).cloned())
    }

    fn by_slug(&self, slug: &str) -> ContentResult<Option<Arc<ContentType>>> {
        let types = self.types.read().expect("lock poisoned");
        Ok(types.iter().find(|t| t.slug == slug).cloned())
    }

    fn all(&self) -> ContentResult<Vec<Arc<ContentType>>> {
        Ok(self.types.read().expect("lock poisoned").clone())
    }
}

impl std::fmt::Debug for ContentTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types = self.types.read().expect("lock poisoned");
        let slugs: Vec<&str> = types.iter().map(|t| t.slug.as_str()).collect();
        f.debug_struct("ContentTypeRegistry").field("types", &slugs).finish()
    }
}

/// Content types read from a storage adapter collection and cached until
/// [`AdapterContentTypes::reload`].
pub struct AdapterContentTypes {
    adapter: Arc<dyn StorageAdapter>,
    collection: String,
    site_id: Option<EntryId>,
    cache: RwLock<Option<Arc<Vec<Arc<ContentType>>>>>,
}

impl AdapterContentTypes {
    pub fn new(adapter: Arc<dyn StorageAdapter>, collection: impl Into<String>) -> Self {
        Self {
            adapter,
            collection: collection.into(),
            site_id: None,
            cache: RwLock::new(None),
        }
    }

    /// Only load the content types of one site.
    pub fn for_site(mut self, site_id: Option<EntryId>) -> Self {
        self.site_id = site_id;
        self
    }

    pub fn reload(&self) {
        *self.cache.write().expect("lock poisoned") = None;
    }

    fn loaded(&self) -> ContentResult<Arc<Vec<Arc<ContentType>>>> {
        if let Some(types) = self.cache.read().expect("lock poisoned").as_ref() {
            return Ok(Arc::clone(types));
        }

        let query = Query::default().with_site(self.site_id.clone());
        let records = self.adapter.query(&self.collection, &query)?;
        let types = records
            .into_iter()
            .map(|record| {
                let id = record.id().map(|id| id.to_string()).unwrap_or_default();
                serde_json::from_value::<ContentType>(record.into_value())
                    .map(Arc::new)
                    .map_err(|e| ContentError::InvalidContentType {
                        id,
                        reason: e.to_string(),
                    })
            })
            .collect::<ContentResult<Vec<_>>>()?;
        debug!(collection = %self.collection, types = types.len(), "content types loaded");

        let types = Arc::new(types);
        *self.cache.write().expect("lock poisoned") = Some(Arc::clone(&types));
        Ok(types)
    }
}

impl ContentTypeSource for AdapterContentTypes {
    fn find(&self, id: &EntryId) -> ContentResult<Option<Arc<ContentType>>> {
        Ok(self.loaded()?.iter().find(|t| &t.id == id).cloned())
    }

    fn by_slug(&self, slug: &str) -> ContentResult<Option<Arc<ContentType>>> {
        Ok(self.loaded()?.iter().find(|t| t.slug == slug).cloned())
    }

    fn all(&self) -> ContentResult<Vec<Arc<ContentType>>> {
        Ok(self.loaded()?.as_ref().clone())
    }
}

impl std::fmt::Debug for AdapterContentTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaded = self.cache.read().expect("lock poisoned").is_some();
        f.debug_struct("AdapterContentTypes")
            .field("collection", &self.collection)
            .field("site_id", &self.site_id)
            .field("loaded", &loaded)
            .finish()
    }
}
