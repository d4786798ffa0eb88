//! A small blog used across the test modules: articles written by authors
//! and tagged with tags.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quire_store::{InMemoryAdapter, StorageAdapter, StoreResult};
use quire_types::{json, EntryId, Locale, Record, Value};

use crate::content_type::{ContentType, ContentTypeRegistry, Field, FieldKind, SelectOption};
use crate::entity::Entity;
use crate::mapper::Mapper;
use crate::repository::{ContentEntryRepository, ScopedRepository};
use crate::scope::Scope;

pub(crate) fn record(value: Value) -> Record {
    Record::from_value(value).unwrap()
}

pub(crate) fn articles_type() -> ContentType {
    ContentType::new(1, "articles")
        .with_name("Articles")
        .with_label_field("title")
        .with_field(Field::new("title", FieldKind::String).localized())
        .with_field(Field::new("body", FieldKind::Text).localized())
        .with_field(
            Field::new("category", FieldKind::Select).localized().with_options(vec![
                SelectOption::new(0, json!({ "en": "Cooking", "fr": "Cuisine" })).at(0),
                SelectOption::new(1, json!({ "en": "Wine", "fr": "Vin" })).at(1),
                SelectOption::new(2, json!({ "en": "Bread", "fr": "Pain" })).at(2),
            ]),
        )
        .with_field(Field::new("author", FieldKind::BelongsTo).with_target(2))
        .with_field(Field::new("tags", FieldKind::ManyToMany).with_target(3))
        .with_field(Field::new("published_on", FieldKind::Date))
        .with_field(Field::new("featured", FieldKind::Boolean).with_default(false))
}

pub(crate) fn authors_type() -> ContentType {
    ContentType::new(2, "authors")
        .with_label_field("name")
        .with_field(Field::new("name", FieldKind::String))
        .with_field(
            Field::new("articles", FieldKind::HasMany)
                .with_target(1)
                .with_inverse_of("author")
                .with_order_by("_position desc"),
        )
}

pub(crate) fn tags_type() -> ContentType {
    ContentType::new(3, "tags").with_field(Field::new("name", FieldKind::String))
}

pub(crate) fn registry_with(articles: ContentType) -> Arc<ContentTypeRegistry> {
    Arc::new(
        ContentTypeRegistry::new()
            .with(articles)
            .with(authors_type())
            .with(tags_type()),
    )
}

/// Four articles (one hidden, one with an unknown category and author),
/// two authors and two tags stored out of their tag order.
pub(crate) fn entries() -> Vec<Record> {
    vec![
        record(json!({
            "_id": "hello-world", "content_type_id": 1, "_position": 0, "_visible": true,
            "_slug": { "en": "hello-world", "fr": "bonjour-monde" },
            "title": { "en": "Hello world", "fr": "Bonjour monde" },
            "category_id": { "en": 0 }, "author_id": "jane", "tag_ids": ["rust", "cms"],
            "published_on": "2024-01-10"
        })),
        record(json!({
            "_id": "lorem-ipsum", "content_type_id": 1, "_position": 1, "_visible": true,
            "_slug": { "en": "lorem-ipsum" }, "title": { "en": "Lorem ipsum" },
            "category_id": { "en": 2 }, "author_id": "jane", "tag_ids": ["cms"],
            "published_on": "2024-02-01", "featured": true
        })),
        record(json!({
            "_id": "hidden-draft", "content_type_id": 1, "_position": 2, "_visible": false,
            "_slug": { "en": "hidden-draft" }, "title": { "en": "Hidden draft" },
            "category_id": { "en": 2 }, "author_id": "john"
        })),
        record(json!({
            "_id": "dolor-sit", "content_type_id": 1, "_position": 3, "_visible": true,
            "_slug": { "en": "dolor-sit" }, "title": { "en": "Dolor sit" },
            "category_id": { "en": 99 }, "author_id": "ghost", "published_on": "2024-03-05"
        })),
        record(json!({
            "_id": "jane", "content_type_id": 2, "_position": 0, "_visible": true,
            "_slug": { "en": "jane" }, "name": "Jane"
        })),
        record(json!({
            "_id": "john", "content_type_id": 2, "_position": 1, "_visible": true,
            "_slug": { "en": "john" }, "name": "John"
        })),
        record(json!({
            "_id": "cms", "content_type_id": 3, "_position": 0, "_visible": true, "name": "CMS"
        })),
        record(json!({
            "_id": "rust", "content_type_id": 3, "_position": 1, "_visible": true, "name": "Rust"
        })),
    ]
}

pub(crate) fn adapter() -> Arc<InMemoryAdapter> {
    Arc::new(InMemoryAdapter::new().with_collection("content_entries", entries()))
}

pub(crate) fn scope() -> Scope {
    Scope::new("en").with_locales(["en", "fr"])
}

pub(crate) fn repository_over(
    adapter: Arc<dyn StorageAdapter>,
    articles: ContentType,
) -> ContentEntryRepository {
    ContentEntryRepository::new(adapter, registry_with(articles), scope())
}

pub(crate) fn repository() -> ContentEntryRepository {
    repository_over(adapter(), articles_type())
}

pub(crate) fn scoped(repository: &ContentEntryRepository, slug: &str) -> ScopedRepository {
    repository.with_slug(slug).unwrap().unwrap()
}

/// A bare entity carrying only an id.
pub(crate) fn entity_with_id(id: i64) -> Arc<Entity> {
    let mapper = Mapper::builder("person").build().unwrap();
    mapper
        .build_entity(&repository(), record(json!({ "_id": id })), &Locale::from("en"))
        .unwrap()
}

pub(crate) fn ids(entities: &[Arc<Entity>]) -> Vec<EntryId> {
    entities.iter().filter_map(|e| e.id()).collect()
}

/// Counts collection reads of the wrapped adapter.
pub(crate) struct CountingAdapter {
    inner: InMemoryAdapter,
    calls: AtomicUsize,
}

impl CountingAdapter {
    pub(crate) fn new(inner: InMemoryAdapter) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StorageAdapter for CountingAdapter {
    fn collection(&self, name: &str) -> StoreResult<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.collection(name)
    }
}
