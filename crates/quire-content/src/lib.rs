//! Entity mapping and repository layer for quire.
//!
//! Content is persisted as schema-less attribute records by a
//! [`StorageAdapter`]. This crate turns those records into typed,
//! localized [`Entity`] values with lazily resolved associations, and
//! answers the queries a template layer needs (`all`, `by_slug`,
//! `next`/`previous`, grouping by select option, existence checks).
//!
//! # Flow
//!
//! 1. A [`ContentEntryRepository`] binds an adapter, a content-type source
//!    and a [`Scope`] (site, active locale, site locales).
//! 2. [`ContentEntryRepository::with`] scopes it to one [`ContentType`],
//!    producing a [`ScopedRepository`].
//! 3. Queries translate [`Criteria`] into persisted [`Conditions`], read
//!    records from the adapter and materialize them through the content
//!    type's [`Mapper`].
//! 4. Every materialized entity is registered in the caller's
//!    [`IdentityMap`], so one traversal never holds two entities for the
//!    same id. Reset the map between unrelated requests.
//!
//! [`StorageAdapter`]: quire_store::StorageAdapter
//! [`Conditions`]: quire_store::Conditions

pub mod association;
pub mod conditions;
pub mod config;
pub mod content_type;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod identity;
pub mod localized;
pub mod mapper;
pub mod repository;
pub mod scope;

#[cfg(test)]
pub(crate) mod fixtures;

pub use association::{
    Association, AssociationKind, BelongsToAssociation, EmbeddedAssociation, HasManyAssociation,
    ManyToManyAssociation, Resolved,
};
pub use config::{RepositoryConfig, SiteConfig};
pub use content_type::{
    AdapterContentTypes, ContentType, ContentTypeRegistry, ContentTypeSource, Field, FieldKind,
    SelectOption,
};
pub use criteria::{Criteria, Criterion};
pub use entity::{Attribute, Entity};
pub use error::{ConfigError, ContentError, ContentResult};
pub use identity::{EntityKey, IdentityMap};
pub use localized::LocalizedValue;
pub use mapper::{
    AssociationOptions, AssociationSpec, AssociationTarget, DefaultValue, Mapper, MapperBuilder,
    MapperRegistry,
};
pub use repository::{ContentEntryRepository, FieldValue, ScopedRepository, SelectOptionGroup};
pub use scope::Scope;
