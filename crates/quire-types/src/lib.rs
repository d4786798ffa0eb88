//! Foundation types for quire.
//!
//! This crate provides the value types shared by the storage adapters and
//! the content mapping layer. Every other quire crate depends on
//! `quire-types`.
//!
//! # Key Types
//!
//! - [`EntryId`]: Opaque record identifier (integer or string)
//! - [`Locale`]: Locale code used to key translated values
//! - [`Record`]: Raw persisted attribute map with canonical string keys
//!
//! The [`text`] module holds the slug and inflection helpers used when
//! deriving persisted names and slugs.

pub mod error;
pub mod id;
pub mod locale;
pub mod record;
pub mod text;

pub use error::TypeError;
pub use id::EntryId;
pub use locale::Locale;
pub use record::{Record, ID_KEY};
pub use serde_json::{json, Map, Value};
