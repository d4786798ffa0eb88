//! Storage adapters for quire.
//!
//! An adapter supplies the raw [`Record`]s of a named collection. The
//! mapping layer never looks at how records are stored; it only describes
//! what it wants with a [`Query`] (conditions, ordering, paging, locale and
//! site scope) and receives plain attribute maps back.
//!
//! # Backends
//!
//! All backends implement the [`StorageAdapter`] trait:
//!
//! - [`InMemoryAdapter`] -- `HashMap`-based store for tests and embedding
//! - [`FilesystemAdapter`] -- JSON files on disk, parsed once and cached
//!
//! # Design Rules
//!
//! 1. Adapters only return data; they never build entities.
//! 2. Caching of raw collection reads is the adapter's business.
//! 3. All I/O and decoding errors are propagated, never silently ignored.
//! 4. A missing collection is empty, not an error.
//!
//! [`Record`]: quire_types::Record

pub mod error;
pub mod filesystem;
pub mod memory;
pub mod query;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use filesystem::FilesystemAdapter;
pub use memory::InMemoryAdapter;
pub use query::{compare_values, ConditionKey, Conditions, Direction, Operator, OrderBy, Query};
pub use traits::StorageAdapter;
