use quire_types::{EntryId, Record};

use crate::error::{StoreError, StoreResult};
use crate::query::Query;

/// Source of raw records, organised in named collections.
///
/// All implementations must satisfy these invariants:
/// - Records come back with string keys only.
/// - `query` returns records in the order described by the query, with
///   ties kept in storage order.
/// - Failures are returned, never swallowed; absence is an empty result.
pub trait StorageAdapter: Send + Sync {
    /// Every record of a collection, in storage order.
    ///
    /// Returns an empty list when the collection does not exist.
    fn collection(&self, name: &str) -> StoreResult<Vec<Record>>;

    /// Records of a collection matching a query.
    ///
    /// Default implementation filters, sorts and pages the full
    /// collection in memory. Backends with native querying may override.
    fn query(&self, name: &str, query: &Query) -> StoreResult<Vec<Record>> {
        Ok(query.apply(self.collection(name)?))
    }

    /// The first record matching a query.
    fn first(&self, name: &str, query: &Query) -> StoreResult<Option<Record>> {
        let query = query.clone().with_limit(1);
        Ok(self.query(name, &query)?.into_iter().next())
    }

    /// Number of records matching a query, ignoring its paging.
    fn count(&self, name: &str, query: &Query) -> StoreResult<usize> {
        let query = query.clone().unpaged();
        Ok(self.query(name, &query)?.len())
    }

    /// Write a record and return its identifier.
    ///
    /// Default implementation rejects writes.
    fn persist(&self, name: &str, record: Record) -> StoreResult<EntryId> {
        let _ = (name, record);
        Err(StoreError::ReadOnly)
    }
}
