//! Versioned store interface.
//!
//! The service consumes persistence through these two traits. Implementations
//! must make `conditional_write` an atomic compare-and-set on the version, and
//! must keep a transaction's read and write isolated from other transactions
//! on the same record to the degree their engine allows.

use async_trait::async_trait;

use crate::{RecordId, StoreError, Versioned};

/// Versioned record store.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    /// Domain payload stored under each id.
    type Record: Clone + Send + Sync + 'static;

    /// Transaction handle returned by [`begin`](Self::begin).
    type Transaction: StoreTransaction<Record = Self::Record>;

    /// Open a transaction.
    ///
    /// # Errors
    /// Returns a `StoreError` if the backend cannot start one.
    async fn begin(&self) -> Result<Self::Transaction, StoreError>;

    /// Read a record outside any transaction.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<Self::Record>>, StoreError>;

    /// Store a new record at version 1 under a freshly assigned id.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn insert(&self, payload: Self::Record) -> Result<Versioned<Self::Record>, StoreError>;

    /// Delete a record. Returns `false` if it did not exist.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn delete(&self, id: RecordId) -> Result<bool, StoreError>;

    /// All records in id order.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn scan(&self) -> Result<Vec<Versioned<Self::Record>>, StoreError>;
}

/// One store transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it back.
#[async_trait]
pub trait StoreTransaction: Send {
    type Record: Send + Sync + 'static;

    /// Read the current record and version, or `None` if absent.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn read_for_update(
        &mut self,
        id: RecordId,
    ) -> Result<Option<Versioned<Self::Record>>, StoreError>;

    /// Replace the payload and set `version = expected_version + 1`, but only if
    /// the stored version still equals `expected_version`.
    ///
    /// Returns the number of rows affected: `0` means the version moved on.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn conditional_write(
        &mut self,
        id: RecordId,
        expected_version: u64,
        payload: Self::Record,
    ) -> Result<u64, StoreError>;

    /// Make this transaction's writes durable.
    ///
    /// # Errors
    /// Returns a `StoreError` if the commit fails; the writes are then undone.
    async fn commit(self) -> Result<(), StoreError>;

    /// Undo this transaction's writes.
    ///
    /// # Errors
    /// Returns a `StoreError` on backend failure.
    async fn rollback(self) -> Result<(), StoreError>;
}
