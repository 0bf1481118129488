//! In-memory versioned store.
//!
//! Records live in an ordered map behind a read/write lock. A conditional
//! write compares and swaps the version under the write lock, which gives the
//! atomic conditional write the coordinator depends on.
//!
//! # Isolation
//!
//! Transactions run at read-uncommitted. A conditional write is visible to
//! every other reader and transaction as soon as it is made, before commit.
//! Rollback (or dropping an open transaction) restores a record only while it
//! still holds the version this transaction wrote. If another writer has
//! already built on the uncommitted write, the rollback leaves that record
//! alone and the rolled-back payload survives inside the later version.
//! [`UpdateCoordinator`](crate::UpdateCoordinator) never exposes this window,
//! because it commits in the same poll as its write.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use crate::{RecordId, StoreError, StoreTransaction, Versioned, VersionedStore};

struct Shared<T> {
    records: RwLock<BTreeMap<RecordId, Versioned<T>>>,
    next_id: AtomicI64,
    faults: Mutex<Faults>,
}

/// Injected misbehaviour, for exercising error paths.
#[derive(Debug, Default)]
struct Faults {
    fail_next_begin: Option<StoreError>,
    write_delay: Duration,
}

/// In-memory store implementation.
///
/// Suitable for testing and single-node deployments. Cloning yields another
/// handle to the same records.
pub struct MemoryStore<T> {
    inner: Arc<Shared<T>>,
}

impl<T> MemoryStore<T> {
    /// Create an empty store. The first inserted record gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                records: RwLock::new(BTreeMap::new()),
                next_id: AtomicI64::new(1),
                faults: Mutex::new(Faults::default()),
            }),
        }
    }

    /// Make the next `begin` fail with `error`.
    pub fn fail_next_begin(&self, error: StoreError) {
        self.inner.faults.lock().fail_next_begin = Some(error);
    }

    /// Delay every conditional write by `delay`, simulating slow store I/O.
    pub fn set_write_delay(&self, delay: Duration) {
        self.inner.faults.lock().write_delay = delay;
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.records.read().is_empty()
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<T> VersionedStore for MemoryStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Record = T;
    type Transaction = MemoryTransaction<T>;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        let injected = self.inner.faults.lock().fail_next_begin.take();
        if let Some(error) = injected {
            return Err(error);
        }

        Ok(MemoryTransaction {
            shared: Arc::clone(&self.inner),
            undo: Vec::new(),
            open: true,
        })
    }

    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>, StoreError> {
        Ok(self.inner.records.read().get(&id).cloned())
    }

    async fn insert(&self, payload: T) -> Result<Versioned<T>, StoreError> {
        let id = RecordId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let record = Versioned {
            id,
            version: 1,
            created_at: Utc::now(),
            payload,
        };
        self.inner.records.write().insert(id, record.clone());
        Ok(record)
    }

    async fn delete(&self, id: RecordId) -> Result<bool, StoreError> {
        Ok(self.inner.records.write().remove(&id).is_some())
    }

    async fn scan(&self) -> Result<Vec<Versioned<T>>, StoreError> {
        Ok(self.inner.records.read().values().cloned().collect())
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTransaction<T> {
    shared: Arc<Shared<T>>,
    /// Records as they were before each write made here, oldest first.
    undo: Vec<Versioned<T>>,
    open: bool,
}

impl<T> MemoryTransaction<T> {
    fn undo_writes(&mut self) {
        if self.undo.is_empty() {
            return;
        }
        let mut records = self.shared.records.write();
        while let Some(previous) = self.undo.pop() {
            if let Some(current) = records.get_mut(&previous.id) {
                // Leave it alone if a later writer already built on our write.
                if current.version == previous.version + 1 {
                    *current = previous;
                }
            }
        }
    }
}

impl<T> Drop for MemoryTransaction<T> {
    fn drop(&mut self) {
        if self.open {
            self.undo_writes();
        }
    }
}

#[async_trait]
impl<T> StoreTransaction for MemoryTransaction<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Record = T;

    async fn read_for_update(&mut self, id: RecordId) -> Result<Option<Versioned<T>>, StoreError> {
        Ok(self.shared.records.read().get(&id).cloned())
    }

    async fn conditional_write(
        &mut self,
        id: RecordId,
        expected_version: u64,
        payload: T,
    ) -> Result<u64, StoreError> {
        let delay = self.shared.faults.lock().write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let previous = {
            let mut records = self.shared.records.write();
            let Some(current) = records.get_mut(&id) else {
                return Ok(0);
            };
            if current.version != expected_version {
                return Ok(0);
            }
            let next = current.successor(payload);
            std::mem::replace(current, next)
        };

        self.undo.push(previous);
        Ok(1)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.open = false;
        self.undo.clear();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.undo_writes();
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore<String> {
        MemoryStore::new()
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_version_one() {
        let store = store();
        let a = store.insert("a".to_string()).await.unwrap();
        let b = store.insert("b".to_string()).await.unwrap();

        assert_eq!(a.id, RecordId::new(1));
        assert_eq!(b.id, RecordId::new(2));
        assert_eq!(a.version, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn get_not_found() {
        let store = store();
        assert!(store.get(RecordId::new(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = store();
        let rec = store.insert("x".to_string()).await.unwrap();
        assert!(store.delete(rec.id).await.unwrap());
        assert!(!store.delete(rec.id).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn conditional_write_matches_version() {
        let store = store();
        let rec = store.insert("v1".to_string()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.conditional_write(rec.id, 1, "v2".to_string()).await.unwrap(),
            1
        );
        assert_eq!(
            tx.conditional_write(rec.id, 1, "stale".to_string()).await.unwrap(),
            0
        );
        tx.commit().await.unwrap();

        let current = store.get(rec.id).await.unwrap().unwrap();
        assert_eq!(current.version, 2);
        assert_eq!(current.payload, "v2");
    }

    #[tokio::test]
    async fn conditional_write_on_missing_record_affects_nothing() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.conditional_write(RecordId::new(5), 1, "x".to_string())
                .await
                .unwrap(),
            0
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn rollback_restores_previous_version() {
        let store = store();
        let rec = store.insert("v1".to_string()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.conditional_write(rec.id, 1, "v2".to_string()).await.unwrap();
        tx.conditional_write(rec.id, 2, "v3".to_string()).await.unwrap();
        tx.rollback().await.unwrap();

        let current = store.get(rec.id).await.unwrap().unwrap();
        assert_eq!(current.version, 1);
        assert_eq!(current.payload, "v1");
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = store();
        let rec = store.insert("v1".to_string()).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.conditional_write(rec.id, 1, "v2".to_string()).await.unwrap();
        }

        assert_eq!(store.get(rec.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn uncommitted_write_is_visible_to_other_transactions() {
        let store = store();
        let rec = store.insert("v1".to_string()).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.conditional_write(rec.id, 1, "v2".to_string()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let seen = second.read_for_update(rec.id).await.unwrap().unwrap();
        assert_eq!(seen.version, 2);
        assert_eq!(seen.payload, "v2");

        second
            .conditional_write(rec.id, 2, "v3".to_string())
            .await
            .unwrap();
        second.commit().await.unwrap();

        // Too late to undo: the record has moved past the first write.
        first.rollback().await.unwrap();
        let current = store.get(rec.id).await.unwrap().unwrap();
        assert_eq!(current.version, 3);
        assert_eq!(current.payload, "v3");
    }

    #[tokio::test]
    async fn injected_begin_failure_fires_once() {
        let store = store();
        store.fail_next_begin(StoreError::Unavailable("connection refused".into()));

        assert!(matches!(
            store.begin().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.begin().await.is_ok());
    }
}
