//! Optimistic read-modify-write against a [`VersionedStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{RecordId, StoreError, StoreTransaction, UpdateError, Versioned, VersionedStore};

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Upper bound on one store transaction, whatever the caller's deadline.
    ///
    /// Default: 10s
    #[serde(with = "duration_secs")]
    pub store_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives the read, mutate, conditional-write cycle and classifies the result.
///
/// Never retries and never logs: every outcome is returned to the caller.
pub struct UpdateCoordinator<S> {
    store: Arc<S>,
    config: CoordinatorConfig,
}

impl<S: VersionedStore> UpdateCoordinator<S> {
    #[must_use]
    pub const fn new(store: Arc<S>, config: CoordinatorConfig) -> Self {
        Self { store, config }
    }

    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Apply `mutation` to record `id` in one store transaction.
    ///
    /// The transaction is bounded by the earlier of `deadline` and now plus
    /// the configured store timeout. A deadline already in the past fails
    /// before the store is touched. `mutation` must be a pure function of the
    /// current payload.
    ///
    /// # Errors
    /// - `NotFound` if the record does not exist; nothing is written
    /// - `Conflict` if another writer changed the record after it was read
    /// - `Store(Timeout)` if the deadline passed; the outcome is unknown,
    ///   except with a zero `after`, where nothing was attempted
    /// - `Store(_)` for any other store failure
    pub async fn apply<F>(
        &self,
        id: RecordId,
        deadline: Instant,
        mutation: F,
    ) -> Result<Versioned<S::Record>, UpdateError>
    where
        F: FnOnce(&S::Record) -> S::Record + Send,
    {
        let started = Instant::now();
        if deadline <= started {
            return Err(UpdateError::Store(StoreError::Timeout {
                after: Duration::ZERO,
            }));
        }
        let deadline = deadline.min(started + self.config.store_timeout);

        match tokio::time::timeout_at(deadline, self.read_modify_write(id, mutation)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UpdateError::Store(StoreError::Timeout {
                after: deadline.saturating_duration_since(started),
            })),
        }
    }

    /// [`apply`](Self::apply) with the configured store timeout as the only bound.
    ///
    /// # Errors
    /// Same as [`apply`](Self::apply).
    pub async fn apply_with_timeout<F>(
        &self,
        id: RecordId,
        mutation: F,
    ) -> Result<Versioned<S::Record>, UpdateError>
    where
        F: FnOnce(&S::Record) -> S::Record + Send,
    {
        let deadline = Instant::now() + self.config.store_timeout;
        self.apply(id, deadline, mutation).await
    }

    async fn read_modify_write<F>(
        &self,
        id: RecordId,
        mutation: F,
    ) -> Result<Versioned<S::Record>, UpdateError>
    where
        F: FnOnce(&S::Record) -> S::Record + Send,
    {
        let mut tx = self.store.begin().await?;

        let Some(current) = tx.read_for_update(id).await? else {
            tx.rollback().await?;
            return Err(UpdateError::NotFound(id));
        };

        let candidate = mutation(&current.payload);
        let rows = tx
            .conditional_write(id, current.version, candidate.clone())
            .await?;

        if rows == 0 {
            tx.rollback().await?;
            return Err(UpdateError::Conflict {
                id,
                expected_version: current.version,
            });
        }

        tx.commit().await?;
        Ok(current.successor(candidate))
    }
}

/// Run `attempt` until it succeeds, fails with something other than a
/// conflict, or `max_attempts` attempts have been made.
///
/// Each attempt is expected to re-read the record (as
/// [`UpdateCoordinator::apply`] does), so a retry reapplies the caller's
/// change on top of the winner's write.
///
/// # Errors
/// Returns the last attempt's error.
pub async fn retry_on_conflict<T, F, Fut>(max_attempts: u32, mut attempt: F) -> Result<T, UpdateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpdateError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut made = 0;
    loop {
        made += 1;
        match attempt().await {
            Err(err) if err.is_retryable() && made < max_attempts => {}
            outcome => return outcome,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
