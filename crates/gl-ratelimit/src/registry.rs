//! Per-client token buckets with idle eviction.
//!
//! Buckets live in a sharded map keyed by client identity. Get-or-insert goes
//! through the map's entry API, and the eviction sweep goes through `retain`;
//! both hold the same shard lock, so a sweep can never race an insert into a
//! duplicate bucket for one key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::{ClientLimitConfig, Clock, MonotonicClock, RateLimitError, TokenBucket};

/// Registry entry for one client key.
#[derive(Debug)]
struct ClientEntry {
    bucket: Arc<TokenBucket>,
    last_seen: Instant,
}

/// Concurrency-safe map of client key to token bucket.
pub struct ClientLimiterRegistry {
    entries: DashMap<String, ClientEntry>,
    config: ClientLimitConfig,
    clock: Arc<dyn Clock>,
    created: AtomicU64,
    evicted: AtomicU64,
}

impl ClientLimiterRegistry {
    /// Create an empty registry using the monotonic system clock.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails [`ClientLimitConfig::validate`].
    pub fn new(config: ClientLimitConfig) -> Result<Self, RateLimitError> {
        Self::with_clock(config, Arc::new(MonotonicClock))
    }

    /// Create an empty registry reading time from `clock`.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `config` fails [`ClientLimitConfig::validate`].
    pub fn with_clock(
        config: ClientLimitConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        config.validate()?;
        Ok(Self {
            entries: DashMap::new(),
            config,
            clock,
            created: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ClientLimitConfig {
        &self.config
    }

    /// Return the bucket for `key`, creating it on first sight.
    ///
    /// Concurrent first lookups for the same key all receive the same bucket.
    /// Every call refreshes the entry's last-seen time.
    pub fn get_or_create(&self, key: &str) -> Arc<TokenBucket> {
        let now = self.clock.now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.last_seen = now;
            return Arc::clone(&entry.bucket);
        }

        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            ClientEntry {
                bucket: Arc::new(TokenBucket::with_clock(
                    self.config.rate_per_second,
                    self.config.burst,
                    Arc::clone(&self.clock),
                )),
                last_seen: now,
            }
        });
        entry.last_seen = now;
        Arc::clone(&entry.bucket)
    }

    /// Run one eviction pass.
    ///
    /// Removes entries whose idle time strictly exceeds the configured
    /// threshold and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout;
        let mut removed = 0_usize;

        self.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= idle_timeout;
            if !keep {
                removed += 1;
            }
            keep
        });

        self.evicted.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Total bucket instances ever created.
    #[must_use]
    pub fn created_total(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Total entries removed by sweeps.
    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// Spawn the periodic eviction task on the current tokio runtime.
    ///
    /// The task runs until [`SweeperHandle::stop`] is called or the handle is dropped.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let period = self.config.sweep_interval;
        let task = tokio::spawn(run_sweeper(registry, period, shutdown_rx));

        SweeperHandle {
            shutdown_tx,
            task: Some(task),
        }
    }
}

impl std::fmt::Debug for ClientLimiterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLimiterRegistry")
            .field("clients", &self.entries.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn run_sweeper(
    registry: Arc<ClientLimiterRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = registry.sweep();
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = registry.len(),
                        "evicted idle client limiters"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!("client limiter sweeper stopped");
}

/// Handle to a running eviction task.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    ///
    /// # Errors
    /// Returns the task's `JoinError` if the sweeper panicked.
    pub async fn stop(mut self) -> Result<(), JoinError> {
        let _ = self.shutdown_tx.send(true);
        match self.task.take() {
            Some(task) => task.await,
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;

    fn registry(idle_secs: u64) -> (ClientLimiterRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let config = ClientLimitConfig {
            rate_per_second: 1.0,
            burst: 2,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(idle_secs),
        };
        let registry =
            ClientLimiterRegistry::with_clock(config, Arc::clone(&clock) as Arc<dyn Clock>)
                .unwrap();
        (registry, clock)
    }

    #[test]
    fn rejects_zero_sweep_interval() {
        let config = ClientLimitConfig {
            sweep_interval: Duration::ZERO,
            ..ClientLimitConfig::default()
        };
        let err = ClientLimiterRegistry::new(config).unwrap_err();
        assert!(matches!(err, RateLimitError::InvalidConfig(msg) if msg.contains("sweep_interval")));
    }

    #[test]
    fn rejects_negative_rate() {
        let config = ClientLimitConfig {
            rate_per_second: -1.0,
            ..ClientLimitConfig::default()
        };
        assert!(ClientLimiterRegistry::new(config).is_err());
    }

    #[test]
    fn same_key_returns_same_bucket() {
        let (registry, _clock) = registry(900);
        let a = registry.get_or_create("10.0.0.1");
        let b = registry.get_or_create("10.0.0.1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.created_total(), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_buckets() {
        let (registry, _clock) = registry(900);
        let a = registry.get_or_create("10.0.0.1");
        let b = registry.get_or_create("10.0.0.2");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);

        assert!(a.allow());
        assert!(a.allow());
        assert!(!a.allow());
        assert!(b.allow());
    }

    #[test]
    fn sweep_removes_only_idle_entries() {
        let (registry, clock) = registry(900);
        registry.get_or_create("stale");
        clock.advance(Duration::from_secs(600));
        registry.get_or_create("fresh");
        clock.advance(Duration::from_secs(301));

        assert_eq!(registry.sweep(), 1);
        assert!(!registry.contains("stale"));
        assert!(registry.contains("fresh"));
        assert_eq!(registry.evicted_total(), 1);
    }

    #[test]
    fn entry_at_exact_threshold_survives() {
        let (registry, clock) = registry(900);
        registry.get_or_create("edge");
        clock.advance(Duration::from_secs(900));
        assert_eq!(registry.sweep(), 0);
        assert!(registry.contains("edge"));
    }

    #[test]
    fn evicted_key_gets_fresh_bucket() {
        let (registry, clock) = registry(10);
        let first = registry.get_or_create("client");
        while first.allow() {}

        clock.advance(Duration::from_secs(11));
        registry.sweep();

        let second = registry.get_or_create("client");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.remaining(), 2);
        assert_eq!(registry.created_total(), 2);
    }
}
