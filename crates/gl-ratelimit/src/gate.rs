//! Two-tier admission decision.

use std::sync::Arc;

use crate::{
    ClientLimiterRegistry, Clock, GlobalLimitConfig, LimitScope, MonotonicClock, RateLimitError,
    TokenBucket,
};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Admitted,
    RejectedGlobal,
    RejectedPerClient,
}

impl Decision {
    #[must_use]
    pub const fn is_admitted(self) -> bool {
        matches!(self, Self::Admitted)
    }

    /// Tier that rejected the request, if any.
    #[must_use]
    pub const fn scope(self) -> Option<LimitScope> {
        match self {
            Self::Admitted => None,
            Self::RejectedGlobal => Some(LimitScope::Global),
            Self::RejectedPerClient => Some(LimitScope::Client),
        }
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::RejectedGlobal => "rejected_global",
            Self::RejectedPerClient => "rejected_client",
        }
    }
}

/// Global bucket in front of the per-client registry.
///
/// The global bucket is consulted first; when it rejects, the client's bucket
/// is not touched. An admitted request costs exactly one token from each tier.
#[derive(Debug)]
pub struct AdmissionGate {
    global: TokenBucket,
    clients: Arc<ClientLimiterRegistry>,
}

impl AdmissionGate {
    /// Create a gate using the monotonic system clock for the global bucket.
    #[must_use]
    pub fn new(global: &GlobalLimitConfig, clients: Arc<ClientLimiterRegistry>) -> Self {
        Self::with_clock(global, clients, Arc::new(MonotonicClock))
    }

    #[must_use]
    pub fn with_clock(
        global: &GlobalLimitConfig,
        clients: Arc<ClientLimiterRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            global: TokenBucket::from_config(global, clock),
            clients,
        }
    }

    /// Decide whether a request from `client_key` may proceed.
    pub fn check(&self, client_key: &str) -> Decision {
        self.check_with_bucket(client_key).0
    }

    /// The decision plus the client bucket that was charged, if the global
    /// tier let the request through.
    fn check_with_bucket(&self, client_key: &str) -> (Decision, Option<Arc<TokenBucket>>) {
        if !self.global.allow() {
            return (Decision::RejectedGlobal, None);
        }
        let bucket = self.clients.get_or_create(client_key);
        let decision = if bucket.allow() {
            Decision::Admitted
        } else {
            Decision::RejectedPerClient
        };
        (decision, Some(bucket))
    }

    /// `true` if the request may proceed.
    pub fn allow(&self, client_key: &str) -> bool {
        self.check(client_key).is_admitted()
    }

    /// Like [`check`](Self::check), but rejections carry a retry hint.
    ///
    /// # Errors
    /// Returns `RateLimitError::Exceeded` naming the rejecting tier.
    pub fn admit(&self, client_key: &str) -> Result<(), RateLimitError> {
        match self.check_with_bucket(client_key) {
            (Decision::Admitted, _) => Ok(()),
            (Decision::RejectedPerClient, Some(bucket)) => Err(RateLimitError::Exceeded {
                scope: LimitScope::Client,
                retry_after: bucket.wait_time(),
            }),
            _ => Err(RateLimitError::Exceeded {
                scope: LimitScope::Global,
                retry_after: self.global.wait_time(),
            }),
        }
    }

    #[must_use]
    pub const fn global(&self) -> &TokenBucket {
        &self.global
    }

    #[must_use]
    pub const fn clients(&self) -> &Arc<ClientLimiterRegistry> {
        &self.clients
    }
}
