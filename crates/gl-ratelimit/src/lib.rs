//! Greenlight Rate Limit - admission control for the catalog service
//!
//! This crate provides the request admission layer:
//!
//! - **Token bucket**: lazily refilled, no background timer per bucket
//! - **Client registry**: one bucket per client key, sharded map, idle eviction
//! - **Admission gate**: global bucket first, then the per-client bucket
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gl_ratelimit::{AdmissionConfig, AdmissionGate, ClientLimiterRegistry};
//!
//! let config = AdmissionConfig::default();
//! let registry = Arc::new(ClientLimiterRegistry::new(config.client.clone())?);
//! let sweeper = registry.start_sweeper();
//! let gate = AdmissionGate::new(&config.global, Arc::clone(&registry));
//!
//! if gate.allow("203.0.113.7") {
//!     // handle request
//! }
//!
//! sweeper.stop().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod clock;
mod config;
mod gate;
mod registry;
mod token_bucket;

pub use clock::*;
pub use config::*;
pub use gate::*;
pub use registry::*;
pub use token_bucket::*;

use std::fmt;
use std::time::Duration;

/// Rate limiter state snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitState {
    /// Bucket capacity.
    pub limit: u32,

    /// Whole tokens currently available.
    pub remaining: u32,

    /// Time until the next whole token is available.
    pub reset_after: Duration,

    /// Whether the next request would be rejected.
    pub is_limited: bool,
}

/// Which tier of the admission gate rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// The shared bucket protecting aggregate capacity.
    Global,
    /// The bucket belonging to a single client key.
    Client,
}

impl LimitScope {
    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Client => "client",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate limit error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// Request would exceed a rate limit. Callers should retry later.
    #[error("{scope} rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// Tier that rejected the request.
        scope: LimitScope,
        /// Time to wait before retrying.
        retry_after: Duration,
    },

    /// Invalid configuration.
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

impl RateLimitError {
    /// Rejected scope, if this is a rate limit rejection.
    #[must_use]
    pub const fn scope(&self) -> Option<LimitScope> {
        match self {
            Self::Exceeded { scope, .. } => Some(*scope),
            Self::InvalidConfig(_) => None,
        }
    }
}
