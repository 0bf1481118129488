//! Error types for the catalog store.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use thiserror::Error;

use crate::RecordId;

/// Infrastructure failures reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The call did not finish before its deadline. Whether it took effect is
    /// unknown, unless `after` is zero: the deadline had already passed and
    /// the call was never started.
    #[error("store call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Outcome of a failed optimistic update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// Another writer moved the record past the version this update read.
    #[error("concurrent update: record {id} changed after version {expected_version}")]
    Conflict { id: RecordId, expected_version: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl UpdateError {
    /// `true` when re-reading and reapplying may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// `true` when the write may or may not have been applied.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Store(StoreError::Timeout { after }) if !after.is_zero())
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Store(StoreError::Timeout { .. }) => "timeout",
            Self::Store(_) => "store_error",
        }
    }
}

/// Field-level input validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed: {}", describe(.fields))]
pub struct ValidationError {
    pub fields: BTreeMap<&'static str, String>,
}

impl ValidationError {
    pub(crate) fn add(&mut self, field: &'static str, reason: impl Into<String>) {
        self.fields.entry(field).or_insert_with(|| reason.into());
    }

    pub(crate) fn into_result(self) -> Result<(), Self> {
        if self.fields.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn describe(fields: &BTreeMap<&'static str, String>) -> String {
    let mut out = String::new();
    for (i, (field, reason)) in fields.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{field} {reason}");
    }
    out
}

/// Errors for catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
