//! Versioned catalog records and optimistic concurrency control.
//!
//! # Overview
//!
//! - **Versioned Store**: the persistence contract the service consumes:
//!   transactional `read_for_update` plus an atomic `conditional_write`
//! - **Memory Store**: in-process implementation of that contract
//! - **Update Coordinator**: read, mutate, conditionally write, classify
//! - **Movie Domain**: catalog record, input validation, merge policy
//! - **Catalog Queries**: filtered, sorted, paginated listing
//!
//! # Design Principles
//!
//! 1. **The store is the only arbiter**: no in-process lock is taken per
//!    record. A write lands only if the version read is still current, so of
//!    N callers racing from the same version exactly one succeeds.
//!
//! 2. **Conflicts are values**: a lost race is `UpdateError::Conflict`, never a
//!    string to be matched. The coordinator never retries on its own; callers
//!    decide, e.g. with [`retry_on_conflict`].
//!
//! 3. **Timeouts are ambiguous**: a store call cut off by its deadline is a
//!    `StoreError::Timeout`, not a conflict, and its effect is unknown.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod catalog;
mod coordinator;
mod error;
mod memory;
mod movie;
mod record;
mod store;

pub use catalog::{list, Filters, Metadata, Page, SortField, SortOrder, MAX_PAGE, MAX_PAGE_SIZE};
pub use coordinator::{retry_on_conflict, CoordinatorConfig, UpdateCoordinator};
pub use error::{CatalogError, StoreError, UpdateError, ValidationError};
pub use memory::{MemoryStore, MemoryTransaction};
pub use movie::{Movie, MovieUpdate, NewMovie, MIN_YEAR};
pub use record::{RecordId, Versioned};
pub use store::{StoreTransaction, VersionedStore};
