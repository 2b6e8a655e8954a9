//! Profile store contract and the time-bounded gateway in front of it.

pub mod gateway;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::ProfileRecord;

pub use gateway::{EnsureOutcome, ProfileGateway};
pub use memory::MemoryProfileStore;

/// Failure reported by a profile store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreFault {
    /// Uniqueness constraint hit: the row already exists
    #[error("profile already exists")]
    Conflict,

    #[error("{0}")]
    Backend(String),
}

/// Durable profile storage (e.g. a `profiles` table).
///
/// Implementations report "not found" as `Ok(None)`, never as an error.
/// Calls are unbounded here; [`ProfileGateway`] applies the deadlines.
#[async_trait]
pub trait ProfileStore: Send + Sync + 'static {
    async fn fetch_profile(&self, id: String) -> Result<Option<ProfileRecord>, StoreFault>;

    /// Insert a new row. Fails with `StoreFault::Conflict` if the id exists.
    async fn insert_profile(&self, record: ProfileRecord) -> Result<(), StoreFault>;
}
