//! Extensible progress storage trait for custom backend implementations
//!
//! [`ProgressStore`] is the seam between the runtime and whatever holds the
//! checkpoint file: the bundled implementations are
//! [`FileProgressStore`](crate::file::FileProgressStore) (atomic single-file
//! persistence) and
//! [`InMemoryProgressStore`](crate::memory::InMemoryProgressStore) (tests).
//! Backends for databases or object stores implement the same three
//! operations.
//!
//! The runtime's contract with a store:
//!
//! * `save` replaces the record atomically — a crash mid-save must leave
//!   either the previous record or the new one, never a torn file;
//! * `load` returns `None` when no record exists (a fresh run);
//! * `clear` removes the record; called once when a run completes.
//!
//! Save failures are surfaced as errors but must be treated as retryable by
//! callers: an exploration never aborts because a checkpoint write failed.

use crate::error::Result;
use crate::record::RunCheckpoint;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage backend for the single [`RunCheckpoint`] record of a run.
#[async_trait]
pub trait ProgressStore<R>: Send + Sync
where
    R: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Atomically replace the stored record.
    async fn save(&self, record: &RunCheckpoint<R>) -> Result<()>;

    /// Load the stored record, or `None` when no run has been persisted.
    async fn load(&self) -> Result<Option<RunCheckpoint<R>>>;

    /// Remove the stored record. Removing an absent record is not an error.
    async fn clear(&self) -> Result<()>;
}
