//! # canopy-checkpoint — durable progress for interrupted explorations
//!
//! A canopy run periodically snapshots its global [`Progress`] together with
//! its exact accumulated compute time into a single-record checkpoint file.
//! If the process dies, the next run loads the record and resumes from the
//! stored checkpoint instead of from scratch; when a run completes, the file
//! is deleted.
//!
//! This crate provides the pieces of that flow:
//!
//! - [`RunCheckpoint`] — the persisted record: progress plus an exact
//!   rational count of compute seconds;
//! - [`ProgressStore`] — the async storage trait;
//! - [`FileProgressStore`] — atomic write-then-rename file persistence;
//! - [`InMemoryProgressStore`] — reference implementation for tests;
//! - [`SerializerProtocol`] — pluggable codec (bincode by default, JSON for
//!   debugging).
//!
//! ## Example
//!
//! ```rust,no_run
//! use canopy_checkpoint::{FileProgressStore, ProgressStore, RunCheckpoint};
//! use canopy_core::Progress;
//! use num_rational::Ratio;
//!
//! # async fn example() -> canopy_checkpoint::Result<()> {
//! let store = FileProgressStore::new("run.checkpoint");
//! let resumed: Option<RunCheckpoint<u64>> = store.load().await?;
//! let mut record = resumed
//!     .unwrap_or_else(|| RunCheckpoint::new(Progress::empty(0u64), Ratio::new(0, 1)));
//! // ... explore, fold progress into the record ...
//! store.save(&record).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Progress`]: canopy_core::Progress

pub mod error;
pub mod file;
pub mod memory;
pub mod record;
pub mod serializer;
pub mod traits;

pub use error::{Result, StoreError};
pub use file::FileProgressStore;
pub use memory::InMemoryProgressStore;
pub use record::{ratio_from_duration, RunCheckpoint};
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::ProgressStore;
