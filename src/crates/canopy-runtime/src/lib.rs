//! # canopy-runtime — parallel exploration of canopy search trees
//!
//! This crate turns the single-step engine of `canopy-core` into a parallel
//! run: a serialized [`Supervisor`] owns the global progress and the
//! scheduling decisions, worker actors drive the stepper over assigned
//! [`Workload`](canopy_core::Workload)s, and work moves between them by
//! stealing — converting a victim's parked right branch into a
//! self-contained workload another worker rebuilds by path replay.
//!
//! The pieces:
//!
//! - [`messages`] — the supervisor/worker wire protocol;
//! - [`worker`] — the sequential worker engine and its async shell;
//! - [`supervisor`] — the authoritative state machine, transport-agnostic
//!   behind the [`SupervisorController`] seam;
//! - [`statistics`] — run metadata (queue lengths, steal timings, occupation
//!   fractions);
//! - [`local`] — the in-process tokio adapter wiring it all together, with
//!   optional durable checkpointing through `canopy-checkpoint`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use canopy_core::{SumAll, Tree, TreeBuilder};
//! use canopy_runtime::local::{explore_locally, LocalOptions};
//! use canopy_runtime::supervisor::TerminationReason;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let builder: TreeBuilder<u64> = Arc::new(|| {
//!     Tree::choice(
//!         || Tree::choice(|| Tree::leaf(1), || Tree::leaf(2)),
//!         || Tree::choice(|| Tree::leaf(3), || Tree::leaf(4)),
//!     )
//! });
//! let outcome = explore_locally(
//!     Arc::new(SumAll::<u64>::new()),
//!     builder,
//!     LocalOptions::with_workers(4),
//! )
//! .await
//! .unwrap();
//! match outcome.reason {
//!     TerminationReason::Completed(total) => assert_eq!(total, 10),
//!     other => panic!("unexpected outcome: {other:?}"),
//! }
//! # }
//! ```

pub mod error;
pub mod local;
pub mod messages;
pub mod statistics;
pub mod supervisor;
pub mod worker;

pub use error::{RuntimeError, SupervisorError, SupervisorResult};
pub use local::{explore_locally, explore_locally_with_store, LocalOptions};
pub use messages::{ProgressUpdate, StolenWorkload, WorkerCommand, WorkerMessage};
pub use statistics::{MeasurementSummary, RunStatistics, TimeSeriesSummary};
pub use supervisor::{
    Supervisor, SupervisorController, SupervisorOutcome, TerminationReason, WorkerId,
};
pub use worker::{run_worker, WorkerExploration, POLL_INTERVAL};
