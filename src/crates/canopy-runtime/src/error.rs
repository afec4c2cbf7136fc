//! Error types for the supervisor and the run drivers
//!
//! Supervisor errors are contract violations: callers invoking operations
//! whose preconditions do not hold, or internal invariants found broken. They
//! are all fatal to the run — the supervisor state machine is not built to
//! limp on after its bookkeeping has been contradicted.

use canopy_core::{Checkpoint, CheckpointError};
use thiserror::Error;

/// Result type for supervisor operations
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;

/// Contract and invariant violations inside the supervisor
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// `add_worker` for an id that is already registered
    #[error("worker {0} is already known")]
    WorkerAlreadyKnown(String),

    /// An operation referenced an unregistered worker id
    #[error("worker {0} is not known")]
    WorkerNotKnown(String),

    /// An operation required the worker to hold a workload (or an
    /// outstanding request) and it does not
    #[error("worker {0} is not active")]
    WorkerNotActive(String),

    /// A workload was sent to a worker that already holds one
    #[error("worker {0} already has a workload")]
    WorkerAlreadyHasWorkload(String),

    /// Workers are waiting, nothing is queued, and there is nobody left to
    /// steal from
    #[error("waiting workers exist but there is no source of new workloads")]
    OutOfWorkloadSources,

    /// The global checkpoint covers the whole tree yet workloads are still
    /// queued
    #[error("search space fully explored but workloads remain queued")]
    WorkloadsRemainAfterFullExploration,

    /// The global checkpoint covers the whole tree yet other workers still
    /// hold workloads
    #[error("search space fully explored but workers remain active")]
    WorkersRemainActiveAfterFullExploration,

    /// The global checkpoint covers the whole tree but the exploration mode
    /// did not declare the run complete
    #[error("search space fully explored but the search did not terminate")]
    FullyExploredWithoutTermination,

    /// Two outstanding workloads delimit the same sub-tree
    #[error("conflicting workloads delimit the same sub-tree at path depth {0}")]
    ConflictingWorkloads(usize),

    /// Workspace validation found regions covered by neither the global
    /// progress nor any outstanding workload
    #[error("workspace validation found unaccounted regions")]
    IncompleteWorkspace(Box<Checkpoint>),

    /// A progress fold failed because a reported checkpoint does not fit the
    /// global one
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Errors surfaced by run drivers such as the in-process adapter
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("progress store error: {0}")]
    Store(#[from] canopy_checkpoint::StoreError),

    #[error("worker event channel closed before the run terminated")]
    ChannelClosed,
}
