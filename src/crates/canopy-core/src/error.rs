//! Error types for tree walks and checkpoint algebra
//!
//! Two error families live here: [`WalkError`] for anything that goes wrong
//! while driving a tree (replaying a path, stepping, decoding cached bytes),
//! and [`CheckpointError`] for structural violations in the checkpoint
//! algebra. Both implement `std::error::Error` via `thiserror`.

use crate::checkpoint::Checkpoint;
use thiserror::Error;

/// Convenience result type for tree walks
pub type WalkResult<T> = std::result::Result<T, WalkError>;

/// Errors raised while replaying or stepping a tree
///
/// These are fatal to the worker that hits them: a recorded path or
/// checkpoint no longer agrees with what the tree produces, which means the
/// user's tree is not deterministic (or the recording belongs to a different
/// tree altogether).
#[derive(Error, Debug)]
pub enum WalkError {
    /// A cached value produced by the present tree does not match the bytes
    /// recorded by a previous run, or a checkpoint node does not line up with
    /// the instruction found at the same position.
    #[error("recorded exploration is inconsistent with the present tree")]
    CacheMismatch,

    /// A path or cursor directed the walk below a node the tree does not
    /// have: the tree produced a leaf, a dead branch, or a rejecting cache
    /// where more structure was recorded.
    #[error("the tree ended before the recorded walk was complete")]
    TreeExhausted,

    /// Encoding or decoding a cached value failed.
    #[error("cached value codec error: {0}")]
    Codec(#[from] bincode::Error),
}

/// Errors raised by the checkpoint algebra
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Two checkpoints describe structurally different trees (mismatched
    /// node kinds, or cache points with different recorded bytes) and cannot
    /// be merged. Carries the two offending sub-checkpoints.
    #[error("checkpoints are structurally inconsistent")]
    Inconsistent {
        left: Box<Checkpoint>,
        right: Box<Checkpoint>,
    },
}
