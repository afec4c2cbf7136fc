//! # canopy-core — lazy search trees and the exploration engine
//!
//! This crate is the synchronous heart of canopy: it defines the search-tree
//! program model, the checkpoint algebra that makes partially explored trees
//! durable and divisible, and the single-step interpreter everything else is
//! built on. It knows nothing about async runtimes, wire formats, or
//! schedulers — those live in `canopy-runtime` and `canopy-checkpoint`.
//!
//! ## The model
//!
//! A user describes a search space as a [`Tree`](tree::Tree): a lazy program
//! of `Leaf` / `Null` / `Choice` / `Cache` / `Yield` instructions. Exploring
//! it produces leaf values; a [`Checkpoint`](checkpoint::Checkpoint) records
//! which regions have been covered; a [`Workload`](workload::Workload)
//! (path + checkpoint) delimits the slice one worker is responsible for; a
//! [`Progress`](progress::Progress) pairs a checkpoint with the result
//! accumulated under an [`ExplorationMode`](mode::ExplorationMode).
//!
//! The zipper types — [`Context`](context::Context) with live sibling trees,
//! [`Cursor`](cursor::Cursor) without — describe *where* an exploration is,
//! and are what make workload stealing and suspension cheap: converting one
//! parked left-branch frame is all it takes to cut a workload in two.
//!
//! ## Quick start
//!
//! ```rust
//! use canopy_core::tree::Tree;
//! use canopy_core::stepper::explore_whole;
//!
//! let tree: Tree<u64> = Tree::choice(
//!     || Tree::choice(|| Tree::leaf(1), || Tree::leaf(2)),
//!     || Tree::leaf(3),
//! );
//! let leaves = explore_whole(tree).unwrap();
//! assert_eq!(leaves, vec![1, 2, 3]);
//! ```

pub mod checkpoint;
pub mod context;
pub mod cursor;
pub mod error;
pub mod location;
pub mod mode;
pub mod path;
pub mod progress;
pub mod stepper;
pub mod tree;
pub mod workload;

pub use checkpoint::{checkpoint_from_initial_path, checkpoint_from_unexplored_path, Checkpoint};
pub use context::{Context, ContextStep, StolenBranch};
pub use cursor::{Cursor, CursorStep};
pub use error::{CheckpointError, WalkError, WalkResult};
pub use location::{walk_tree_down_location, Location};
pub use mode::{
    ExplorationMode, FirstFound, FoundOutcome, Located, StopWhenPull, StopWhenPush, SumAll,
};
pub use path::{walk_tree_down_path, Branch, Path, Step};
pub use progress::{Monoid, Progress};
pub use stepper::{
    explore_whole, explore_whole_located, explore_with_checkpoint, step, ExplorationState,
    SerialExplorer, StepOutcome, SuspendedExploration,
};
pub use tree::{CacheNode, Thunk, Tree, TreeBuilder};
pub use workload::Workload;
