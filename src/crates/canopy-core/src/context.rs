//! Exploration contexts: zippers with live sibling trees
//!
//! A [`Context`] records the frames between the root of a workload and the
//! stepper's current position. Descending into the left branch of a `Choice`
//! parks the right branch here — its inherited checkpoint *and* its live
//! sub-tree — until the stepper backtracks into it, or until a steal carries
//! it away to another worker.
//!
//! Frames are kept in a plain `Vec` used as a stack: push and pop are O(1),
//! while path extraction, checkpoint splicing and the steal scan are linear
//! in the current depth.

use crate::checkpoint::Checkpoint;
use crate::cursor::CursorStep;
use crate::location::Location;
use crate::path::{Branch, Path, Step};
use crate::tree::Thunk;

/// One frame of the zipper.
#[derive(Debug)]
pub enum ContextStep<T> {
    /// A cache was crossed, producing `bytes`.
    Cache { bytes: Vec<u8> },
    /// The stepper is in the left branch of a choice; the right branch waits
    /// here with its inherited checkpoint and its unevaluated sub-tree.
    LeftBranch {
        right: Checkpoint,
        right_tree: Thunk<T>,
    },
    /// The stepper is in the right branch; the left branch is fully explored.
    RightBranch,
}

/// The frames above the stepper's current position, innermost last.
#[derive(Debug)]
pub struct Context<T>(Vec<ContextStep<T>>);

impl<T> Default for Context<T> {
    fn default() -> Self {
        Context(Vec::new())
    }
}

/// What a successful steal removed from a context.
#[derive(Debug)]
pub struct StolenBranch<T> {
    /// Cursor conversions of the frames between the old context root and the
    /// stolen choice, outermost first.
    pub walked: Vec<CursorStep>,
    /// The inherited checkpoint of the stolen right branch.
    pub checkpoint: Checkpoint,
    /// The live right sub-tree. The thief reconstructs its own copy by path
    /// replay, so victims normally drop this.
    pub tree: Thunk<T>,
}

impl<T> Context<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, step: ContextStep<T>) {
        self.0.push(step);
    }

    pub fn pop(&mut self) -> Option<ContextStep<T>> {
        self.0.pop()
    }

    pub fn steps(&self) -> &[ContextStep<T>] {
        &self.0
    }

    /// The path from the context root to the current position. Lossy: sibling
    /// checkpoints and trees are forgotten.
    pub fn path(&self) -> Path {
        self.0
            .iter()
            .map(|step| match step {
                ContextStep::Cache { bytes } => Step::Cache(bytes.clone()),
                ContextStep::LeftBranch { .. } => Step::Choice(Branch::Left),
                ContextStep::RightBranch => Step::Choice(Branch::Right),
            })
            .collect()
    }

    /// The branch-only coordinate of the current position relative to the
    /// context root.
    pub fn location(&self) -> Location {
        self.0
            .iter()
            .filter_map(|step| match step {
                ContextStep::Cache { .. } => None,
                ContextStep::LeftBranch { .. } => Some(Branch::Left),
                ContextStep::RightBranch => Some(Branch::Right),
            })
            .collect()
    }

    /// Splice `sub`, the checkpoint at the current position, through every
    /// frame out to the context root, simplifying at each layer.
    ///
    /// A `LeftBranch` contributes its parked right-branch checkpoint; a
    /// `RightBranch` marks its left branch `Explored`.
    pub fn checkpoint(&self, sub: Checkpoint) -> Checkpoint {
        self.0.iter().rev().fold(sub, |inner, step| match step {
            ContextStep::Cache { bytes } => Checkpoint::cache(bytes.clone(), inner),
            ContextStep::LeftBranch { right, .. } => Checkpoint::choice(inner, right.clone()),
            ContextStep::RightBranch => Checkpoint::choice(Checkpoint::Explored, inner),
        })
    }

    /// Remove the shallowest parked right branch worth stealing.
    ///
    /// Scans from the context root for the first `LeftBranch` frame whose
    /// right branch is not already fully explored. Every frame up to it is
    /// converted to its cursor form and returned in `walked`; the frame
    /// itself is consumed, yielding the stolen branch's checkpoint and tree.
    /// The remaining context starts just below the stolen choice. Returns
    /// `None` when nothing stealable is parked.
    pub fn steal_shallowest(&mut self) -> Option<StolenBranch<T>> {
        let at = self.0.iter().position(|step| {
            matches!(step, ContextStep::LeftBranch { right, .. } if !right.is_explored())
        })?;
        let mut removed = self.0.drain(..=at);
        let mut walked = Vec::with_capacity(at);
        let mut stolen = None;
        for step in removed.by_ref() {
            match step {
                ContextStep::Cache { bytes } => walked.push(CursorStep::Cache { bytes }),
                ContextStep::RightBranch => walked.push(CursorStep::Choice {
                    taken: Branch::Right,
                    sibling: Checkpoint::Explored,
                }),
                ContextStep::LeftBranch { right, right_tree } => {
                    if right.is_explored() {
                        // Inherited as fully explored; nothing to hand out.
                        walked.push(CursorStep::Choice {
                            taken: Branch::Left,
                            sibling: Checkpoint::Explored,
                        });
                        drop(right_tree);
                    } else {
                        stolen = Some((right, right_tree));
                    }
                }
            }
        }
        drop(removed);
        let (checkpoint, tree) = stolen?;
        Some(StolenBranch {
            walked,
            checkpoint,
            tree,
        })
    }

    /// Convert every frame to its cursor form, dropping live trees.
    ///
    /// Used when suspending a serial exploration: the parked right branches
    /// are rebuilt by replay on resume.
    pub fn into_cursor_steps(self) -> Vec<CursorStep> {
        self.0
            .into_iter()
            .map(|step| match step {
                ContextStep::Cache { bytes } => CursorStep::Cache { bytes },
                ContextStep::LeftBranch { right, .. } => CursorStep::Choice {
                    taken: Branch::Left,
                    sibling: right,
                },
                ContextStep::RightBranch => CursorStep::Choice {
                    taken: Branch::Right,
                    sibling: Checkpoint::Explored,
                },
            })
            .collect()
    }
}
