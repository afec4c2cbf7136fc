//! The single-step tree interpreter
//!
//! [`step`] advances an [`ExplorationState`] by exactly one semantic move:
//! it crosses one instruction, pushes or pops one context frame, or
//! terminates. Everything above it — the serial driver here, the parallel
//! worker engine elsewhere — is a loop around this function.
//!
//! The remaining checkpoint guides the step: `Explored` regions are skipped,
//! recorded cache points replay their bytes instead of re-running the effect,
//! and recorded choice points re-park the right branch with its inherited
//! checkpoint. A checkpoint node that does not line up with the instruction
//! found at the same position means the tree changed between runs and raises
//! [`WalkError::CacheMismatch`].
//!
//! [`SerialExplorer`] drives the stepper on a single thread, yields leaves as
//! an iterator, and supports suspension to a serializable
//! [`SuspendedExploration`] from which a later process can resume.

use crate::checkpoint::Checkpoint;
use crate::context::{Context, ContextStep};
use crate::cursor::{Cursor, CursorStep};
use crate::error::{WalkError, WalkResult};
use crate::path::Branch;
use crate::tree::Tree;
use serde::{Deserialize, Serialize};

/// Where the stepper is: the zipper above it, the remaining checkpoint at the
/// hole, and the instruction about to be interpreted.
#[derive(Debug)]
pub struct ExplorationState<T> {
    pub context: Context<T>,
    pub checkpoint: Checkpoint,
    pub tree: Tree<T>,
}

impl<T: Send + 'static> ExplorationState<T> {
    /// Start at the root of `tree` with nothing explored.
    pub fn new(tree: Tree<T>) -> Self {
        Self::with_checkpoint(tree, Checkpoint::Unexplored)
    }

    /// Start at the root of `tree`, skipping the regions `checkpoint` marks
    /// explored.
    pub fn with_checkpoint(tree: Tree<T>, checkpoint: Checkpoint) -> Self {
        ExplorationState {
            context: Context::new(),
            checkpoint,
            tree,
        }
    }
}

/// The result of one step.
#[derive(Debug)]
pub struct StepOutcome<T> {
    /// A leaf value, when the step crossed one.
    pub leaf: Option<T>,
    /// The next state; `None` when the exploration is finished.
    pub next: Option<ExplorationState<T>>,
    /// Whether the step crossed a `Yield` instruction.
    pub yielded: bool,
}

/// Advance by exactly one semantic step.
pub fn step<T: Send + 'static>(state: ExplorationState<T>) -> WalkResult<StepOutcome<T>> {
    let ExplorationState {
        mut context,
        checkpoint,
        tree,
    } = state;

    let outcome = match checkpoint {
        Checkpoint::Explored => StepOutcome {
            leaf: None,
            next: backtrack(context),
            yielded: false,
        },
        Checkpoint::Unexplored => match tree {
            Tree::Leaf(value) => StepOutcome {
                leaf: Some(value),
                next: backtrack(context),
                yielded: false,
            },
            Tree::Null => StepOutcome {
                leaf: None,
                next: backtrack(context),
                yielded: false,
            },
            Tree::Cache(node) => {
                let (effect, continuation) = node.into_parts();
                match effect()? {
                    None => StepOutcome {
                        leaf: None,
                        next: backtrack(context),
                        yielded: false,
                    },
                    Some(bytes) => {
                        let rest = continuation(&bytes)?;
                        context.push(ContextStep::Cache { bytes });
                        StepOutcome {
                            leaf: None,
                            next: Some(ExplorationState {
                                context,
                                checkpoint: Checkpoint::Unexplored,
                                tree: rest,
                            }),
                            yielded: false,
                        }
                    }
                }
            }
            Tree::Choice(left, right) => {
                context.push(ContextStep::LeftBranch {
                    right: Checkpoint::Unexplored,
                    right_tree: right,
                });
                StepOutcome {
                    leaf: None,
                    next: Some(ExplorationState {
                        context,
                        checkpoint: Checkpoint::Unexplored,
                        tree: left.force(),
                    }),
                    yielded: false,
                }
            }
            Tree::Yield(rest) => StepOutcome {
                leaf: None,
                next: Some(ExplorationState {
                    context,
                    checkpoint: Checkpoint::Unexplored,
                    tree: rest.force(),
                }),
                yielded: true,
            },
        },
        Checkpoint::Cache { bytes, inner } => match tree {
            Tree::Cache(node) => {
                // Replay: the effect is skipped in favor of the recorded
                // bytes.
                let (_effect, continuation) = node.into_parts();
                let rest = continuation(&bytes)?;
                context.push(ContextStep::Cache { bytes });
                StepOutcome {
                    leaf: None,
                    next: Some(ExplorationState {
                        context,
                        checkpoint: *inner,
                        tree: rest,
                    }),
                    yielded: false,
                }
            }
            Tree::Yield(rest) => StepOutcome {
                leaf: None,
                next: Some(ExplorationState {
                    context,
                    checkpoint: Checkpoint::Cache { bytes, inner },
                    tree: rest.force(),
                }),
                yielded: true,
            },
            _ => return Err(WalkError::CacheMismatch),
        },
        Checkpoint::Choice { left, right } => match tree {
            Tree::Choice(left_tree, right_tree) => {
                context.push(ContextStep::LeftBranch {
                    right: *right,
                    right_tree,
                });
                StepOutcome {
                    leaf: None,
                    next: Some(ExplorationState {
                        context,
                        checkpoint: *left,
                        tree: left_tree.force(),
                    }),
                    yielded: false,
                }
            }
            Tree::Yield(rest) => StepOutcome {
                leaf: None,
                next: Some(ExplorationState {
                    context,
                    checkpoint: Checkpoint::Choice { left, right },
                    tree: rest.force(),
                }),
                yielded: true,
            },
            _ => return Err(WalkError::CacheMismatch),
        },
    };

    Ok(outcome)
}

/// Pop frames until a parked right branch takes over; `None` when the context
/// empties.
fn backtrack<T: Send + 'static>(mut context: Context<T>) -> Option<ExplorationState<T>> {
    while let Some(frame) = context.pop() {
        match frame {
            ContextStep::Cache { .. } | ContextStep::RightBranch => continue,
            ContextStep::LeftBranch { right, right_tree } => {
                context.push(ContextStep::RightBranch);
                return Some(ExplorationState {
                    context,
                    checkpoint: right,
                    tree: right_tree.force(),
                });
            }
        }
    }
    None
}

/// A serializable suspended exploration: the position as a cursor plus the
/// remaining checkpoint at the hole.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendedExploration {
    pub cursor: Cursor,
    pub checkpoint: Checkpoint,
}

/// A single-threaded driver around [`step`].
///
/// Yields leaves through `Iterator`; [`SerialExplorer::suspend`] converts the
/// live position to a [`SuspendedExploration`] and
/// [`SerialExplorer::resume`] rebuilds it against a freshly built tree.
/// Cursor replay during resume is startup cost and does not count as steps.
#[derive(Debug)]
pub struct SerialExplorer<T> {
    state: Option<ExplorationState<T>>,
    steps: u64,
}

impl<T: Send + 'static> SerialExplorer<T> {
    /// Explore `tree` from nothing.
    pub fn new(tree: Tree<T>) -> Self {
        SerialExplorer {
            state: Some(ExplorationState::new(tree)),
            steps: 0,
        }
    }

    /// Explore the regions `checkpoint` leaves unexplored.
    pub fn with_checkpoint(tree: Tree<T>, checkpoint: Checkpoint) -> Self {
        SerialExplorer {
            state: Some(ExplorationState::with_checkpoint(tree, checkpoint)),
            steps: 0,
        }
    }

    /// Rebuild a suspended exploration against a freshly built tree.
    ///
    /// Replays the cursor from the root, re-running cache effects (their
    /// bytes must match the recording) and re-parking right branches, then
    /// continues from the recorded checkpoint. A suspension taken after the
    /// exploration finished resumes as finished.
    pub fn resume(tree: Tree<T>, suspended: &SuspendedExploration) -> WalkResult<Self> {
        if suspended.cursor.is_empty() && suspended.checkpoint.is_explored() {
            return Ok(SerialExplorer {
                state: None,
                steps: 0,
            });
        }
        let (context, tree) = rebuild_context(tree, &suspended.cursor)?;
        Ok(SerialExplorer {
            state: Some(ExplorationState {
                context,
                checkpoint: suspended.checkpoint.clone(),
                tree,
            }),
            steps: 0,
        })
    }

    /// Number of [`step`] calls made so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_none()
    }

    /// Perform one step; `Ok(None)` means the step crossed no leaf (it may
    /// also have finished the exploration — check [`Self::is_finished`]).
    pub fn step_once(&mut self) -> WalkResult<Option<T>> {
        let Some(state) = self.state.take() else {
            return Ok(None);
        };
        self.steps += 1;
        let outcome = step(state)?;
        self.state = outcome.next;
        Ok(outcome.leaf)
    }

    /// Suspend to a serializable position. Parked right branches keep their
    /// checkpoints; their live trees are dropped and rebuilt on resume.
    pub fn suspend(self) -> SuspendedExploration {
        match self.state {
            None => SuspendedExploration {
                cursor: Cursor::new(),
                checkpoint: Checkpoint::Explored,
            },
            Some(state) => SuspendedExploration {
                cursor: state.context.into_cursor_steps().into_iter().collect(),
                checkpoint: state.checkpoint,
            },
        }
    }
}

impl<T: Send + 'static> Iterator for SerialExplorer<T> {
    type Item = WalkResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.is_finished() {
            match self.step_once() {
                Ok(Some(leaf)) => return Some(Ok(leaf)),
                Ok(None) => continue,
                Err(err) => {
                    self.state = None;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}

/// Walk `tree` down `cursor`, rebuilding the live context the cursor was
/// projected from.
///
/// `Yield` instructions are crossed silently. Cache entries re-run the effect
/// and verify the recorded bytes; left-branch entries re-park the fresh right
/// sub-tree under the recorded sibling checkpoint; right-branch entries drop
/// the (already explored) left sub-tree.
pub fn rebuild_context<T: Send + 'static>(
    mut tree: Tree<T>,
    cursor: &Cursor,
) -> WalkResult<(Context<T>, Tree<T>)> {
    let mut context = Context::new();
    for entry in cursor.steps() {
        loop {
            tree = match (entry, tree) {
                (_, Tree::Yield(rest)) => {
                    tree = rest.force();
                    continue;
                }
                (CursorStep::Cache { bytes }, Tree::Cache(node)) => {
                    let (effect, continuation) = node.into_parts();
                    match effect()? {
                        None => return Err(WalkError::TreeExhausted),
                        Some(produced) if produced == *bytes => {
                            let rest = continuation(&produced)?;
                            context.push(ContextStep::Cache { bytes: produced });
                            rest
                        }
                        Some(_) => return Err(WalkError::CacheMismatch),
                    }
                }
                (
                    CursorStep::Choice {
                        taken: Branch::Left,
                        sibling,
                    },
                    Tree::Choice(left, right),
                ) => {
                    context.push(ContextStep::LeftBranch {
                        right: sibling.clone(),
                        right_tree: right,
                    });
                    left.force()
                }
                (
                    CursorStep::Choice {
                        taken: Branch::Right,
                        ..
                    },
                    Tree::Choice(_, right),
                ) => {
                    context.push(ContextStep::RightBranch);
                    right.force()
                }
                (_, Tree::Leaf(_)) | (_, Tree::Null) => return Err(WalkError::TreeExhausted),
                (_, _) => return Err(WalkError::CacheMismatch),
            };
            break;
        }
    }
    Ok((context, tree))
}

/// Collect every leaf of `tree` in discovery order.
pub fn explore_whole<T: Send + 'static>(tree: Tree<T>) -> WalkResult<Vec<T>> {
    SerialExplorer::new(tree).collect()
}

/// Collect every leaf of `tree` together with its coordinate, in discovery
/// order.
pub fn explore_whole_located<T: Send + 'static>(
    tree: Tree<T>,
) -> WalkResult<Vec<crate::mode::Located<T>>> {
    let mut leaves = Vec::new();
    let mut state = Some(ExplorationState::new(tree));
    while let Some(current) = state.take() {
        // The coordinate has to be read off before the step backtracks away
        // from the leaf.
        let location = (current.checkpoint.is_unexplored()
            && matches!(current.tree, Tree::Leaf(_)))
        .then(|| current.context.location());
        let outcome = step(current)?;
        if let (Some(value), Some(location)) = (outcome.leaf, location) {
            leaves.push(crate::mode::Located { location, value });
        }
        state = outcome.next;
    }
    Ok(leaves)
}

/// Collect the leaves of the regions `checkpoint` leaves unexplored.
pub fn explore_with_checkpoint<T: Send + 'static>(
    tree: Tree<T>,
    checkpoint: Checkpoint,
) -> WalkResult<Vec<T>> {
    SerialExplorer::with_checkpoint(tree, checkpoint).collect()
}
