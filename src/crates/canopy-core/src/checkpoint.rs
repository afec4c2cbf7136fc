//! Checkpoints: maps from tree regions to explored / unexplored
//!
//! A [`Checkpoint`] records how much of a tree has been explored. It mirrors
//! the shape of the tree it describes: `Choice` nodes become
//! [`Checkpoint::Choice`], crossed `Cache` nodes become [`Checkpoint::Cache`]
//! with the recorded bytes, and whole regions collapse to
//! [`Checkpoint::Explored`] or [`Checkpoint::Unexplored`].
//!
//! Construction always goes through the simplifying constructors
//! ([`Checkpoint::choice`], [`Checkpoint::cache`]), which collapse fully
//! uniform nodes as they are built, so a finished exploration is literally
//! the single atom `Explored`.
//!
//! Checkpoints form an algebra:
//!
//! * [`Checkpoint::merge`] — structural union; `Unexplored` is the identity,
//!   `Explored` absorbs, congruent nodes merge recursively, and incongruent
//!   shapes are an error. Associative and commutative on consistent inputs,
//!   and idempotent, which is what makes re-claiming an already merged region
//!   harmless.
//! * [`Checkpoint::invert`] — swaps explored and unexplored leaves, keeping
//!   shape and cache bytes. Exploring a checkpoint and its inverse together
//!   covers the whole tree exactly once.
//! * [`Checkpoint::simplify`] — bottom-up re-application of the constructor
//!   collapses; idempotent and denotation-preserving.
//!
//! All traversals here are iterative with explicit work stacks: checkpoints
//! mirror tree depth, and trees are allowed to be millions of nodes deep.

use crate::error::CheckpointError;
use crate::path::{Branch, Path, Step};
use serde::{Deserialize, Serialize};

/// How much of one tree region has been explored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checkpoint {
    /// Nothing below this node has been explored.
    Unexplored,
    /// Everything below this node has been explored.
    Explored,
    /// A cache was crossed, producing `bytes`; `inner` describes the
    /// continuation.
    Cache {
        bytes: Vec<u8>,
        inner: Box<Checkpoint>,
    },
    /// A choice node with per-branch checkpoints.
    Choice {
        left: Box<Checkpoint>,
        right: Box<Checkpoint>,
    },
}

impl Checkpoint {
    /// Simplifying choice constructor.
    ///
    /// `Choice(Unexplored, Unexplored)` is `Unexplored` and
    /// `Choice(Explored, Explored)` is `Explored`.
    pub fn choice(left: Checkpoint, right: Checkpoint) -> Checkpoint {
        match (&left, &right) {
            (Checkpoint::Unexplored, Checkpoint::Unexplored) => Checkpoint::Unexplored,
            (Checkpoint::Explored, Checkpoint::Explored) => Checkpoint::Explored,
            _ => Checkpoint::Choice {
                left: Box::new(left),
                right: Box::new(right),
            },
        }
    }

    /// Simplifying cache constructor: `Cache(_, Explored)` is `Explored`.
    pub fn cache(bytes: Vec<u8>, inner: Checkpoint) -> Checkpoint {
        match inner {
            Checkpoint::Explored => Checkpoint::Explored,
            inner => Checkpoint::Cache {
                bytes,
                inner: Box::new(inner),
            },
        }
    }

    pub fn is_explored(&self) -> bool {
        matches!(self, Checkpoint::Explored)
    }

    pub fn is_unexplored(&self) -> bool {
        matches!(self, Checkpoint::Unexplored)
    }

    /// Structural union of two checkpoints of the same tree.
    ///
    /// Fails with [`CheckpointError::Inconsistent`] when the operands
    /// describe different trees: a cache point meeting a choice point, or two
    /// cache points with different recorded bytes.
    pub fn merge(&self, other: &Checkpoint) -> Result<Checkpoint, CheckpointError> {
        enum Frame<'a> {
            Visit(&'a Checkpoint, &'a Checkpoint),
            BuildCache(&'a [u8]),
            BuildChoice,
        }

        let mut work = vec![Frame::Visit(self, other)];
        let mut built: Vec<Checkpoint> = Vec::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Visit(a, b) => match (a, b) {
                    (Checkpoint::Explored, _) | (_, Checkpoint::Explored) => {
                        built.push(Checkpoint::Explored)
                    }
                    (Checkpoint::Unexplored, other) | (other, Checkpoint::Unexplored) => {
                        built.push(other.clone())
                    }
                    (
                        Checkpoint::Cache { bytes: ba, inner: ia },
                        Checkpoint::Cache { bytes: bb, inner: ib },
                    ) => {
                        if ba != bb {
                            return Err(CheckpointError::Inconsistent {
                                left: Box::new(a.clone()),
                                right: Box::new(b.clone()),
                            });
                        }
                        work.push(Frame::BuildCache(ba));
                        work.push(Frame::Visit(ia, ib));
                    }
                    (
                        Checkpoint::Choice { left: la, right: ra },
                        Checkpoint::Choice { left: lb, right: rb },
                    ) => {
                        work.push(Frame::BuildChoice);
                        work.push(Frame::Visit(ra, rb));
                        work.push(Frame::Visit(la, lb));
                    }
                    _ => {
                        return Err(CheckpointError::Inconsistent {
                            left: Box::new(a.clone()),
                            right: Box::new(b.clone()),
                        })
                    }
                },
                Frame::BuildCache(bytes) => {
                    let inner = pop_built(&mut built);
                    built.push(Checkpoint::cache(bytes.to_vec(), inner));
                }
                Frame::BuildChoice => {
                    let right = pop_built(&mut built);
                    let left = pop_built(&mut built);
                    built.push(Checkpoint::choice(left, right));
                }
            }
        }

        Ok(pop_built(&mut built))
    }

    /// Swap explored and unexplored leaves, keeping shape and cache bytes.
    pub fn invert(&self) -> Checkpoint {
        self.rebuild(|leaf| match leaf {
            Checkpoint::Unexplored => Checkpoint::Explored,
            Checkpoint::Explored => Checkpoint::Unexplored,
            _ => unreachable!("rebuild only maps atoms"),
        })
    }

    /// Bottom-up re-application of the simplifying constructors.
    pub fn simplify(&self) -> Checkpoint {
        self.rebuild(|leaf| leaf.clone())
    }

    /// Estimated fraction of the tree marked explored, weighting the two
    /// branches of every choice equally.
    ///
    /// Purely informational (progress displays and logs); the search space
    /// is rarely balanced, so this is not a time estimate.
    pub fn coverage(&self) -> f64 {
        let mut covered = 0.0;
        let mut stack = vec![(self, 1.0_f64)];
        while let Some((checkpoint, weight)) = stack.pop() {
            match checkpoint {
                Checkpoint::Unexplored => {}
                Checkpoint::Explored => covered += weight,
                Checkpoint::Cache { inner, .. } => stack.push((inner, weight)),
                Checkpoint::Choice { left, right } => {
                    stack.push((left, weight / 2.0));
                    stack.push((right, weight / 2.0));
                }
            }
        }
        covered
    }

    /// Rebuild this checkpoint through the simplifying constructors, mapping
    /// the `Explored` / `Unexplored` atoms with `map_atom`.
    fn rebuild(&self, map_atom: impl Fn(&Checkpoint) -> Checkpoint) -> Checkpoint {
        enum Frame<'a> {
            Visit(&'a Checkpoint),
            BuildCache(&'a [u8]),
            BuildChoice,
        }

        let mut work = vec![Frame::Visit(self)];
        let mut built: Vec<Checkpoint> = Vec::new();

        while let Some(frame) = work.pop() {
            match frame {
                Frame::Visit(cp) => match cp {
                    Checkpoint::Unexplored | Checkpoint::Explored => built.push(map_atom(cp)),
                    Checkpoint::Cache { bytes, inner } => {
                        work.push(Frame::BuildCache(bytes));
                        work.push(Frame::Visit(inner));
                    }
                    Checkpoint::Choice { left, right } => {
                        work.push(Frame::BuildChoice);
                        work.push(Frame::Visit(right));
                        work.push(Frame::Visit(left));
                    }
                },
                Frame::BuildCache(bytes) => {
                    let inner = pop_built(&mut built);
                    built.push(Checkpoint::cache(bytes.to_vec(), inner));
                }
                Frame::BuildChoice => {
                    let right = pop_built(&mut built);
                    let left = pop_built(&mut built);
                    built.push(Checkpoint::choice(left, right));
                }
            }
        }

        pop_built(&mut built)
    }
}

fn pop_built(built: &mut Vec<Checkpoint>) -> Checkpoint {
    match built.pop() {
        Some(cp) => cp,
        None => unreachable!("every visit frame pushes exactly one built checkpoint"),
    }
}

/// Lift `sub`, the checkpoint of the node addressed by `path`, into a
/// whole-tree checkpoint, marking every sibling of the path `Unexplored`.
///
/// This is the lift for a freshly delegated workload: nothing is known about
/// the branches not taken.
pub fn checkpoint_from_initial_path(path: &Path, sub: Checkpoint) -> Checkpoint {
    wrap_path(path, sub, Checkpoint::Unexplored)
}

/// A whole-tree checkpoint in which only the node addressed by `path` is
/// still unexplored: every sibling of the path is marked `Explored`.
pub fn checkpoint_from_unexplored_path(path: &Path) -> Checkpoint {
    wrap_path(path, Checkpoint::Unexplored, Checkpoint::Explored)
}

fn wrap_path(path: &Path, sub: Checkpoint, sibling: Checkpoint) -> Checkpoint {
    path.steps()
        .iter()
        .rev()
        .fold(sub, |inner, step| match step {
            Step::Choice(Branch::Left) => Checkpoint::choice(inner, sibling.clone()),
            Step::Choice(Branch::Right) => Checkpoint::choice(sibling.clone(), inner),
            Step::Cache(bytes) => Checkpoint::cache(bytes.clone(), inner),
        })
}
