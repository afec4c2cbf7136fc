//! Paths: replayable addresses of tree nodes
//!
//! A [`Path`] is the sequence of moves that leads from the root of a tree to
//! one of its nodes: which branch was taken at each `Choice`, and which bytes
//! each `Cache` along the way produced. Replaying a path against a freshly
//! built tree resurrects the sub-tree at that node, re-running cache effects
//! and verifying that they still produce the recorded bytes.

use crate::error::{WalkError, WalkResult};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of a `Choice` a walk descended into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Branch {
    Left,
    Right,
}

impl Branch {
    /// The opposite branch.
    pub fn other(self) -> Branch {
        match self {
            Branch::Left => Branch::Right,
            Branch::Right => Branch::Left,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Left => f.write_str("L"),
            Branch::Right => f.write_str("R"),
        }
    }
}

/// One move of a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Descend into one side of a `Choice`.
    Choice(Branch),
    /// Cross a `Cache` that produced these bytes.
    Cache(Vec<u8>),
}

/// A replayable address of one node in a tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Step>);

impl Path {
    /// The empty path, addressing the root.
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, step: Step) {
        self.0.push(step);
    }

    pub fn extend(&mut self, other: Path) {
        self.0.extend(other.0);
    }

    pub fn steps(&self) -> &[Step] {
        &self.0
    }

    /// This path followed by `tail`.
    pub fn join(&self, tail: Path) -> Path {
        let mut joined = self.clone();
        joined.extend(tail);
        joined
    }
}

impl FromIterator<Step> for Path {
    fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl IntoIterator for Path {
    type Item = Step;
    type IntoIter = std::vec::IntoIter<Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Replay `path` against `tree`, returning the sub-tree at the addressed
/// node.
///
/// `Yield` instructions are transparent: they are crossed without consuming a
/// step. Cache effects along the way are re-run and must reproduce the
/// recorded bytes ([`WalkError::CacheMismatch`] otherwise); a tree that stops
/// (leaf, `Null`, or a rejecting cache) before the path is exhausted raises
/// [`WalkError::TreeExhausted`].
pub fn walk_tree_down_path<T: Send + 'static>(mut tree: Tree<T>, path: &Path) -> WalkResult<Tree<T>> {
    for step in path {
        loop {
            tree = match (step, tree) {
                (_, Tree::Yield(rest)) => {
                    tree = rest.force();
                    continue;
                }
                (Step::Choice(Branch::Left), Tree::Choice(left, _)) => left.force(),
                (Step::Choice(Branch::Right), Tree::Choice(_, right)) => right.force(),
                (Step::Cache(recorded), Tree::Cache(node)) => {
                    let (effect, continuation) = node.into_parts();
                    match effect()? {
                        None => return Err(WalkError::TreeExhausted),
                        Some(bytes) if bytes == *recorded => continuation(&bytes)?,
                        Some(_) => return Err(WalkError::CacheMismatch),
                    }
                }
                (_, Tree::Leaf(_)) | (_, Tree::Null) => return Err(WalkError::TreeExhausted),
                (_, _) => return Err(WalkError::CacheMismatch),
            };
            break;
        }
    }
    Ok(tree)
}
