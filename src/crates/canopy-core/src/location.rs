//! Locations: branch-only tree coordinates
//!
//! A [`Location`] identifies a node of a binary tree purely by the sequence
//! of left/right turns that reaches it, forgetting cache values. It is the
//! coordinate attached to results in first-found mode. The root is the empty
//! sequence; the derived ordering is lexicographic with `Left < Right`, which
//! matches the order in which the stepper discovers leaves.

use crate::error::{WalkError, WalkResult};
use crate::path::{Branch, Path, Step};
use crate::tree::Tree;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A branch-only coordinate of one tree node.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location(Vec<Branch>);

impl Location {
    /// The root coordinate (the identity of [`Location::append`]).
    pub fn root() -> Self {
        Location(Vec::new())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn branches(&self) -> &[Branch] {
        &self.0
    }

    /// Rebuild from a branch sequence. Inverse of [`Location::branches`].
    pub fn from_branches(branches: Vec<Branch>) -> Self {
        Location(branches)
    }

    /// The branch-only projection of a path; cache steps are dropped.
    pub fn from_path(path: &Path) -> Self {
        path.steps()
            .iter()
            .filter_map(|step| match step {
                Step::Choice(branch) => Some(*branch),
                Step::Cache(_) => None,
            })
            .collect()
    }

    pub fn push(&mut self, branch: Branch) {
        self.0.push(branch);
    }

    pub fn child(&self, branch: Branch) -> Self {
        let mut child = self.clone();
        child.push(branch);
        child
    }

    pub fn left_child(&self) -> Self {
        self.child(Branch::Left)
    }

    pub fn right_child(&self) -> Self {
        self.child(Branch::Right)
    }

    /// The coordinate of `other` interpreted relative to `self`.
    pub fn append(&self, other: &Location) -> Self {
        let mut joined = self.clone();
        joined.0.extend_from_slice(&other.0);
        joined
    }
}

/// Descend `tree` to the node at `location`.
///
/// Unlike a path replay, a location carries no cache bytes: caches along the
/// way are simply run (a rejecting cache ends the walk early with
/// [`WalkError::TreeExhausted`]) and `Yield` instructions are crossed
/// silently. Used to revisit a reported result coordinate.
pub fn walk_tree_down_location<T: Send + 'static>(
    mut tree: Tree<T>,
    location: &Location,
) -> WalkResult<Tree<T>> {
    for branch in location.branches() {
        loop {
            tree = match (branch, tree) {
                (_, Tree::Yield(rest)) => {
                    tree = rest.force();
                    continue;
                }
                (_, Tree::Cache(node)) => {
                    let (effect, continuation) = node.into_parts();
                    match effect()? {
                        None => return Err(WalkError::TreeExhausted),
                        Some(bytes) => {
                            tree = continuation(&bytes)?;
                            continue;
                        }
                    }
                }
                (Branch::Left, Tree::Choice(left, _)) => left.force(),
                (Branch::Right, Tree::Choice(_, right)) => right.force(),
                (_, Tree::Leaf(_)) | (_, Tree::Null) => return Err(WalkError::TreeExhausted),
            };
            break;
        }
    }
    Ok(tree)
}

impl FromIterator<Branch> for Location {
    fn from_iter<I: IntoIterator<Item = Branch>>(iter: I) -> Self {
        Location(iter.into_iter().collect())
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("ε");
        }
        for branch in &self.0 {
            write!(f, "{branch}")?;
        }
        Ok(())
    }
}
