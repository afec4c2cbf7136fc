//! Cursors: zippers that have let go of their sub-trees
//!
//! A [`Cursor`] is the part of a worker's position that no longer holds live
//! trees. It grows when a workload steal converts the frames above the stolen
//! choice into their tree-less form, and when a serial exploration is
//! suspended for serialization.
//!
//! Each choice entry records which branch the walk took and what this worker
//! may *claim* about the sibling branch: `Explored` for a left sibling the
//! worker finished itself, `Unexplored` for a right sibling that was stolen
//! (the thief owns it now, so the victim must not claim it). That distinction
//! is why the cursor offers two checkpoint projections:
//!
//! * [`Cursor::known_checkpoint`] — wraps with the stored sibling knowledge;
//!   used for progress deltas, which must never claim stolen work;
//! * [`Cursor::remaining_checkpoint`] — wraps every sibling `Explored`; used
//!   for the remaining-workload record, where a stolen sibling is equally
//!   "not this worker's to explore".

use crate::checkpoint::Checkpoint;
use crate::path::{Branch, Path, Step};
use serde::{Deserialize, Serialize};

/// One tree-less frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorStep {
    /// A cache was crossed, producing `bytes`.
    Cache { bytes: Vec<u8> },
    /// A choice was crossed on branch `taken`; `sibling` is what this worker
    /// may claim about the other branch.
    Choice { taken: Branch, sibling: Checkpoint },
}

/// The tree-less prefix of a worker's position, outermost first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(Vec<CursorStep>);

impl Cursor {
    pub fn new() -> Self {
        Cursor(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, step: CursorStep) {
        self.0.push(step);
    }

    pub fn extend(&mut self, steps: Vec<CursorStep>) {
        self.0.extend(steps);
    }

    pub fn steps(&self) -> &[CursorStep] {
        &self.0
    }

    /// The path from the cursor root to its end. Lossy: sibling knowledge is
    /// forgotten.
    pub fn path(&self) -> Path {
        self.0
            .iter()
            .map(|step| match step {
                CursorStep::Cache { bytes } => Step::Cache(bytes.clone()),
                CursorStep::Choice { taken, .. } => Step::Choice(*taken),
            })
            .collect()
    }

    /// Splice `sub` through the cursor using the stored sibling knowledge.
    pub fn known_checkpoint(&self, sub: Checkpoint) -> Checkpoint {
        self.splice(sub, |sibling| sibling.clone())
    }

    /// Splice `sub` through the cursor with every sibling `Explored`: nothing
    /// outside the cursor's spine remains this worker's responsibility.
    pub fn remaining_checkpoint(&self, sub: Checkpoint) -> Checkpoint {
        self.splice(sub, |_| Checkpoint::Explored)
    }

    fn splice(
        &self,
        sub: Checkpoint,
        sibling_of: impl Fn(&Checkpoint) -> Checkpoint,
    ) -> Checkpoint {
        self.0.iter().rev().fold(sub, |inner, step| match step {
            CursorStep::Cache { bytes } => Checkpoint::cache(bytes.clone(), inner),
            CursorStep::Choice {
                taken: Branch::Left,
                sibling,
            } => Checkpoint::choice(inner, sibling_of(sibling)),
            CursorStep::Choice {
                taken: Branch::Right,
                sibling,
            } => Checkpoint::choice(sibling_of(sibling), inner),
        })
    }
}

impl FromIterator<CursorStep> for Cursor {
    fn from_iter<I: IntoIterator<Item = CursorStep>>(iter: I) -> Self {
        Cursor(iter.into_iter().collect())
    }
}
