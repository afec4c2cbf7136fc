//! Workloads: the unit of delegation
//!
//! A [`Workload`] delimits the slice of the search space assigned to one
//! worker: an initial path addressing the sub-tree's root, and a checkpoint
//! of that sub-tree marking the regions that are already explored (or that
//! belong to somebody else). A worker starts by replaying the path against a
//! freshly built tree, then steps through the checkpoint's unexplored
//! regions.

use crate::checkpoint::{checkpoint_from_initial_path, Checkpoint};
use crate::path::Path;
use serde::{Deserialize, Serialize};

/// One worker's slice of the search space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Address of the sub-tree's root.
    pub initial_path: Path,
    /// Checkpoint of the sub-tree; `Explored` regions are skipped.
    pub checkpoint: Checkpoint,
}

impl Workload {
    pub fn new(initial_path: Path, checkpoint: Checkpoint) -> Self {
        Workload {
            initial_path,
            checkpoint,
        }
    }

    /// The whole tree as a single workload.
    pub fn entire() -> Self {
        Workload {
            initial_path: Path::root(),
            checkpoint: Checkpoint::Unexplored,
        }
    }

    /// Depth of the sub-tree's root. Shallower workloads delimit larger
    /// regions and are preferred as steal victims.
    pub fn depth(&self) -> usize {
        self.initial_path.len()
    }

    /// The whole-tree region this workload accounts for: its sub-tree counted
    /// in full, path siblings unclaimed.
    ///
    /// The union of the global progress checkpoint with every outstanding
    /// workload's covered region must be `Explored` at all times.
    pub fn covered_region(&self) -> Checkpoint {
        checkpoint_from_initial_path(&self.initial_path, Checkpoint::Explored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Branch, Step};

    #[test]
    fn test_entire_workload_covers_everything() {
        let whole = Workload::entire();
        assert_eq!(whole.depth(), 0);
        assert_eq!(whole.covered_region(), Checkpoint::Explored);
    }

    #[test]
    fn test_covered_region_leaves_path_siblings_open() {
        let path: Path = [Step::Choice(Branch::Right)].into_iter().collect();
        let workload = Workload::new(path, Checkpoint::Unexplored);
        assert_eq!(workload.depth(), 1);
        assert_eq!(
            workload.covered_region(),
            Checkpoint::choice(Checkpoint::Unexplored, Checkpoint::Explored)
        );
    }
}
