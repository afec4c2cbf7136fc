//! Progress: a checkpoint paired with an accumulated result
//!
//! [`Progress`] is the currency of the whole system: workers report deltas of
//! it, the supervisor folds those deltas into a monotonically growing global
//! value, and the checkpoint file persists one of these between runs.
//!
//! The result half is combined by the active exploration mode; for the
//! sum-style modes that combination comes from the user's [`Monoid`].

use crate::checkpoint::Checkpoint;
use serde::{Deserialize, Serialize};

/// Aggregated exploration: how much of the tree is covered, and what came
/// out of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Progress<R> {
    pub checkpoint: Checkpoint,
    pub result: R,
}

impl<R> Progress<R> {
    pub fn new(checkpoint: Checkpoint, result: R) -> Self {
        Progress { checkpoint, result }
    }

    /// Progress covering nothing, carrying `result` (usually the mode's
    /// empty result).
    pub fn empty(result: R) -> Self {
        Progress {
            checkpoint: Checkpoint::Unexplored,
            result,
        }
    }

    /// Whether the checkpoint covers the entire tree.
    pub fn is_complete(&self) -> bool {
        self.checkpoint.is_explored()
    }
}

/// A user result type with an empty element and an associative combine.
///
/// Parallel exploration folds leaf results in an order that depends on
/// scheduling; associativity is required, and commutativity is required
/// whenever result order matters to the caller.
pub trait Monoid: Clone + Send + 'static {
    fn empty() -> Self;
    fn combine(self, other: Self) -> Self;
}

impl Monoid for () {
    fn empty() {}
    fn combine(self, _other: Self) {}
}

macro_rules! sum_monoid {
    ($($ty:ty),*) => {
        $(
            impl Monoid for $ty {
                fn empty() -> Self {
                    0
                }
                fn combine(self, other: Self) -> Self {
                    self + other
                }
            }
        )*
    };
}

sum_monoid!(u32, u64, usize, i32, i64, isize);

impl<T: Clone + Send + 'static> Monoid for Vec<T> {
    fn empty() -> Self {
        Vec::new()
    }

    fn combine(mut self, mut other: Self) -> Self {
        self.append(&mut other);
        self
    }
}

/// First-some semantics.
impl<T: Clone + Send + 'static> Monoid for Option<T> {
    fn empty() -> Self {
        None
    }

    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_monoid() {
        assert_eq!(u64::empty(), 0);
        assert_eq!(3u64.combine(4), 7);
    }

    #[test]
    fn test_vec_monoid_concatenates() {
        assert_eq!(vec![1, 2].combine(vec![3]), vec![1, 2, 3]);
        assert_eq!(Vec::<u8>::empty().combine(vec![9]), vec![9]);
    }

    #[test]
    fn test_option_monoid_keeps_first() {
        assert_eq!(Some(1).combine(Some(2)), Some(1));
        assert_eq!(None.combine(Some(2)), Some(2));
    }

    #[test]
    fn test_progress_completeness() {
        assert!(!Progress::empty(0u64).is_complete());
        assert!(Progress::new(Checkpoint::Explored, 5u64).is_complete());
    }
}
