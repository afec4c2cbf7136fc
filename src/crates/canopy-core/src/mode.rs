//! Exploration modes: what to do with the leaves
//!
//! An [`ExplorationMode`] decides how leaf values are accumulated and when a
//! run is finished. Four policies are provided:
//!
//! * [`SumAll`] — fold every leaf into a [`Monoid`]; finished when the whole
//!   tree is explored.
//! * [`FirstFound`] — stop at the first leaf, reporting it with its
//!   [`Location`].
//! * [`StopWhenPull`] — fold like [`SumAll`] but finish as soon as the
//!   accumulated result satisfies a predicate, checked at every supervisor
//!   fold.
//! * [`StopWhenPush`] — same termination rule, but workers flush each partial
//!   result to the supervisor immediately instead of buffering until asked.
//!
//! The trait is the seam between the generic machinery and user policy; the
//! supervisor and worker engine are written against it only.

use crate::location::Location;
use crate::progress::{Monoid, Progress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::marker::PhantomData;

/// A leaf value together with the coordinate it was found at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Located<V> {
    pub location: Location,
    pub value: V,
}

/// Bounds every accumulated result must satisfy to cross worker boundaries
/// and land in checkpoint files.
pub trait ModeResult: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {}
impl<T: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static> ModeResult for T {}

/// The result policy of an exploration.
pub trait ExplorationMode: Send + Sync + 'static {
    /// Leaf values produced by the tree.
    type Value: Send + 'static;
    /// Accumulated results, shipped between workers and supervisor.
    type Result: ModeResult;
    /// Payload of a completed run.
    type Final: Debug + Send + 'static;

    /// The accumulator every worker and the supervisor start from.
    fn initial_result(&self) -> Self::Result;

    /// Whether leaf folds need the leaf's [`Location`]. Modes that return
    /// `false` are never charged for location bookkeeping.
    fn needs_location(&self) -> bool {
        false
    }

    /// Fold one leaf into an accumulator. `location` is present exactly when
    /// [`Self::needs_location`] returns true.
    fn fold_leaf(&self, acc: &mut Self::Result, leaf: Self::Value, location: Option<Location>);

    /// Fold a reported delta into an accumulator. Must be associative with
    /// respect to [`Self::fold_leaf`].
    fn combine(&self, acc: &mut Self::Result, other: Self::Result);

    /// Check whether `progress` finishes the run, and with what.
    fn completion(&self, progress: &Progress<Self::Result>) -> Option<Self::Final>;

    /// Whether a worker should stop exploring its workload after this
    /// accumulator state (first-found style early exit).
    fn leaf_completes(&self, _acc: &Self::Result) -> bool {
        false
    }

    /// Whether workers should send a progress update immediately after every
    /// fold instead of buffering until asked.
    fn flush_immediately(&self) -> bool {
        false
    }
}

/// Fold every leaf; finished when the tree is exhausted.
pub struct SumAll<V>(PhantomData<fn() -> V>);

impl<V> SumAll<V> {
    pub fn new() -> Self {
        SumAll(PhantomData)
    }
}

impl<V> Default for SumAll<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExplorationMode for SumAll<V>
where
    V: Monoid + ModeResult,
{
    type Value = V;
    type Result = V;
    type Final = V;

    fn initial_result(&self) -> V {
        V::empty()
    }

    fn fold_leaf(&self, acc: &mut V, leaf: V, _location: Option<Location>) {
        let current = std::mem::replace(acc, V::empty());
        *acc = current.combine(leaf);
    }

    fn combine(&self, acc: &mut V, other: V) {
        let current = std::mem::replace(acc, V::empty());
        *acc = current.combine(other);
    }

    fn completion(&self, progress: &Progress<V>) -> Option<V> {
        progress.is_complete().then(|| progress.result.clone())
    }
}

/// Stop at the first leaf found.
pub struct FirstFound<V>(PhantomData<fn() -> V>);

impl<V> FirstFound<V> {
    pub fn new() -> Self {
        FirstFound(PhantomData)
    }
}

impl<V> Default for FirstFound<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExplorationMode for FirstFound<V>
where
    V: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    type Value = V;
    type Result = Option<Located<V>>;
    /// `None` when the tree was exhausted without finding anything.
    type Final = Option<Located<V>>;

    fn initial_result(&self) -> Self::Result {
        None
    }

    fn needs_location(&self) -> bool {
        true
    }

    fn fold_leaf(&self, acc: &mut Self::Result, leaf: V, location: Option<Location>) {
        if acc.is_none() {
            *acc = Some(Located {
                location: location.unwrap_or_default(),
                value: leaf,
            });
        }
    }

    fn combine(&self, acc: &mut Self::Result, other: Self::Result) {
        if acc.is_none() {
            *acc = other;
        }
    }

    fn completion(&self, progress: &Progress<Self::Result>) -> Option<Self::Final> {
        if progress.result.is_some() {
            Some(progress.result.clone())
        } else if progress.is_complete() {
            Some(None)
        } else {
            None
        }
    }

    fn leaf_completes(&self, acc: &Self::Result) -> bool {
        acc.is_some()
    }
}

/// How a predicate-bounded exploration ended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FoundOutcome<R> {
    /// The accumulated result satisfied the predicate; the tree may be only
    /// partially explored.
    Found(R),
    /// The tree was exhausted without satisfying the predicate.
    Exhausted(R),
}

impl<R> FoundOutcome<R> {
    pub fn into_result(self) -> R {
        match self {
            FoundOutcome::Found(result) | FoundOutcome::Exhausted(result) => result,
        }
    }

    pub fn was_found(&self) -> bool {
        matches!(self, FoundOutcome::Found(_))
    }
}

/// Sum until a predicate holds, checking at every supervisor fold.
pub struct StopWhenPull<V, P> {
    predicate: P,
    _marker: PhantomData<fn() -> V>,
}

impl<V, P> StopWhenPull<V, P> {
    pub fn new(predicate: P) -> Self {
        StopWhenPull {
            predicate,
            _marker: PhantomData,
        }
    }
}

impl<V, P> ExplorationMode for StopWhenPull<V, P>
where
    V: Monoid + ModeResult,
    P: Fn(&V) -> bool + Send + Sync + 'static,
{
    type Value = V;
    type Result = V;
    type Final = FoundOutcome<V>;

    fn initial_result(&self) -> V {
        V::empty()
    }

    fn fold_leaf(&self, acc: &mut V, leaf: V, _location: Option<Location>) {
        let current = std::mem::replace(acc, V::empty());
        *acc = current.combine(leaf);
    }

    fn combine(&self, acc: &mut V, other: V) {
        let current = std::mem::replace(acc, V::empty());
        *acc = current.combine(other);
    }

    fn completion(&self, progress: &Progress<V>) -> Option<Self::Final> {
        if (self.predicate)(&progress.result) {
            Some(FoundOutcome::Found(progress.result.clone()))
        } else if progress.is_complete() {
            Some(FoundOutcome::Exhausted(progress.result.clone()))
        } else {
            None
        }
    }
}

/// Sum until a predicate holds; workers flush every fold immediately, so the
/// supervisor observes the satisfying state as soon as it exists anywhere.
pub struct StopWhenPush<V, P> {
    inner: StopWhenPull<V, P>,
}

impl<V, P> StopWhenPush<V, P> {
    pub fn new(predicate: P) -> Self {
        StopWhenPush {
            inner: StopWhenPull::new(predicate),
        }
    }
}

impl<V, P> ExplorationMode for StopWhenPush<V, P>
where
    V: Monoid + ModeResult,
    P: Fn(&V) -> bool + Send + Sync + 'static,
{
    type Value = V;
    type Result = V;
    type Final = FoundOutcome<V>;

    fn initial_result(&self) -> V {
        self.inner.initial_result()
    }

    fn fold_leaf(&self, acc: &mut V, leaf: V, location: Option<Location>) {
        self.inner.fold_leaf(acc, leaf, location);
    }

    fn combine(&self, acc: &mut V, other: V) {
        self.inner.combine(acc, other);
    }

    fn completion(&self, progress: &Progress<V>) -> Option<Self::Final> {
        self.inner.completion(progress)
    }

    fn flush_immediately(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::Checkpoint;
    use crate::path::Branch;

    #[test]
    fn test_sum_all_completes_only_on_exhaustion() {
        let mode: SumAll<u64> = SumAll::new();
        let mut acc = mode.initial_result();
        mode.fold_leaf(&mut acc, 3, None);
        mode.fold_leaf(&mut acc, 4, None);
        assert_eq!(acc, 7);

        let partial = Progress::new(Checkpoint::Unexplored, acc);
        assert_eq!(mode.completion(&partial), None);
        let done = Progress::new(Checkpoint::Explored, 7u64);
        assert_eq!(mode.completion(&done), Some(7));
    }

    #[test]
    fn test_first_found_keeps_the_first_value() {
        let mode: FirstFound<u32> = FirstFound::new();
        let mut acc = mode.initial_result();
        let here: Location = [Branch::Left].into_iter().collect();
        mode.fold_leaf(&mut acc, 11, Some(here.clone()));
        mode.fold_leaf(&mut acc, 22, Some(Location::root()));
        assert_eq!(
            acc,
            Some(Located {
                location: here,
                value: 11
            })
        );
        assert!(mode.leaf_completes(&acc));

        let progress = Progress::new(Checkpoint::Unexplored, acc.clone());
        assert_eq!(mode.completion(&progress), Some(acc));
    }

    #[test]
    fn test_first_found_exhaustion_reports_none() {
        let mode: FirstFound<u32> = FirstFound::new();
        let progress = Progress::new(Checkpoint::Explored, None);
        assert_eq!(mode.completion(&progress), Some(None));
    }

    #[test]
    fn test_stop_when_predicate_fires_before_exhaustion() {
        let mode: StopWhenPull<u64, _> = StopWhenPull::new(|sum: &u64| *sum >= 3);
        let partial = Progress::new(Checkpoint::Unexplored, 3u64);
        assert_eq!(mode.completion(&partial), Some(FoundOutcome::Found(3)));
        let short = Progress::new(Checkpoint::Explored, 2u64);
        assert_eq!(mode.completion(&short), Some(FoundOutcome::Exhausted(2)));
        let unfinished = Progress::new(Checkpoint::Unexplored, 2u64);
        assert_eq!(mode.completion(&unfinished), None);
    }

    #[test]
    fn test_push_mode_flushes_immediately() {
        let pull: StopWhenPull<u64, fn(&u64) -> bool> = StopWhenPull::new(|s: &u64| *s > 0);
        let push: StopWhenPush<u64, fn(&u64) -> bool> = StopWhenPush::new(|s: &u64| *s > 0);
        assert!(!ExplorationMode::flush_immediately(&pull));
        assert!(ExplorationMode::flush_immediately(&push));
    }
}
