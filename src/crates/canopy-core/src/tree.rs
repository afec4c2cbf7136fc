//! Lazy binary search trees
//!
//! A [`Tree`] is a program of instructions describing a search space: leaves
//! carry results, `Null` is a dead branch, `Choice` forks into two lazily
//! produced sub-trees, `Cache` runs a user effect whose (encoded) value is
//! recorded into checkpoints, and `Yield` is a cooperative scheduling point.
//!
//! Children are [`Thunk`]s — boxed `FnOnce` producers — so a tree with an
//! astronomical number of nodes costs nothing until it is explored. A tree is
//! consumed by exploration; the framework re-creates one per workload from a
//! shared [`TreeBuilder`].
//!
//! # Determinism contract
//!
//! Parallel exploration replays paths and checkpoints against freshly built
//! trees. Every builder invocation must therefore produce the same tree, and
//! every `Cache` effect must produce the same bytes at the same position.
//! This contract is documented rather than enforced by types; violations
//! surface as [`WalkError::CacheMismatch`](crate::error::WalkError).
//!
//! # Example
//!
//! ```rust
//! use canopy_core::tree::Tree;
//!
//! // Choice(Choice(1, 2), Choice(3, 4))
//! let tree: Tree<u64> = Tree::choice(
//!     || Tree::choice(|| Tree::leaf(1), || Tree::leaf(2)),
//!     || Tree::choice(|| Tree::leaf(3), || Tree::leaf(4)),
//! );
//! let leaves: Vec<u64> = canopy_core::stepper::explore_whole(tree).unwrap();
//! assert_eq!(leaves, vec![1, 2, 3, 4]);
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Shared producer of fresh trees, invoked once per workload.
pub type TreeBuilder<T> = Arc<dyn Fn() -> Tree<T> + Send + Sync>;

/// A deferred sub-tree.
pub struct Thunk<T>(Box<dyn FnOnce() -> Tree<T> + Send>);

impl<T: Send + 'static> Thunk<T> {
    /// Wrap a producer function.
    pub fn new(produce: impl FnOnce() -> Tree<T> + Send + 'static) -> Self {
        Thunk(Box::new(produce))
    }

    /// Wrap an already materialized tree.
    pub fn ready(tree: Tree<T>) -> Self {
        Thunk(Box::new(move || tree))
    }

    /// Materialize the sub-tree. Consumes the thunk.
    pub fn force(self) -> Tree<T> {
        (self.0)()
    }
}

impl<T> fmt::Debug for Thunk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Thunk(..)")
    }
}

/// A cache instruction: an effect producing encoded bytes, and a continuation
/// consuming them.
///
/// The effect runs at most once per visit; when a checkpoint or path already
/// records the bytes, the effect is skipped and the continuation is fed the
/// recorded bytes instead.
pub struct CacheNode<T> {
    effect: Box<dyn FnOnce() -> Result<Option<Vec<u8>>, bincode::Error> + Send>,
    continuation: Box<dyn FnOnce(&[u8]) -> Result<Tree<T>, bincode::Error> + Send>,
}

impl<T> CacheNode<T> {
    /// Split into the effect and the continuation.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(
        self,
    ) -> (
        Box<dyn FnOnce() -> Result<Option<Vec<u8>>, bincode::Error> + Send>,
        Box<dyn FnOnce(&[u8]) -> Result<Tree<T>, bincode::Error> + Send>,
    ) {
        (self.effect, self.continuation)
    }
}

impl<T> fmt::Debug for CacheNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CacheNode(..)")
    }
}

/// One instruction of a search-space program.
#[derive(Debug)]
pub enum Tree<T> {
    /// A result leaf.
    Leaf(T),
    /// A dead branch: no results below here.
    Null,
    /// Run (or replay) a cached effect, then continue with its value.
    Cache(CacheNode<T>),
    /// Binary fork. The left branch is explored before the right.
    Choice(Thunk<T>, Thunk<T>),
    /// Cooperative yield point; the worker drains its control queue here.
    Yield(Thunk<T>),
}

impl<T: Send + 'static> Tree<T> {
    /// A single-result tree.
    pub fn leaf(value: T) -> Self {
        Tree::Leaf(value)
    }

    /// A tree with no results.
    pub fn null() -> Self {
        Tree::Null
    }

    /// Fork into two lazily produced sub-trees.
    pub fn choice(
        left: impl FnOnce() -> Tree<T> + Send + 'static,
        right: impl FnOnce() -> Tree<T> + Send + 'static,
    ) -> Self {
        Tree::Choice(Thunk::new(left), Thunk::new(right))
    }

    /// Insert a cooperative yield point before `rest`.
    pub fn yield_point(rest: impl FnOnce() -> Tree<T> + Send + 'static) -> Self {
        Tree::Yield(Thunk::new(rest))
    }

    /// Run `effect` and feed its value to `continuation`, recording the
    /// encoded value in checkpoints. An effect returning `None` kills the
    /// branch.
    ///
    /// The value is encoded with bincode at the boundary; checkpoints and
    /// paths only ever see opaque bytes.
    pub fn cached<V, E, K>(effect: E, continuation: K) -> Self
    where
        V: Serialize + DeserializeOwned,
        E: FnOnce() -> Option<V> + Send + 'static,
        K: FnOnce(V) -> Tree<T> + Send + 'static,
    {
        Tree::Cache(CacheNode {
            effect: Box::new(move || match effect() {
                Some(value) => bincode::serialize(&value).map(Some),
                None => Ok(None),
            }),
            continuation: Box::new(move |bytes| {
                let value: V = bincode::deserialize(bytes)?;
                Ok(continuation(value))
            }),
        })
    }

    /// Raw byte-level variant of [`Tree::cached`] for callers that manage
    /// their own encoding.
    pub fn cached_bytes<E, K>(effect: E, continuation: K) -> Self
    where
        E: FnOnce() -> Option<Vec<u8>> + Send + 'static,
        K: FnOnce(&[u8]) -> Tree<T> + Send + 'static,
    {
        Tree::Cache(CacheNode {
            effect: Box::new(move || Ok(effect())),
            continuation: Box::new(move |bytes| Ok(continuation(bytes))),
        })
    }

    /// Balanced fan-in over a list of alternatives.
    ///
    /// An empty list is `Null`; a singleton is the tree itself. Larger lists
    /// split in half under a `Choice`, so the fan-in depth is logarithmic.
    pub fn choose(mut options: Vec<Tree<T>>) -> Self {
        match options.len() {
            0 => Tree::Null,
            1 => match options.pop() {
                Some(tree) => tree,
                None => unreachable!("length was checked above"),
            },
            n => {
                let right = options.split_off(n / 2);
                Tree::Choice(
                    Thunk::new(move || Tree::choose(options)),
                    Thunk::new(move || Tree::choose(right)),
                )
            }
        }
    }

    /// Balanced fan-in over plain values.
    pub fn choose_values(values: Vec<T>) -> Self {
        Tree::choose(values.into_iter().map(Tree::Leaf).collect())
    }
}
