//! Parent-graph bookkeeping for cycle detection
//!
//! Every combinator records the pipeline shape it was built from: a leaf per
//! base cache (identified by the address of its shared allocation) and a node
//! per combinator, listing its parents in order. The graph is built at
//! construction time and never mutated, so composing can reject a pipeline
//! that would reach the same base cache twice before anything is constructed.

use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) enum Topology {
    Leaf(usize),
    Node(Vec<Topology>),
}

impl Topology {
    /// Identity of a base cache: the address of its `Arc` allocation.
    ///
    /// Two handles cloned from the same `Arc` share a leaf; two separately
    /// constructed caches never do, even if they are behaviorally identical.
    pub(crate) fn leaf<T: ?Sized>(cache: &Arc<T>) -> Self {
        Topology::Leaf(Arc::as_ptr(cache) as *const () as usize)
    }

    pub(crate) fn node(parents: Vec<Topology>) -> Self {
        Topology::Node(parents)
    }

    /// Flattens nested nodes into base-cache identities, iteratively.
    pub(crate) fn leaves(&self) -> Vec<usize> {
        let mut pending = vec![self];
        let mut leaves = Vec::new();

        while let Some(topology) = pending.pop() {
            match topology {
                Topology::Leaf(id) => leaves.push(*id),
                Topology::Node(parents) => pending.extend(parents.iter()),
            }
        }

        leaves
    }

    /// True when any base cache is reachable through more than one path.
    pub(crate) fn has_duplicate_leaves(&self) -> bool {
        let mut seen = HashSet::new();
        self.leaves().into_iter().any(|id| !seen.insert(id))
    }
}
