//! Kind-level dependency graph.
//!
//! Edges read "parent must exist before child". The graph orders
//! aggregate construction and create events (parents first) and delete
//! events (children first). It is a plain value handed to whoever needs
//! it, so tests can build alternate graphs.

use crate::error::{GraphError, GraphResult};
use crate::types::EntityKind;
use std::collections::{BTreeMap, BTreeSet};

/// Edges of the standard gateway graph as `(parent, child)` pairs.
pub const STANDARD_EDGES: &[(EntityKind, EntityKind)] = &[
    (EntityKind::Service, EntityKind::Route),
    (EntityKind::Upstream, EntityKind::Target),
    (EntityKind::Service, EntityKind::Plugin),
    (EntityKind::Route, EntityKind::Plugin),
    (EntityKind::Consumer, EntityKind::Plugin),
    (EntityKind::Consumer, EntityKind::KeyAuth),
    (EntityKind::Consumer, EntityKind::HmacAuth),
    (EntityKind::Consumer, EntityKind::JwtAuth),
    (EntityKind::Consumer, EntityKind::BasicAuth),
];

/// A directed acyclic graph over entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    parents: BTreeMap<EntityKind, BTreeSet<EntityKind>>,
    order: Vec<EntityKind>,
}

impl DependencyGraph {
    /// Builds a graph from `(parent, child)` edges.
    ///
    /// Fails with [`GraphError::Cycle`] if the edges are cyclic. Every kind
    /// appears in the resulting order, with or without edges.
    pub fn new(edges: &[(EntityKind, EntityKind)]) -> GraphResult<Self> {
        let mut parents: BTreeMap<EntityKind, BTreeSet<EntityKind>> = EntityKind::ALL
            .iter()
            .map(|&kind| (kind, BTreeSet::new()))
            .collect();
        for &(parent, child) in edges {
            parents.entry(child).or_default().insert(parent);
        }

        let order = topological_sort(&parents)?;
        Ok(Self { parents, order })
    }

    /// The standard gateway graph.
    pub fn standard() -> GraphResult<Self> {
        Self::new(STANDARD_EDGES)
    }

    /// Kinds ordered parents first. Ties break on kind declaration order.
    #[must_use]
    pub fn topological_order(&self) -> &[EntityKind] {
        &self.order
    }

    /// Kinds ordered children first.
    pub fn reverse_order(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.order.iter().rev().copied()
    }

    /// Direct parents of `kind`.
    pub fn parents_of(&self, kind: EntityKind) -> impl Iterator<Item = EntityKind> + '_ {
        self.parents.get(&kind).into_iter().flatten().copied()
    }

    /// Returns true if `child` has a direct edge from `parent`.
    #[must_use]
    pub fn depends_on(&self, child: EntityKind, parent: EntityKind) -> bool {
        self.parents
            .get(&child)
            .is_some_and(|parents| parents.contains(&parent))
    }

    /// Position of `kind` in the topological order.
    #[must_use]
    pub fn rank(&self, kind: EntityKind) -> usize {
        self.order
            .iter()
            .position(|&k| k == kind)
            .unwrap_or(self.order.len())
    }
}

/// Kahn's algorithm; the ready set is ordered so output is deterministic.
fn topological_sort(
    parents: &BTreeMap<EntityKind, BTreeSet<EntityKind>>,
) -> GraphResult<Vec<EntityKind>> {
    let mut pending: BTreeMap<EntityKind, usize> = parents
        .iter()
        .map(|(&kind, set)| (kind, set.len()))
        .collect();
    let mut ready: BTreeSet<EntityKind> = pending
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&kind, _)| kind)
        .collect();
    let mut order = Vec::with_capacity(parents.len());

    while let Some(kind) = ready.pop_first() {
        pending.remove(&kind);
        order.push(kind);
        for (&child, set) in parents {
            if set.contains(&kind) {
                if let Some(count) = pending.get_mut(&child) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(child);
                    }
                }
            }
        }
    }

    if pending.is_empty() {
        Ok(order)
    } else {
        Err(GraphError::Cycle {
            remaining: pending.into_keys().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_order() {
        let graph = DependencyGraph::standard().unwrap();
        assert_eq!(
            graph.topological_order(),
            &[
                EntityKind::Service,
                EntityKind::Route,
                EntityKind::Upstream,
                EntityKind::Target,
                EntityKind::Certificate,
                EntityKind::Consumer,
                EntityKind::Plugin,
                EntityKind::KeyAuth,
                EntityKind::HmacAuth,
                EntityKind::JwtAuth,
                EntityKind::BasicAuth,
            ]
        );
    }

    #[test]
    fn parents_precede_children() {
        let graph = DependencyGraph::standard().unwrap();
        for &(parent, child) in STANDARD_EDGES {
            assert!(graph.rank(parent) < graph.rank(child), "{parent} before {child}");
        }
    }

    #[test]
    fn reverse_order_puts_children_first() {
        let graph = DependencyGraph::standard().unwrap();
        let reverse: Vec<_> = graph.reverse_order().collect();
        assert_eq!(reverse.first(), Some(&EntityKind::BasicAuth));
        assert_eq!(reverse.last(), Some(&EntityKind::Service));
    }

    #[test]
    fn edge_queries() {
        let graph = DependencyGraph::standard().unwrap();
        assert!(graph.depends_on(EntityKind::Plugin, EntityKind::Route));
        assert!(!graph.depends_on(EntityKind::Route, EntityKind::Plugin));
        let parents: Vec<_> = graph.parents_of(EntityKind::Plugin).collect();
        assert_eq!(
            parents,
            vec![EntityKind::Service, EntityKind::Route, EntityKind::Consumer]
        );
    }

    #[test]
    fn cycle_fails_fast() {
        let edges = [
            (EntityKind::Service, EntityKind::Route),
            (EntityKind::Route, EntityKind::Service),
        ];
        let err = DependencyGraph::new(&edges).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                remaining: vec![EntityKind::Service, EntityKind::Route]
            }
        );
    }

    #[test]
    fn self_edge_is_a_cycle() {
        let edges = [(EntityKind::Plugin, EntityKind::Plugin)];
        assert!(DependencyGraph::new(&edges).is_err());
    }

    #[test]
    fn empty_graph_orders_by_declaration() {
        let graph = DependencyGraph::new(&[]).unwrap();
        assert_eq!(graph.topological_order(), &EntityKind::ALL);
    }
}
