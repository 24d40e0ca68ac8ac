//! Dependency graph traversal queries

use crate::model::{Edge, EdgeKind, Node};
use crate::store::Store;
use serde::Serialize;

/// Edges within reach of a node, grouped by direction
#[derive(Debug, Serialize)]
pub struct Neighborhood {
    pub dependencies: Vec<Edge>,
    pub dependents: Vec<Edge>,
}

/// Read-only query interface over the stored edge set.
///
/// Depth 1 returns direct edges; depth n unions direct edges with the
/// depth n-1 edges of each neighbor. Results are flat edge lists; callers
/// deduplicate by (source, target, kind) when needed. Cycles are not
/// detected; the depth parameter is the only bound.
pub struct Graph<'a> {
    store: &'a Store,
}

impl<'a> Graph<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Edges where `node_id` is the target: who depends on this node
    pub fn dependents(
        &self,
        node_id: &str,
        kind: Option<EdgeKind>,
        depth: usize,
    ) -> crate::Result<Vec<Edge>> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let mut edges = self.store.get_edges(None, Some(node_id), kind)?;
        if depth > 1 {
            let direct = edges.clone();
            for edge in direct {
                edges.extend(self.dependents(&edge.source_id, kind, depth - 1)?);
            }
        }
        Ok(edges)
    }

    /// Edges where `node_id` is the source: what this node depends on
    pub fn dependencies(
        &self,
        node_id: &str,
        kind: Option<EdgeKind>,
        depth: usize,
    ) -> crate::Result<Vec<Edge>> {
        if depth == 0 {
            return Ok(Vec::new());
        }
        let mut edges = self.store.get_edges(Some(node_id), None, kind)?;
        if depth > 1 {
            let direct = edges.clone();
            for edge in direct {
                edges.extend(self.dependencies(&edge.target_id, kind, depth - 1)?);
            }
        }
        Ok(edges)
    }

    pub fn callers(&self, node_id: &str, depth: usize) -> crate::Result<Vec<Edge>> {
        self.dependents(node_id, Some(EdgeKind::Calls), depth)
    }

    pub fn callees(&self, node_id: &str, depth: usize) -> crate::Result<Vec<Edge>> {
        self.dependencies(node_id, Some(EdgeKind::Calls), depth)
    }

    pub fn importers(&self, node_id: &str) -> crate::Result<Vec<Edge>> {
        self.dependents(node_id, Some(EdgeKind::Imports), 1)
    }

    pub fn imports(&self, node_id: &str) -> crate::Result<Vec<Edge>> {
        self.dependencies(node_id, Some(EdgeKind::Imports), 1)
    }

    /// Inheritance chain upward
    pub fn superclasses(&self, node_id: &str, depth: usize) -> crate::Result<Vec<Edge>> {
        self.dependencies(node_id, Some(EdgeKind::Inherits), depth)
    }

    /// Inheritance chain downward
    pub fn subclasses(&self, node_id: &str, depth: usize) -> crate::Result<Vec<Edge>> {
        self.dependents(node_id, Some(EdgeKind::Inherits), depth)
    }

    /// Both directions at once
    pub fn neighborhood(&self, node_id: &str, depth: usize) -> crate::Result<Neighborhood> {
        Ok(Neighborhood {
            dependencies: self.dependencies(node_id, None, depth)?,
            dependents: self.dependents(node_id, None, depth)?,
        })
    }

    /// Resolve a target string to a node: exact id match first, then a
    /// unique short-name match. Ambiguous names resolve to nothing.
    pub fn resolve_target(&self, target_name: &str) -> crate::Result<Option<Node>> {
        if let Some(node) = self.store.get_node(target_name)? {
            return Ok(Some(node));
        }
        let mut candidates = self.store.list_nodes(None, None, Some(target_name), None)?;
        if candidates.len() == 1 {
            return Ok(candidates.pop());
        }
        Ok(None)
    }
}
