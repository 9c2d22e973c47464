//! Dependency graph over resolved sources.
//!
//! Resolution decides *which* sources can be linked; this graph decides the
//! order they are handed to the linker in. Dependencies come before their
//! dependents, and the order is stable for a given input set.

use anyhow::{Result, anyhow};
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::RevisionMatcher;
use crate::source::{SourceIdentifier, SourceInfo};

/// Directed graph where an edge `b -> a` means `a` imports or includes `b`,
/// so `b` has to be linked first.
///
/// Belongs-to references are not edges: a submodule and the module including
/// it would otherwise always form a cycle.
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<SourceIdentifier, ()>,
    /// Map from identifiers to their graph indices.
    node_map: HashMap<SourceIdentifier, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Build the graph of `resolved` sources.
    ///
    /// `resolved` must be in resolution order. Each import or include becomes one
    /// edge, to the satisfying identifier that resolved first: the one the
    /// resolver admitted the dependent with. Every edge therefore points forward
    /// in `resolved`, and the graph is acyclic. Nodes and edges are inserted in
    /// identifier order so the resulting ordering is reproducible.
    pub fn from_resolved(
        sources: &BTreeMap<SourceIdentifier, SourceInfo>,
        resolved: &[SourceIdentifier],
        matcher: &dyn RevisionMatcher,
    ) -> Self {
        let mut graph = Self::new();
        let available: BTreeSet<SourceIdentifier> = resolved.iter().cloned().collect();
        let position: HashMap<&SourceIdentifier, usize> =
            resolved.iter().enumerate().map(|(index, id)| (id, index)).collect();

        for id in &available {
            graph.ensure_node(id.clone());
        }

        for id in &available {
            let Some(info) = sources.get(id) else {
                continue;
            };
            for dependency in info.requirements() {
                let target = matcher
                    .candidates(dependency, &available)
                    .into_iter()
                    .filter(|candidate| candidate != id)
                    .min_by_key(|candidate| position.get(candidate).copied().unwrap_or(usize::MAX));
                if let Some(target) = target {
                    graph.add_dependency(id.clone(), target);
                }
            }
        }

        graph
    }

    /// Add a node to the graph if it doesn't already exist.
    ///
    /// Returns the node index in the graph.
    fn ensure_node(&mut self, node: SourceIdentifier) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&node) {
            index
        } else {
            let index = self.graph.add_node(node.clone());
            self.node_map.insert(node, index);
            index
        }
    }

    /// Add a dependency relationship to the graph.
    ///
    /// `from` depends on `to`, meaning `to` must be linked before `from`.
    pub fn add_dependency(&mut self, from: SourceIdentifier, to: SourceIdentifier) {
        let from_idx = self.ensure_node(from);
        let to_idx = self.ensure_node(to);

        if !self.graph.contains_edge(to_idx, from_idx) {
            self.graph.add_edge(to_idx, from_idx, ());
        }
    }

    /// Get the order in which sources should be linked.
    ///
    /// Returns identifiers in an order where all dependencies come before their dependents.
    /// A cycle is reported with every source taking part in it.
    pub fn topological_order(&self) -> Result<Vec<SourceIdentifier>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices.into_iter().map(|idx| self.graph[idx].clone()).collect()),
            Err(cycle) => {
                let mut members: Vec<&SourceIdentifier> = tarjan_scc(&self.graph)
                    .into_iter()
                    .find(|component| component.contains(&cycle.node_id()))
                    .unwrap_or_else(|| vec![cycle.node_id()])
                    .into_iter()
                    .map(|idx| &self.graph[idx])
                    .collect();
                members.sort();
                let members: Vec<String> = members.iter().map(ToString::to_string).collect();
                Err(anyhow!("Circular dependency detected among {{{}}}", members.join(", ")))
            }
        }
    }

    /// Direct dependencies of `node`, in identifier order.
    pub fn direct_dependencies(&self, node: &SourceIdentifier) -> Vec<SourceIdentifier> {
        let Some(&node_idx) = self.node_map.get(node) else {
            return Vec::new();
        };
        let mut deps: Vec<_> = self
            .graph
            .neighbors_directed(node_idx, Direction::Incoming)
            .map(|idx| self.graph[idx].clone())
            .collect();
        deps.sort();
        deps
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the total number of edges (dependencies) in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}
