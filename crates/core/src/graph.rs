use crate::error::{Result, ShutdownError};
use crate::node::{BoxedAction, Node};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

struct Entry {
    name: String,
    action: BoxedAction,
}

/// Shutdown dependencies as registered, before execution starts.
///
/// Edges point from a dependency to its dependent, so a dependent's action
/// runs first. Dependencies must exist before anything names them, which
/// keeps the graph acyclic without a separate check.
#[derive(Default)]
pub(crate) struct DependencyGraph {
    graph: DiGraph<Entry, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a node. Nothing is mutated unless every check passes.
    pub(crate) fn add(&mut self, name: String, action: BoxedAction, dependencies: &[&str]) -> Result<()> {
        if self.indices.contains_key(&name) {
            return Err(ShutdownError::NodeExists(name));
        }

        let mut parents = Vec::with_capacity(dependencies.len());
        for dependency in dependencies {
            let index = self
                .indices
                .get(*dependency)
                .ok_or_else(|| ShutdownError::NodeNotFound(dependency.to_string()))?;

            // Repeated names collapse into a single edge
            if !parents.contains(index) {
                parents.push(*index);
            }
        }

        let node = self.graph.add_node(Entry {
            name: name.clone(),
            action,
        });
        for parent in parents {
            self.graph.add_edge(parent, node, ());
        }
        self.indices.insert(name, node);

        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub(crate) fn names(&self) -> BTreeSet<String> {
        self.indices.keys().cloned().collect()
    }

    /// Nodes this node waits on at shutdown, i.e. its declared parents.
    pub(crate) fn dependencies(&self, name: &str) -> Option<BTreeSet<String>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Nodes that declared this node as a parent.
    pub(crate) fn dependents(&self, name: &str) -> Option<BTreeSet<String>> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Nodes registered without parents. The walk starts here and they run last.
    pub(crate) fn roots(&self) -> BTreeSet<String> {
        self.graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .neighbors_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].name.clone())
            .collect()
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Option<BTreeSet<String>> {
        let node = self.indices.get(name)?;

        Some(
            self.graph
                .neighbors_directed(*node, direction)
                .map(|n| self.graph[n].name.clone())
                .collect(),
        )
    }

    /// Flatten into index-addressed execution nodes. `NodeIndex::index()` is
    /// the position in the returned vector.
    pub(crate) fn into_nodes(self) -> Vec<Node> {
        let links: Vec<(Vec<usize>, Vec<usize>)> = self
            .graph
            .node_indices()
            .map(|n| {
                let dependencies = self
                    .graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|i| i.index())
                    .collect();
                let dependents = self
                    .graph
                    .neighbors_directed(n, Direction::Outgoing)
                    .map(|i| i.index())
                    .collect();
                (dependencies, dependents)
            })
            .collect();

        let (entries, _edges) = self.graph.into_nodes_edges();

        entries
            .into_iter()
            .zip(links)
            .map(|(entry, (dependencies, dependents))| {
                Node::new(
                    entry.weight.name,
                    entry.weight.action,
                    dependencies,
                    dependents,
                )
            })
            .collect()
    }
}
