//! Validated resource DAG with a fixed execution order.

use std::collections::HashMap;

use crate::core::ResourceNode;

/// A directed acyclic graph of resource nodes.
///
/// Constructed only through [`super::GraphBuilder`], so every dependency
/// resolves and the execution order is a valid topological order.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
    /// Node id to declaration index.
    index: HashMap<String, usize>,
    /// Execution order (topologically sorted).
    execution_order: Vec<String>,
}

impl ResourceGraph {
    pub(super) fn new(nodes: Vec<ResourceNode>, execution_order: Vec<String>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Self {
            nodes,
            index,
            execution_order,
        }
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns true if a node with `id` exists.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Returns a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Returns the nodes in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    /// Returns the execution order.
    #[must_use]
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Returns the nodes that declare `id` as a dependency, in execution order.
    #[must_use]
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.execution_order
            .iter()
            .filter(|other| {
                self.node(other)
                    .is_some_and(|n| n.depends_on.contains(id))
            })
            .map(String::as_str)
            .collect()
    }

    /// Groups node ids by dependency depth.
    ///
    /// Nodes in the same level have no dependency relation between them.
    #[must_use]
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();

        for id in &self.execution_order {
            let level = self
                .node(id)
                .map(|n| {
                    n.depends_on
                        .iter()
                        .filter_map(|d| depth.get(d.as_str()))
                        .map(|d| d + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            depth.insert(id.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id.clone());
        }

        levels
    }
}
