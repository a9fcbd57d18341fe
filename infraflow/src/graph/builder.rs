//! Graph builder with validation.

use std::collections::HashMap;

use super::ResourceGraph;
use crate::core::{collect_references, Reference, ResourceNode};
use crate::errors::{
    ContractErrorInfo, CycleError, DanglingReferenceError, InfraflowError, ValidationError,
};

/// Builder for creating validated resource graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    /// Nodes in declaration order.
    nodes: Vec<ResourceNode>,
}

impl GraphBuilder {
    /// Creates an empty graph builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    #[must_use]
    pub fn node(mut self, node: ResourceNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds several nodes, keeping their order.
    #[must_use]
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = ResourceNode>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// Returns the number of declared nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validates the declared nodes and computes the execution order.
    ///
    /// Nodes without an ordering constraint between them keep their
    /// declaration order, so identical input always yields the same plan.
    ///
    /// # Errors
    ///
    /// - [`InfraflowError::Validation`] for malformed or duplicate ids and
    ///   references to nodes outside the dependency set
    /// - [`InfraflowError::DanglingReference`] for an undeclared dependency
    /// - [`InfraflowError::Cycle`] for a dependency cycle, including self-loops
    pub fn build(self) -> Result<ResourceGraph, InfraflowError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());

        for (i, node) in self.nodes.iter().enumerate() {
            node.validate()?;
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(ValidationError::new(format!("Node '{}' is declared twice", node.id))
                    .with_nodes(vec![node.id.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "GRAPH-003-DUPLICATE",
                            format!("Duplicate node id '{}'", node.id),
                        )
                        .with_fix_hint("Give every node a unique id."),
                    )
                    .into());
            }
        }

        for node in &self.nodes {
            for dep in &node.depends_on {
                if dep == &node.id {
                    return Err(CycleError::new(vec![node.id.clone(), node.id.clone()]).into());
                }
                if !index.contains_key(dep.as_str()) {
                    return Err(DanglingReferenceError::new(dep.clone(), node.id.clone()).into());
                }
            }
            check_references(node)?;
        }

        let order = topological_sort(&self.nodes, &index)?;
        Ok(ResourceGraph::new(self.nodes, order))
    }
}

/// Builds a graph from declared nodes.
///
/// # Errors
///
/// See [`GraphBuilder::build`].
pub fn build(nodes: impl IntoIterator<Item = ResourceNode>) -> Result<ResourceGraph, InfraflowError> {
    GraphBuilder::new().nodes(nodes).build()
}

/// Every `$ref` must be well formed and point at a declared dependency.
fn check_references(node: &ResourceNode) -> Result<(), ValidationError> {
    for raw in collect_references(&node.config) {
        let declared = Reference::parse(&raw).is_some_and(|r| node.depends_on.contains(&r.node_id));
        if !declared {
            return Err(ValidationError::new(format!(
                "Node '{}' references '{}' outside its dependencies",
                node.id, raw
            ))
            .with_nodes(vec![node.id.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "GRAPH-005-UNDECLARED_REF",
                    format!("Reference '{raw}' is not covered by a dependency"),
                )
                .with_context_entry("reference", raw.clone()),
            ));
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Depth-first topological sort with visiting/visited coloring.
fn topological_sort(
    nodes: &[ResourceNode],
    index: &HashMap<&str, usize>,
) -> Result<Vec<String>, CycleError> {
    fn visit(
        i: usize,
        nodes: &[ResourceNode],
        index: &HashMap<&str, usize>,
        marks: &mut [Option<Mark>],
        path: &mut Vec<usize>,
        result: &mut Vec<String>,
    ) -> Result<(), CycleError> {
        match marks[i] {
            Some(Mark::Visited) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|&p| p == i).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&p| nodes[p].id.clone()).collect();
                cycle.push(nodes[i].id.clone());
                return Err(CycleError::new(cycle));
            }
            None => {}
        }

        marks[i] = Some(Mark::Visiting);
        path.push(i);

        // Dependencies are visited in declaration order for determinism.
        let mut deps: Vec<usize> = nodes[i]
            .depends_on
            .iter()
            .filter_map(|d| index.get(d.as_str()).copied())
            .collect();
        deps.sort_unstable();
        for dep in deps {
            visit(dep, nodes, index, marks, path, result)?;
        }

        path.pop();
        marks[i] = Some(Mark::Visited);
        result.push(nodes[i].id.clone());
        Ok(())
    }

    let mut marks = vec![None; nodes.len()];
    let mut path = Vec::new();
    let mut result = Vec::with_capacity(nodes.len());

    // Roots are visited in declaration order for the tie-break.
    for i in 0..nodes.len() {
        visit(i, nodes, index, &mut marks, &mut path, &mut result)?;
    }

    Ok(result)
}
