//! Node fixtures for graph and engine tests.

use crate::core::{ResourceKind, ResourceNode};

/// A bucket node named after its id.
#[must_use]
pub fn bucket(id: &str) -> ResourceNode {
    ResourceNode::new(id, ResourceKind::Bucket).with_config("name", id)
}

/// A linear chain where each node depends on the previous one.
#[must_use]
pub fn chain(ids: &[&str]) -> Vec<ResourceNode> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let node = bucket(id);
            if i == 0 {
                node
            } else {
                node.with_dependency(ids[i - 1])
            }
        })
        .collect()
}

/// `width` independent roots followed by one node depending on all of them.
#[must_use]
pub fn fan_in(width: usize) -> Vec<ResourceNode> {
    let roots: Vec<ResourceNode> = (0..width).map(|i| bucket(&format!("root-{i}"))).collect();
    let sink = bucket("sink").with_dependencies(roots.iter().map(|n| n.id.clone()));
    roots.into_iter().chain(std::iter::once(sink)).collect()
}

/// A layered graph: each node of layer `n` depends on every node of layer `n - 1`.
#[must_use]
pub fn layered(layers: usize, width: usize) -> Vec<ResourceNode> {
    let mut nodes = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for i in 0..width {
            let mut node = bucket(&format!("l{layer}-n{i}"));
            if layer > 0 {
                node = node.with_dependencies((0..width).map(|j| format!("l{}-n{j}", layer - 1)));
            }
            nodes.push(node);
        }
    }
    nodes
}
