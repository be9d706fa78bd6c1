//! Dependency graph of the packages installed under one root.

use anyhow::Result;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::error::PackageError;
use crate::index::InstalledIndex;
use crate::runtime::Runtime;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DependencyNode {
    pub id: String,
    /// Ids depending on this node.
    pub dependents: Vec<String>,
    /// Ids this node depends on, in declaration order.
    pub dependencies: Vec<String>,
}

/// Nodes for every sub-package declared or referenced under `root`, ordered
/// so that each node comes after all of its dependencies.
#[tracing::instrument(skip(runtime, index))]
pub fn build_graph<R: Runtime>(
    runtime: &R,
    index: &mut InstalledIndex,
    root: &Path,
) -> Result<Vec<DependencyNode>> {
    let mut builder = GraphBuilder::default();
    for entry in index.fetch(runtime, root)? {
        for (id, sub_package) in entry.metadata.iter() {
            builder.node(id);
            for (dependency, _) in &sub_package.dependencies {
                builder.edge(id, dependency);
            }
        }
    }
    builder.sort()
}

#[derive(Default)]
struct GraphBuilder {
    nodes: Vec<DependencyNode>,
    positions: HashMap<String, usize>,
}

impl GraphBuilder {
    fn node(&mut self, id: &str) -> usize {
        if let Some(&position) = self.positions.get(id) {
            return position;
        }
        self.nodes.push(DependencyNode {
            id: id.to_string(),
            ..Default::default()
        });
        let position = self.nodes.len() - 1;
        self.positions.insert(id.to_string(), position);
        position
    }

    fn edge(&mut self, from: &str, to: &str) {
        let from_position = self.node(from);
        let to_position = self.node(to);

        let from_node = &mut self.nodes[from_position];
        if !from_node.dependencies.iter().any(|d| d == to) {
            from_node.dependencies.push(to.to_string());
        }
        let to_node = &mut self.nodes[to_position];
        if !to_node.dependents.iter().any(|d| d == from) {
            to_node.dependents.push(from.to_string());
        }
    }

    /// Kahn's algorithm in rounds. Each round takes, in insertion order, every
    /// node whose dependencies were all taken in earlier rounds.
    fn sort(self) -> Result<Vec<DependencyNode>> {
        let mut remaining = self.nodes;
        let mut ordered: Vec<DependencyNode> = Vec::with_capacity(remaining.len());
        let mut done: HashSet<String> = HashSet::new();

        loop {
            let (ready, blocked): (Vec<_>, Vec<_>) = remaining
                .into_iter()
                .partition(|node| node.dependencies.iter().all(|d| done.contains(d)));
            remaining = blocked;

            if ready.is_empty() {
                break;
            }
            debug!(
                "Graph round: {:?}",
                ready.iter().map(|n| n.id.as_str()).collect::<Vec<_>>()
            );
            done.extend(ready.iter().map(|node| node.id.clone()));
            ordered.extend(ready);
        }

        if !remaining.is_empty() {
            return Err(PackageError::CyclicDependency {
                packages: remaining.into_iter().map(|node| node.id).collect(),
            }
            .into());
        }
        Ok(ordered)
    }
}
