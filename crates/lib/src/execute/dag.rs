//! Module dependency DAG for build ordering.
//!
//! This module provides a directed acyclic graph over the requested modules
//! and computes parallel execution waves.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

use crate::module::Module;

use super::types::ExecuteError;

/// A DAG representing module dependencies for execution planning.
///
/// Edges run from a dependency to its dependent. Dependencies on modules that
/// are not part of the request are ignored; they are assumed to be built or
/// provided already.
pub struct ModuleDag {
  graph: DiGraph<Arc<Module>, ()>,
  nodes: HashMap<String, NodeIndex>,
}

impl ModuleDag {
  /// Build the DAG, keeping the first definition of duplicated names.
  pub fn new(modules: &[Arc<Module>]) -> Result<Self, ExecuteError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for module in modules {
      if nodes.contains_key(&module.name) {
        continue;
      }
      let idx = graph.add_node(module.clone());
      nodes.insert(module.name.clone(), idx);
    }

    let mut edges = Vec::new();
    for dependent in graph.node_indices() {
      let module = &graph[dependent];
      for dep in &module.dependencies {
        match nodes.get(dep) {
          Some(&dep_idx) => edges.push((dep_idx, dependent)),
          None => debug!(module = %module.name, dependency = %dep, "dependency outside the request, ignoring"),
        }
      }
    }
    for (dep, dependent) in edges {
      graph.add_edge(dep, dependent, ());
    }

    let dag = Self { graph, nodes };
    toposort(&dag.graph, None).map_err(|_| ExecuteError::CycleDetected)?;
    Ok(dag)
  }

  /// Modules grouped into waves. Every module's dependencies are in earlier
  /// waves; within a wave, modules keep their request order.
  pub fn waves(&self) -> Result<Vec<Vec<Arc<Module>>>, ExecuteError> {
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();

    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let (ready, rest): (Vec<NodeIndex>, Vec<NodeIndex>) =
        remaining.into_iter().partition(|idx| in_degree[idx.index()] == 0);

      if ready.is_empty() {
        return Err(ExecuteError::CycleDetected);
      }

      for &idx in &ready {
        for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          in_degree[next.index()] = in_degree[next.index()].saturating_sub(1);
        }
      }

      waves.push(ready.into_iter().map(|idx| self.graph[idx].clone()).collect());
      remaining = rest;
    }

    Ok(waves)
  }

  /// Direct dependencies of `name` within the DAG.
  pub fn dependencies(&self, name: &str) -> Vec<&str> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };

    self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep| self.graph[dep].name.as_str())
      .collect()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
