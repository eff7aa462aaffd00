//! Per-module phase graph.
//!
//! Phases form a DAG through their prerequisites. The graph is validated once
//! when constructed, and the execution order is computed with Kahn's algorithm,
//! breaking ties by declaration order so the order is stable.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named step in building one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
  pub name: String,

  /// Phases of the same module that must complete first.
  #[serde(default)]
  pub prerequisites: Vec<String>,

  /// Phases to re-enter from if this phase fails.
  #[serde(default, rename = "recovery")]
  pub recovery_phases: Vec<String>,
}

impl Phase {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      prerequisites: Vec::new(),
      recovery_phases: Vec::new(),
    }
  }

  pub fn after(mut self, prerequisites: &[&str]) -> Self {
    self.prerequisites.extend(prerequisites.iter().map(|p| p.to_string()));
    self
  }

  pub fn recover_from(mut self, phases: &[&str]) -> Self {
    self.recovery_phases.extend(phases.iter().map(|p| p.to_string()));
    self
  }
}

/// Malformed phase declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseGraphError {
  #[error("phase prerequisites form a cycle involving '{0}'")]
  CyclicPhaseGraph(String),

  #[error("phase '{referenced_by}' references unknown phase '{phase}'")]
  UnknownPhase { phase: String, referenced_by: String },

  #[error("phase '{0}' is declared more than once")]
  DuplicatePhase(String),
}

/// Validated phases of a module together with their execution order.
#[derive(Debug, Clone, Default)]
pub struct PhaseGraph {
  phases: Vec<Phase>,
  /// Declaration indices in execution order.
  order: Vec<usize>,
  /// Phase name -> position in `order`.
  positions: HashMap<String, usize>,
}

impl PhaseGraph {
  pub fn new(phases: Vec<Phase>) -> Result<Self, PhaseGraphError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(phases.len(), 0);
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

    for (idx, phase) in phases.iter().enumerate() {
      if nodes.insert(phase.name.as_str(), graph.add_node(idx)).is_some() {
        return Err(PhaseGraphError::DuplicatePhase(phase.name.clone()));
      }
    }

    for phase in &phases {
      let dependent = nodes[phase.name.as_str()];
      for prerequisite in &phase.prerequisites {
        let Some(&dep) = nodes.get(prerequisite.as_str()) else {
          return Err(PhaseGraphError::UnknownPhase {
            phase: prerequisite.clone(),
            referenced_by: phase.name.clone(),
          });
        };
        graph.add_edge(dep, dependent, ());
      }
      if let Some(missing) = phase.recovery_phases.iter().find(|r| !nodes.contains_key(r.as_str())) {
        return Err(PhaseGraphError::UnknownPhase {
          phase: missing.clone(),
          referenced_by: phase.name.clone(),
        });
      }
    }

    let order = stable_topological_order(&graph)
      .map_err(|idx| PhaseGraphError::CyclicPhaseGraph(phases[idx].name.clone()))?;

    let positions = order
      .iter()
      .enumerate()
      .map(|(pos, &idx)| (phases[idx].name.clone(), pos))
      .collect();

    Ok(Self {
      phases,
      order,
      positions,
    })
  }

  /// A graph without phases (system modules).
  pub fn empty() -> Self {
    Self::default()
  }

  /// Phases in execution order.
  pub fn ordered(&self) -> impl Iterator<Item = &Phase> {
    self.order.iter().map(|&idx| &self.phases[idx])
  }

  /// Phases in declaration order.
  pub fn declared(&self) -> &[Phase] {
    &self.phases
  }

  pub fn get(&self, name: &str) -> Option<&Phase> {
    self.position(name).map(|pos| self.at(pos))
  }

  /// Position of a phase in the execution order.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.positions.get(name).copied()
  }

  fn at(&self, position: usize) -> &Phase {
    &self.phases[self.order[position]]
  }

  /// The phase preceding `name` in execution order.
  pub fn before(&self, name: &str) -> Option<&Phase> {
    let pos = self.position(name)?;
    pos.checked_sub(1).map(|p| self.at(p))
  }

  /// The phase among `names` that comes first in execution order.
  pub fn earliest<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> Option<&Phase> {
    names
      .into_iter()
      .filter_map(|name| self.position(name))
      .min()
      .map(|pos| self.at(pos))
  }

  pub fn last(&self) -> Option<&Phase> {
    self.order.last().map(|&idx| &self.phases[idx])
  }

  pub fn len(&self) -> usize {
    self.phases.len()
  }

  pub fn is_empty(&self) -> bool {
    self.phases.is_empty()
  }
}

/// Kahn's algorithm preferring the lowest declaration index among ready nodes.
///
/// On a cycle, returns the declaration index of the first phase that could not
/// be ordered.
fn stable_topological_order(graph: &DiGraph<usize, ()>) -> Result<Vec<usize>, usize> {
  let mut in_degree: Vec<usize> = graph
    .node_indices()
    .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
    .collect();

  let mut ready: BinaryHeap<Reverse<usize>> = graph
    .node_indices()
    .filter(|idx| in_degree[idx.index()] == 0)
    .map(|idx| Reverse(graph[idx]))
    .collect();

  let mut order = Vec::with_capacity(graph.node_count());
  while let Some(Reverse(idx)) = ready.pop() {
    order.push(idx);
    for next in graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
      let degree = &mut in_degree[next.index()];
      *degree -= 1;
      if *degree == 0 {
        ready.push(Reverse(graph[next]));
      }
    }
  }

  if order.len() < graph.node_count() {
    let stuck = (0..graph.node_count()).find(|idx| !order.contains(idx)).unwrap_or_default();
    return Err(stuck);
  }

  Ok(order)
}
