//! Types for module and phase execution.
//!
//! This module defines the error types, outcome types, and configuration
//! for running module phases.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::phase::ModuleType;
use crate::state::StateStoreError;

/// Errors reported by a phase handler.
#[derive(Debug, Error)]
pub enum HandlerError {
  /// The phase command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {command}")]
  CommandFailed { command: String, code: Option<i32> },

  /// The phase was interrupted before it finished.
  #[error("interrupted{}", .signal.map(|s| format!(" by signal {}", s)).unwrap_or_default())]
  Interrupted { signal: Option<i32> },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("{0}")]
  Other(String),
}

/// Errors that can occur while executing modules.
#[derive(Debug, Error)]
pub enum ExecuteError {
  /// A phase handler failed.
  #[error("phase {phase} of {module} failed: {source}")]
  Handler {
    module: String,
    phase: String,
    #[source]
    source: HandlerError,
  },

  /// Build state could not be read or written.
  #[error("build state error: {0}")]
  StateStore(#[from] StateStoreError),

  /// No handler is registered for the module's type.
  #[error("no phase handler for {module} (type {module_type})")]
  NoHandler { module: String, module_type: ModuleType },

  /// A module dependency failed, so this module was not built.
  #[error("dependency {dependency} of {module} failed")]
  DependencyFailed { module: String, dependency: String },

  /// Cycle detected in the module dependency graph.
  #[error("module dependency cycle detected")]
  CycleDetected,

  /// A module task panicked or was cancelled.
  #[error("module task failed: {0}")]
  Join(String),
}

/// One step of a module's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
  /// Already completed for the current revision.
  Skipped(String),
  Running(String),
  Completed(String),
  Failed(String),
  Done,
}

/// Where the next invocation re-enters after a failed phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReset {
  pub failed_phase: String,
  pub resume_from: String,
}

/// Result of running one module through its phase graph.
#[derive(Debug)]
pub struct ModuleOutcome {
  pub module: String,
  pub transitions: Vec<PhaseTransition>,
  pub error: Option<ExecuteError>,
  pub recovery: Option<RecoveryReset>,
  /// The store could not be rewound after a failure, so the next run
  /// resumes at the failed phase.
  pub recovery_error: Option<StateStoreError>,
  pub elapsed: Duration,
}

impl ModuleOutcome {
  pub fn new(module: impl Into<String>) -> Self {
    Self {
      module: module.into(),
      transitions: Vec::new(),
      error: None,
      recovery: None,
      recovery_error: None,
      elapsed: Duration::ZERO,
    }
  }

  pub fn is_success(&self) -> bool {
    self.error.is_none()
  }

  /// Phases whose handler was invoked, in order.
  pub fn invoked(&self) -> Vec<&str> {
    self
      .transitions
      .iter()
      .filter_map(|t| match t {
        PhaseTransition::Running(phase) => Some(phase.as_str()),
        _ => None,
      })
      .collect()
  }

  /// Phases skipped as already complete, in order.
  pub fn skipped(&self) -> Vec<&str> {
    self
      .transitions
      .iter()
      .filter_map(|t| match t {
        PhaseTransition::Skipped(phase) => Some(phase.as_str()),
        _ => None,
      })
      .collect()
  }

  pub fn failed_phase(&self) -> Option<&str> {
    self.transitions.iter().find_map(|t| match t {
      PhaseTransition::Failed(phase) => Some(phase.as_str()),
      _ => None,
    })
  }
}

/// Why a module was not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
  /// A dependency failed or was itself skipped because of a failure.
  DependencyFailed(String),
  /// System modules are never built from source.
  SystemModule,
  /// The system already provides a new enough package.
  SatisfiedBySystem,
}

impl SkipReason {
  /// Whether dependents must be skipped as well.
  pub fn blocks_dependents(&self) -> bool {
    matches!(self, Self::DependencyFailed(_))
  }
}

impl fmt::Display for SkipReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::DependencyFailed(dep) => write!(f, "dependency {} failed", dep),
      Self::SystemModule => f.write_str("system module"),
      Self::SatisfiedBySystem => f.write_str("satisfied by system package"),
    }
  }
}

/// Aggregate result of a build.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub built: BTreeMap<String, ModuleOutcome>,
  pub failed: BTreeMap<String, ModuleOutcome>,
  pub skipped: BTreeMap<String, SkipReason>,
}

impl BuildReport {
  /// True if no module failed and none was skipped because of a failure.
  pub fn is_success(&self) -> bool {
    self.failed.is_empty() && !self.skipped.values().any(SkipReason::blocks_dependents)
  }

  pub fn total(&self) -> usize {
    self.built.len() + self.failed.len() + self.skipped.len()
  }
}

/// Configuration for module execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of modules built in parallel.
  pub parallelism: usize,

  /// Discard build state and start every module from its first phase.
  pub force_checkout: bool,

  /// System-preferred modules the host already provides.
  pub satisfied_by_system: HashSet<String>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4),
      force_checkout: false,
      satisfied_by_system: HashSet::new(),
    }
  }
}
