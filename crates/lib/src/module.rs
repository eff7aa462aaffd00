//! The module model consumed by the executor and the reconciler.

use std::collections::BTreeMap;

use crate::consts::UNVERSIONED;
use crate::phase::{ModuleType, Phase, PhaseGraph, PhaseGraphError};
use crate::sysdeps::types::{DependencyRef, SystemDependency};

/// One buildable (or system-provided) unit of a module set.
///
/// Constructed once from declarative configuration and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Module {
  pub name: String,
  pub module_type: ModuleType,
  pub phases: PhaseGraph,

  /// Names of modules that must be built first.
  pub dependencies: Vec<String>,

  /// pkg-config probe for the library this module provides.
  pub pkg_config: Option<String>,

  /// Minimum version of the probed library.
  pub required_version: Option<String>,

  pub system_dependencies: Vec<SystemDependency>,

  /// Built only if the system lacks a new enough package.
  pub system_preferred: bool,

  pub supports_staged_install: bool,

  /// Pure system-package placeholder that cannot be built from source.
  pub system_module: bool,

  /// System dependencies are needed at runtime too.
  pub runtime: bool,

  /// Source revision token; invalidates stale build state when it changes.
  pub revision: Option<String>,

  /// Shell command per phase name.
  pub commands: BTreeMap<String, String>,

  /// Extra environment for this module's phase commands.
  pub env: BTreeMap<String, String>,
}

impl Module {
  /// Create a module with the phase template of `module_type`.
  pub fn new(name: impl Into<String>, module_type: ModuleType) -> Result<Self, PhaseGraphError> {
    Self::with_phases(name, module_type, &[])
  }

  /// Create a module, using `declared` phases for [`ModuleType::Custom`].
  pub fn with_phases(
    name: impl Into<String>,
    module_type: ModuleType,
    declared: &[Phase],
  ) -> Result<Self, PhaseGraphError> {
    Ok(Self {
      name: name.into(),
      module_type,
      phases: module_type.phase_graph(declared)?,
      dependencies: Vec::new(),
      pkg_config: None,
      required_version: None,
      system_dependencies: Vec::new(),
      system_preferred: false,
      supports_staged_install: false,
      system_module: module_type == ModuleType::System,
      runtime: true,
      revision: None,
      commands: BTreeMap::new(),
      env: BTreeMap::new(),
    })
  }

  /// The revision build state is keyed on.
  pub fn source_revision(&self) -> &str {
    self.revision.as_deref().unwrap_or(UNVERSIONED)
  }

  /// System-satisfiable requirements: the pkg-config probe first, then the
  /// declared system dependencies. The required version applies to the first.
  pub fn requirements(&self) -> Vec<SystemDependency> {
    self
      .pkg_config
      .iter()
      .map(|name| SystemDependency::new(DependencyRef::pkgconfig(name.clone())))
      .chain(self.system_dependencies.iter().cloned())
      .collect()
  }

  pub fn has_requirements(&self) -> bool {
    self.pkg_config.is_some() || !self.system_dependencies.is_empty()
  }

  pub fn command_for(&self, phase: &str) -> Option<&str> {
    self.commands.get(phase).map(String::as_str)
  }
}
