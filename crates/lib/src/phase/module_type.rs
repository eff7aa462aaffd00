//! Built-in module types and their phase graph templates.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::graph::{Phase, PhaseGraph, PhaseGraphError};

pub const CHECKOUT: &str = "checkout";
pub const CONFIGURE: &str = "configure";
pub const BUILD: &str = "build";
pub const INSTALL: &str = "install";
pub const INSTALL_DEPENDENCIES: &str = "install-dependencies";

/// The build technology a module uses, which determines its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
  Qmake,
  Node,
  Npm,
  Pip,
  /// Placeholder for a system package; never built from source.
  System,
  /// Phases declared explicitly by the module.
  Custom,
}

impl ModuleType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Qmake => "qmake",
      Self::Node => "node",
      Self::Npm => "npm",
      Self::Pip => "pip",
      Self::System => "system",
      Self::Custom => "custom",
    }
  }

  /// Phases for this type. `declared` is only consulted for [`ModuleType::Custom`].
  pub fn phases(&self, declared: &[Phase]) -> Vec<Phase> {
    match self {
      Self::Qmake => vec![
        Phase::new(CHECKOUT),
        Phase::new(CONFIGURE).after(&[CHECKOUT]).recover_from(&[CHECKOUT]),
        Phase::new(BUILD).after(&[CONFIGURE]).recover_from(&[CHECKOUT]),
        Phase::new(INSTALL).after(&[BUILD]),
      ],
      Self::Node => vec![
        Phase::new(CHECKOUT),
        Phase::new(INSTALL_DEPENDENCIES)
          .after(&[CHECKOUT])
          .recover_from(&[CHECKOUT]),
        Phase::new(BUILD)
          .after(&[INSTALL_DEPENDENCIES])
          .recover_from(&[CHECKOUT]),
        Phase::new(INSTALL).after(&[BUILD]).recover_from(&[CHECKOUT]),
      ],
      Self::Npm => vec![
        Phase::new(CHECKOUT),
        Phase::new(INSTALL).after(&[CHECKOUT]),
        Phase::new(BUILD).after(&[INSTALL]).recover_from(&[CHECKOUT]),
      ],
      Self::Pip => vec![Phase::new(CHECKOUT), Phase::new(INSTALL).after(&[CHECKOUT])],
      Self::System => Vec::new(),
      Self::Custom => declared.to_vec(),
    }
  }

  pub fn phase_graph(&self, declared: &[Phase]) -> Result<PhaseGraph, PhaseGraphError> {
    PhaseGraph::new(self.phases(declared))
  }
}

impl fmt::Display for ModuleType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
