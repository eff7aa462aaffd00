//! Classifying modules against the packages installed on the host.
//!
//! Each module with system-satisfiable requirements gets a verdict: whether
//! every requirement is present, which version is installed, and whether
//! that version is new enough. Verdicts depend only on the module and the
//! oracle, never on the other modules in the request.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::module::Module;
use crate::version::VersionComparator;

use super::matcher::{SatisfactionResult, satisfies};
use super::query::{QueryError, SystemPackageQuery, UNKNOWN_VERSION};
use super::types::SystemDependency;

/// Match detail for one requirement of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementState {
  pub dependency: SystemDependency,
  pub result: SatisfactionResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleState {
  pub required_version: Option<String>,
  /// Version of the first requirement, when every requirement is present.
  pub installed_version: Option<String>,
  pub new_enough: bool,
  pub system_module: bool,
  pub requirements: Vec<RequirementState>,
}

impl ModuleState {
  pub fn all_satisfied(&self) -> bool {
    self.requirements.iter().all(|r| r.result.satisfied)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleClassification {
  Classified(ModuleState),
  /// The oracle could not answer for this module.
  Unknown { reason: String },
}

impl ModuleClassification {
  pub fn state(&self) -> Option<&ModuleState> {
    match self {
      Self::Classified(state) => Some(state),
      Self::Unknown { .. } => None,
    }
  }

  pub fn is_new_enough(&self) -> bool {
    self.state().is_some_and(|s| s.new_enough)
  }
}

/// Classifications in request order.
#[derive(Debug, Clone, Default)]
pub struct ModuleStates {
  entries: Vec<(Arc<Module>, ModuleClassification)>,
}

impl ModuleStates {
  pub fn get(&self, name: &str) -> Option<&ModuleClassification> {
    self.entries.iter().find(|(m, _)| m.name == name).map(|(_, c)| c)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&Arc<Module>, &ModuleClassification)> {
    self.entries.iter().map(|(m, c)| (m, c))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Names of modules the host provides in a new enough version.
  pub fn new_enough_modules(&self) -> HashSet<String> {
    self
      .iter()
      .filter(|(_, c)| c.is_new_enough())
      .map(|(m, _)| m.name.clone())
      .collect()
  }
}

/// Classify every module that has requirements, preserving input order.
/// Oracle failures degrade a module to [`ModuleClassification::Unknown`].
pub fn classify_modules(
  modules: &[Arc<Module>],
  oracle: &dyn SystemPackageQuery,
  comparator: &dyn VersionComparator,
) -> ModuleStates {
  let entries = modules
    .iter()
    .filter(|m| m.has_requirements())
    .map(|module| {
      let classification = match classify_module(module, oracle, comparator) {
        Ok(state) => ModuleClassification::Classified(state),
        Err(e) => {
          warn!(module = %module.name, error = %e, "could not classify module");
          ModuleClassification::Unknown { reason: e.to_string() }
        }
      };
      (module.clone(), classification)
    })
    .collect();

  ModuleStates { entries }
}

pub fn classify_module(
  module: &Module,
  oracle: &dyn SystemPackageQuery,
  comparator: &dyn VersionComparator,
) -> Result<ModuleState, QueryError> {
  let requirements = module
    .requirements()
    .into_iter()
    .map(|dependency| {
      let result = satisfies(&dependency, oracle)?;
      Ok(RequirementState { dependency, result })
    })
    .collect::<Result<Vec<_>, QueryError>>()?;

  let all_satisfied = requirements.iter().all(|r| r.result.satisfied);
  let installed_version = if all_satisfied {
    requirements.first().and_then(|r| r.result.installed_version.clone())
  } else {
    None
  };

  let new_enough = all_satisfied
    && match (&module.required_version, &installed_version) {
      (None, _) => true,
      (Some(_), None) => false,
      (Some(_), Some(installed)) if installed == UNKNOWN_VERSION => false,
      (Some(required), Some(installed)) => {
        if comparator.compare(installed, required).is_none() {
          warn!(module = %module.name, installed = %installed, required = %required, "versions cannot be ordered");
        }
        comparator.is_new_enough(installed, required)
      }
    };

  debug!(
    module = %module.name,
    installed = ?installed_version,
    required = ?module.required_version,
    new_enough,
    "classified module"
  );

  Ok(ModuleState {
    required_version: module.required_version.clone(),
    installed_version,
    new_enough,
    system_module: module.system_module,
    requirements,
  })
}
