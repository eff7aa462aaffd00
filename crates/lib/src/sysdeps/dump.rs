//! Machine-readable dependency listings, one `kind:id[,kind:id]*` per line.

use std::sync::Arc;

use crate::module::Module;

use super::planner::PlannerOptions;
use super::reconcile::{ModuleClassification, ModuleStates};
use super::runtime::runtime_dependencies;

/// Result of the unmet listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmetDump {
  pub lines: Vec<String>,
  /// A system module is installed but too old; it cannot be built instead.
  pub has_too_old_required: bool,
}

/// Every requirement of system modules and of modules with a pkg-config probe.
pub fn dump_all(modules: &[Arc<Module>]) -> Vec<String> {
  modules
    .iter()
    .filter(|m| m.system_module || m.pkg_config.is_some())
    .flat_map(|m| m.requirements())
    .map(|d| d.to_string())
    .collect()
}

/// Requirements of modules the host does not satisfy.
///
/// Buildable modules are listed only with `partial_build`. Modules that
/// could not be classified are left out.
pub fn dump_unmet(states: &ModuleStates, options: &PlannerOptions) -> UnmetDump {
  let mut dump = UnmetDump::default();

  for (module, classification) in states.iter() {
    let ModuleClassification::Classified(state) = classification else {
      continue;
    };
    if state.new_enough {
      continue;
    }
    if state.installed_version.is_some() && state.system_module {
      dump.has_too_old_required = true;
    }
    if state.system_module || options.partial_build {
      dump
        .lines
        .extend(module.requirements().iter().map(ToString::to_string));
    }
  }

  dump
}

/// Requirements of runtime system modules.
pub fn dump_runtime(modules: &[Arc<Module>]) -> Vec<String> {
  runtime_dependencies(modules).iter().map(ToString::to_string).collect()
}
