//! Turning classifications into an install plan.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;

use super::installer::{InstallError, Installer, missing_installer_hint};
use super::reconcile::{ModuleClassification, ModuleState, ModuleStates, RequirementState};
use super::types::InstallRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerOptions {
  /// Also plan installs for modules that could be built from source.
  pub partial_build: bool,
}

impl Default for PlannerOptions {
  fn default() -> Self {
    Self { partial_build: true }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
  NewEnough,
  TooOldRequired,
  MissingRequired,
  TooOldOptional,
  MissingOptional,
  Unknown,
}

impl Category {
  pub fn is_blocking(&self) -> bool {
    matches!(self, Self::TooOldRequired | Self::MissingRequired)
  }

  fn needs_install(&self) -> bool {
    matches!(
      self,
      Self::TooOldRequired | Self::MissingRequired | Self::TooOldOptional | Self::MissingOptional
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
  pub module: String,
  pub category: Category,
  pub pkg_config: Option<String>,
  pub required_version: Option<String>,
  pub installed_version: Option<String>,
  /// Why the module could not be classified.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallPlan {
  pub entries: Vec<PlanEntry>,
  pub requests: Vec<InstallRequest>,
}

impl InstallPlan {
  /// True when a system module is missing or too old; those cannot be built.
  pub fn has_blocking(&self) -> bool {
    self.entries.iter().any(|e| e.category.is_blocking())
  }

  pub fn in_category(&self, category: Category) -> impl Iterator<Item = &PlanEntry> {
    self.entries.iter().filter(move |e| e.category == category)
  }
}

/// Partition classified modules and collect the packages to request.
///
/// Required means a system module. Modules that could be built from source
/// are only considered with `partial_build`. Requests are deduplicated and
/// follow classification order.
pub fn plan_installs(states: &ModuleStates, options: &PlannerOptions) -> InstallPlan {
  let mut plan = InstallPlan::default();
  let mut seen = HashSet::new();

  for (module, classification) in states.iter() {
    let state = match classification {
      ModuleClassification::Classified(state) => state,
      ModuleClassification::Unknown { reason } => {
        plan.entries.push(PlanEntry {
          module: module.name.clone(),
          category: Category::Unknown,
          pkg_config: module.pkg_config.clone(),
          required_version: module.required_version.clone(),
          installed_version: None,
          reason: Some(reason.clone()),
        });
        continue;
      }
    };

    let Some(category) = categorize(state, options) else {
      continue;
    };

    if category.needs_install() {
      for request in requests_for(&module.name, state) {
        if seen.insert(request.clone()) {
          plan.requests.push(request);
        }
      }
    }

    plan.entries.push(PlanEntry {
      module: module.name.clone(),
      category,
      pkg_config: module.pkg_config.clone(),
      required_version: state.required_version.clone(),
      installed_version: state.installed_version.clone(),
      reason: None,
    });
  }

  plan
}

fn categorize(state: &ModuleState, options: &PlannerOptions) -> Option<Category> {
  let considered = state.system_module || options.partial_build;
  if !considered {
    return None;
  }

  let installed = state.installed_version.is_some();
  let category = match (state.new_enough, installed, state.system_module) {
    (true, _, _) => Category::NewEnough,
    (false, true, true) => Category::TooOldRequired,
    (false, false, true) => Category::MissingRequired,
    (false, true, false) => Category::TooOldOptional,
    (false, false, false) => Category::MissingOptional,
  };
  Some(category)
}

/// A too-old module asks for an upgrade of the requirement its version came
/// from; a missing one asks for every unsatisfied requirement.
fn requests_for(module: &str, state: &ModuleState) -> Vec<InstallRequest> {
  let pick = |r: &RequirementState| {
    let dependency = r.result.matched_ref.as_ref().unwrap_or(&r.dependency.primary);
    InstallRequest::new(module, dependency)
  };

  if state.installed_version.is_some() {
    return state.requirements.first().map(pick).into_iter().collect();
  }

  state
    .requirements
    .iter()
    .filter(|r| !r.result.satisfied)
    .map(pick)
    .collect()
}

/// Install the plan's requests with `installer`.
///
/// Fails without an installer even when there is nothing to install.
pub fn execute_plan(plan: &InstallPlan, installer: Option<&dyn Installer>) -> Result<(), InstallError> {
  let Some(installer) = installer else {
    return Err(InstallError::NoInstallerAvailable {
      hint: missing_installer_hint(),
    });
  };

  if plan.requests.is_empty() {
    info!("no system dependencies to install");
    return Ok(());
  }

  info!(
    installer = %installer.name(),
    modules = ?plan.requests.iter().map(|r| r.module.as_str()).collect::<Vec<_>>(),
    "installing system dependencies"
  );
  installer.install(&plan.requests)
}
