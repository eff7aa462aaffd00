//! System dependency reconciliation.
//!
//! Decides which modules the host already provides, which packages to
//! install, and which runtime packages an installed prefix depends on:
//!
//! - [`query`]: what is installed on the host
//! - [`matcher`]: does one dependency (or an alternative) match
//! - [`reconcile`]: per-module verdicts
//! - [`planner`]: install plan from the verdicts
//! - [`installer`]: apt / dnf back ends

pub mod dump;
pub mod installer;
pub mod matcher;
pub mod planner;
pub mod query;
pub mod reconcile;
pub mod runtime;
pub mod types;

pub use installer::{AptInstaller, DnfInstaller, InstallError, Installer, find_best};
pub use matcher::{Matched, SatisfactionResult, satisfies};
pub use planner::{Category, InstallPlan, PlanEntry, PlannerOptions, execute_plan, plan_installs};
pub use query::{HostPackageQuery, QueryError, StaticPackageQuery, SystemPackageQuery, UNKNOWN_VERSION};
pub use reconcile::{
  ModuleClassification, ModuleState, ModuleStates, RequirementState, classify_module, classify_modules,
};
pub use types::{DependencyKind, DependencyRef, InstallRequest, ParseDependencyError, SystemDependency};
