//! End-to-end tests for the phase engine and system dependency reconciliation.
//!
//! These drive the public API the way the CLI does: modules come from a TOML
//! module set, progress is persisted with the file-backed store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use mbuild_lib::config::BuildContext;
use mbuild_lib::execute::{
  ExecuteConfig, HandlerError, HandlerRegistry, PhaseExecutor, PhaseHandler, PhaseHandlerProvider, PhaseTransition,
  execute_modules,
};
use mbuild_lib::module::Module;
use mbuild_lib::moduleset::ModuleSet;
use mbuild_lib::phase::{BUILD, CHECKOUT, Phase};
use mbuild_lib::state::{BuildStateStore, FileStateStore};
use mbuild_lib::sysdeps::{
  Category, DependencyKind, DependencyRef, InstallRequest, Matched, PlannerOptions, StaticPackageQuery,
  SystemDependency, classify_modules, plan_installs, satisfies,
};
use mbuild_lib::version::DpkgComparator;
use tempfile::TempDir;

const MODULE_B: &str = r#"
[[module]]
name = "B"
type = "custom"
revision = "r1"

[[module.phases]]
name = "checkout"

[[module.phases]]
name = "configure"
prerequisites = ["checkout"]
recovery = ["checkout"]

[[module.phases]]
name = "build"
prerequisites = ["configure"]
recovery = ["checkout"]

[[module.phases]]
name = "install"
prerequisites = ["build"]
recovery = ["checkout"]
"#;

/// Logs every phase it runs and fails the ones in `broken`.
#[derive(Default)]
struct Recorder {
  calls: Mutex<Vec<String>>,
  broken: Mutex<HashSet<String>>,
}

impl Recorder {
  fn take(&self) -> Vec<String> {
    std::mem::take(&mut *self.calls.lock().unwrap())
  }

  fn break_phase(&self, phase: &str) {
    self.broken.lock().unwrap().insert(phase.to_string());
  }

  fn heal(&self) {
    self.broken.lock().unwrap().clear();
  }
}

impl PhaseHandler for Recorder {
  fn execute(&self, _module: &Module, phase: &Phase, _ctx: &BuildContext) -> Result<(), HandlerError> {
    self.calls.lock().unwrap().push(phase.name.clone());
    if self.broken.lock().unwrap().contains(&phase.name) {
      return Err(HandlerError::CommandFailed {
        command: phase.name.clone(),
        code: Some(2),
      });
    }
    Ok(())
  }
}

fn module_b() -> Module {
  let set = ModuleSet::from_toml(MODULE_B).unwrap();
  (**set.get("B").unwrap()).clone()
}

fn file_executor(temp: &TempDir) -> (PhaseExecutor, Arc<FileStateStore>) {
  let store = Arc::new(FileStateStore::new(temp.path().join("state")));
  let executor = PhaseExecutor::new(store.clone(), Arc::new(BuildContext::default()));
  (executor, store)
}

#[test]
fn completed_module_is_idempotent_across_store_reopen() {
  let temp = TempDir::new().unwrap();
  let module = module_b();
  let handler = Recorder::default();

  let (executor, _) = file_executor(&temp);
  assert!(executor.run(&module, &handler).is_success());
  assert_eq!(handler.take(), vec!["checkout", "configure", "build", "install"]);

  let (executor, _) = file_executor(&temp);
  let outcome = executor.run(&module, &handler);
  assert!(outcome.is_success());
  assert!(handler.take().is_empty());
  assert_eq!(outcome.skipped().len(), 4);
}

#[test]
fn revision_change_reruns_every_phase() {
  let temp = TempDir::new().unwrap();
  let mut module = module_b();
  let handler = Recorder::default();
  let (executor, store) = file_executor(&temp);

  executor.run(&module, &handler);
  handler.take();

  module.revision = Some("r2".to_string());
  assert!(executor.run(&module, &handler).is_success());
  assert_eq!(handler.take().len(), 4);
  assert_eq!(store.get("B").unwrap().unwrap().source_revision, "r2");
}

#[test]
fn build_failure_restarts_at_checkout() {
  let temp = TempDir::new().unwrap();
  let module = module_b();
  let handler = Recorder::default();
  let (executor, store) = file_executor(&temp);

  handler.break_phase(BUILD);
  let outcome = executor.run(&module, &handler);
  assert!(!outcome.is_success());
  assert_eq!(outcome.failed_phase(), Some(BUILD));
  assert_eq!(outcome.recovery.as_ref().map(|r| r.resume_from.as_str()), Some(CHECKOUT));
  assert!(store.get("B").unwrap().is_none());
  handler.take();

  handler.heal();
  let outcome = executor.run(&module, &handler);
  assert!(outcome.is_success());
  assert!(outcome.skipped().is_empty());
  assert_eq!(handler.take(), vec!["checkout", "configure", "build", "install"]);
}

#[test]
fn failure_without_recovery_resumes_at_failed_phase() {
  let temp = TempDir::new().unwrap();
  let mut module = module_b();
  module.phases = mbuild_lib::phase::PhaseGraph::new(vec![
    Phase::new(CHECKOUT),
    Phase::new(BUILD).after(&[CHECKOUT]),
  ])
  .unwrap();
  let handler = Recorder::default();
  let (executor, _) = file_executor(&temp);

  handler.break_phase(BUILD);
  let outcome = executor.run(&module, &handler);
  assert!(outcome.recovery.is_none());
  assert!(outcome.transitions.contains(&PhaseTransition::Failed(BUILD.to_string())));
  handler.take();

  handler.heal();
  executor.run(&module, &handler);
  assert_eq!(handler.take(), vec![BUILD]);
}

#[test]
fn second_alternative_satisfies_dependency() {
  let dependency = SystemDependency::new(DependencyRef::pkgconfig("Qt6Core"))
    .with_alternative(DependencyRef::pkgconfig("Qt5Core"))
    .with_alternative(DependencyRef::path("/usr/lib/libQtCore.so"));
  let oracle = StaticPackageQuery::new().with(DependencyRef::path("/usr/lib/libQtCore.so"), "unknown");

  let result = satisfies(&dependency, &oracle).unwrap();

  assert!(result.satisfied);
  assert_eq!(result.matched, Some(Matched::Alternative(1)));
  assert_eq!(result.matched_ref, Some(DependencyRef::path("/usr/lib/libQtCore.so")));
}

#[test]
fn too_old_required_module_plans_upgrade() {
  let set = ModuleSet::from_toml(
    r#"
[[module]]
name = "A"
type = "system"
pkg-config = "libfoo"
version = "2.0"
"#,
  )
  .unwrap();
  let oracle = StaticPackageQuery::new().with(DependencyRef::pkgconfig("libfoo"), "1.5");

  let states = classify_modules(set.modules(), &oracle, &DpkgComparator);
  let state = states.get("A").unwrap().state().unwrap();
  assert_eq!(state.installed_version.as_deref(), Some("1.5"));
  assert!(!state.new_enough);
  assert!(state.system_module);

  let plan = plan_installs(&states, &PlannerOptions::default());
  assert_eq!(plan.in_category(Category::TooOldRequired).count(), 1);
  assert_eq!(
    plan.requests,
    vec![InstallRequest {
      module: "A".to_string(),
      kind: DependencyKind::Pkgconfig,
      identifier: "libfoo".to_string(),
    }]
  );
}

#[test]
fn classification_ignores_module_order() {
  let set = ModuleSet::from_toml(
    r#"
[[module]]
name = "zlib"
type = "system"
pkg-config = "zlib"
version = "1.2.11"

[[module]]
name = "glib"
type = "qmake"
pkg-config = "glib-2.0"
version = "2.80"

[[module]]
name = "tools"
type = "system"
sysdeps = ["path:/usr/bin/xsltproc,package:xsltproc", "python:yaml"]
"#,
  )
  .unwrap();
  let oracle = StaticPackageQuery::new()
    .with(DependencyRef::pkgconfig("zlib"), "1.3")
    .with(DependencyRef::pkgconfig("glib-2.0"), "2.74.6")
    .with(DependencyRef::package("xsltproc"), "1.1.35-1")
    .failing(DependencyRef::new("python", "yaml"));

  let forward = set.modules().to_vec();
  let mut reversed = forward.clone();
  reversed.reverse();

  let a = classify_modules(&forward, &oracle, &DpkgComparator);
  let b = classify_modules(&reversed, &oracle, &DpkgComparator);
  for module in &forward {
    assert_eq!(a.get(&module.name), b.get(&module.name), "{} differs", module.name);
  }
  assert_eq!(a.new_enough_modules(), HashSet::from(["zlib".to_string()]));
}

#[cfg(unix)]
#[tokio::test]
async fn shell_modules_build_in_dependency_order() {
  let temp = TempDir::new().unwrap();
  let log = temp.path().join("order.log");
  let set = ModuleSet::from_toml(&format!(
    r#"
[[module]]
name = "app"
type = "pip"
dependencies = ["lib"]
[module.commands]
install = "echo $MBUILD_MODULE >> {log}"

[[module]]
name = "lib"
type = "pip"
[module.commands]
install = "echo $MBUILD_MODULE >> {log}"

[[module]]
name = "broken"
type = "pip"
[module.commands]
checkout = "exit 3"

[[module]]
name = "needs-broken"
type = "pip"
dependencies = ["broken"]
"#,
    log = log.display()
  ))
  .unwrap();

  let ctx = BuildContext {
    prefix: temp.path().join("prefix"),
    checkout_root: temp.path().join("src"),
    ..Default::default()
  };
  let handlers: Arc<dyn PhaseHandlerProvider> = Arc::new(HandlerRegistry::with_shell_defaults());
  let store = Arc::new(FileStateStore::new(temp.path().join("state")));

  let report = execute_modules(
    &set.full_module_list(&[]).unwrap(),
    handlers,
    store.clone(),
    Arc::new(ctx),
    &ExecuteConfig {
      parallelism: 2,
      ..Default::default()
    },
  )
  .await
  .unwrap();

  assert_eq!(std::fs::read_to_string(&log).unwrap(), "lib\napp\n");
  assert!(report.built.contains_key("app"));
  assert!(report.failed.contains_key("broken"));
  assert!(report.skipped.contains_key("needs-broken"));
  assert!(!report.is_success());

  let recorded: Vec<String> = store.list().unwrap().into_iter().map(|(name, _)| name).collect();
  assert_eq!(recorded, vec!["app", "lib"]);
}
