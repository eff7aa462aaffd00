//! Module execution.
//!
//! This module provides the entry points for building modules. It handles:
//! - Resumable phase execution per module ([`PhaseExecutor`])
//! - Dependency ordering of modules ([`ModuleDag`])
//! - Parallel execution of independent modules
//! - Failure propagation and skip tracking

pub mod dag;
pub mod executor;
pub mod handler;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::BuildContext;
use crate::module::Module;
use crate::state::BuildStateStore;

pub use dag::ModuleDag;
pub use executor::PhaseExecutor;
pub use handler::{HandlerRegistry, PhaseHandler, PhaseHandlerProvider, ShellPhaseHandler};
pub use types::{
  BuildReport, ExecuteConfig, ExecuteError, HandlerError, ModuleOutcome, PhaseTransition, RecoveryReset, SkipReason,
};

/// Build `modules` in dependency order.
///
/// Modules are grouped into waves with [`ModuleDag::waves`]; modules of one
/// wave run in parallel, bounded by `config.parallelism`. Handlers block, so
/// each module runs on the blocking pool. A module is skipped when:
/// - it is a system module,
/// - it is system-preferred and listed in `config.satisfied_by_system`,
/// - one of its dependencies failed or was skipped because of a failure.
///
/// Only a dependency cycle aborts the whole build; every other failure is
/// recorded per module in the returned [`BuildReport`].
pub async fn execute_modules(
  modules: &[Arc<Module>],
  handlers: Arc<dyn PhaseHandlerProvider>,
  store: Arc<dyn BuildStateStore>,
  ctx: Arc<BuildContext>,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  info!(module_count = modules.len(), "starting build");

  let dag = ModuleDag::new(modules)?;
  let waves = dag.waves()?;
  info!(wave_count = waves.len(), "computed execution waves");

  let executor = Arc::new(PhaseExecutor::new(store, ctx).force_checkout(config.force_checkout));
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut report = BuildReport::default();

  for (wave_idx, wave) in waves.into_iter().enumerate() {
    debug!(wave = wave_idx, modules = wave.len(), "executing wave");

    let mut ready = Vec::new();
    for module in wave {
      match skip_reason(&module, &dag, &report, config) {
        Some(reason) => {
          if reason.blocks_dependents() {
            warn!(module = %module.name, reason = %reason, "skipping module");
          } else {
            info!(module = %module.name, reason = %reason, "skipping module");
          }
          report.skipped.insert(module.name.clone(), reason);
        }
        None => ready.push(module),
      }
    }

    if ready.is_empty() {
      continue;
    }

    for outcome in execute_wave(ready, handlers.clone(), executor.clone(), semaphore.clone()).await {
      if outcome.is_success() {
        info!(module = %outcome.module, elapsed = ?outcome.elapsed, "module built");
        report.built.insert(outcome.module.clone(), outcome);
      } else {
        report.failed.insert(outcome.module.clone(), outcome);
      }
    }
  }

  info!(
    built = report.built.len(),
    failed = report.failed.len(),
    skipped = report.skipped.len(),
    "build complete"
  );

  Ok(report)
}

fn skip_reason(module: &Module, dag: &ModuleDag, report: &BuildReport, config: &ExecuteConfig) -> Option<SkipReason> {
  let blocked = dag.dependencies(&module.name).into_iter().find(|dep| {
    report.failed.contains_key(*dep) || report.skipped.get(*dep).is_some_and(SkipReason::blocks_dependents)
  });
  if let Some(dep) = blocked {
    return Some(SkipReason::DependencyFailed(dep.to_string()));
  }

  if module.system_module {
    return Some(SkipReason::SystemModule);
  }

  if module.system_preferred && config.satisfied_by_system.contains(&module.name) {
    return Some(SkipReason::SatisfiedBySystem);
  }

  None
}

/// Run one wave, returning outcomes in request order.
async fn execute_wave(
  modules: Vec<Arc<Module>>,
  handlers: Arc<dyn PhaseHandlerProvider>,
  executor: Arc<PhaseExecutor>,
  semaphore: Arc<Semaphore>,
) -> Vec<ModuleOutcome> {
  let order: HashMap<String, usize> = modules.iter().enumerate().map(|(i, m)| (m.name.clone(), i)).collect();
  let mut join_set = JoinSet::new();

  for module in modules {
    let handlers = handlers.clone();
    let executor = executor.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let _permit = semaphore.acquire_owned().await;
      let name = module.name.clone();

      let task = tokio::task::spawn_blocking(move || match handlers.handler_for(&module) {
        Some(handler) => executor.run(&module, handler),
        None => {
          let mut outcome = ModuleOutcome::new(&module.name);
          outcome.error = Some(ExecuteError::NoHandler {
            module: module.name.clone(),
            module_type: module.module_type,
          });
          outcome
        }
      });

      match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
          error!(module = %name, error = %e, "module task panicked");
          let mut outcome = ModuleOutcome::new(&name);
          outcome.error = Some(ExecuteError::Join(e.to_string()));
          outcome
        }
      }
    });
  }

  let mut outcomes = Vec::new();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(outcome) => outcomes.push(outcome),
      Err(e) => error!(error = %e, "wave task failed"),
    }
  }

  outcomes.sort_by_key(|o| order.get(&o.module).copied().unwrap_or(usize::MAX));
  outcomes
}
