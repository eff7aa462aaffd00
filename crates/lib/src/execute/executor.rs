//! Resumable per-module phase execution.
//!
//! The executor walks a module's phase graph in order, skipping phases the
//! build state already records as complete for the current source revision.
//! Completion is recorded only after a handler reports success. When a phase
//! with recovery phases fails, the state is rewound so the next run re-enters
//! at the earliest recovery phase.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::BuildContext;
use crate::module::Module;
use crate::phase::Phase;
use crate::state::{BuildStateStore, StateStoreError};

use super::handler::PhaseHandler;
use super::types::{ExecuteError, HandlerError, ModuleOutcome, PhaseTransition, RecoveryReset};

pub struct PhaseExecutor {
  store: Arc<dyn BuildStateStore>,
  ctx: Arc<BuildContext>,
  force_checkout: bool,
}

impl PhaseExecutor {
  pub fn new(store: Arc<dyn BuildStateStore>, ctx: Arc<BuildContext>) -> Self {
    Self {
      store,
      ctx,
      force_checkout: false,
    }
  }

  /// Invalidate stored progress before walking the graph.
  pub fn force_checkout(mut self, force: bool) -> Self {
    self.force_checkout = force;
    self
  }

  /// Run every outstanding phase of `module`.
  ///
  /// Never panics on handler or store failures; they are reported through
  /// [`ModuleOutcome::error`].
  pub fn run(&self, module: &Module, handler: &dyn PhaseHandler) -> ModuleOutcome {
    let started = Instant::now();
    let mut outcome = ModuleOutcome::new(&module.name);
    if let Err(e) = self.walk(module, handler, &mut outcome) {
      error!(module = %module.name, error = %e, "module failed");
      outcome.error = Some(e);
    }
    outcome.elapsed = started.elapsed();
    outcome
  }

  fn walk(&self, module: &Module, handler: &dyn PhaseHandler, outcome: &mut ModuleOutcome) -> Result<(), ExecuteError> {
    let name = module.name.as_str();
    let revision = module.source_revision();

    if self.force_checkout {
      self.store.invalidate(name)?;
    }

    let record = self.store.get(name)?;
    let completed = record
      .as_ref()
      .and_then(|r| r.completed_for(revision))
      .and_then(|phase| module.phases.position(phase));

    if record.is_some() && completed.is_none() {
      debug!(module = %name, revision = %revision, "stored build state does not apply, starting over");
    }

    for (position, phase) in module.phases.ordered().enumerate() {
      if completed.is_some_and(|done| position <= done) {
        debug!(module = %name, phase = %phase.name, "phase already complete");
        outcome.transitions.push(PhaseTransition::Skipped(phase.name.clone()));
        continue;
      }

      info!(module = %name, phase = %phase.name, "running phase");
      outcome.transitions.push(PhaseTransition::Running(phase.name.clone()));

      match handler.execute(module, phase, &self.ctx) {
        Ok(()) => {
          self.store.record_phase_complete(name, &phase.name, revision)?;
          outcome.transitions.push(PhaseTransition::Completed(phase.name.clone()));
        }
        Err(source) => {
          if let HandlerError::Interrupted { .. } = source {
            warn!(module = %name, phase = %phase.name, "phase interrupted");
          }
          outcome.transitions.push(PhaseTransition::Failed(phase.name.clone()));
          match self.rewind_for_recovery(module, phase) {
            Ok(reset) => outcome.recovery = reset,
            Err(e) => {
              warn!(module = %name, error = %e, "failed to reset build state for recovery");
              outcome.recovery_error = Some(e);
            }
          }
          return Err(ExecuteError::Handler {
            module: name.to_string(),
            phase: phase.name.clone(),
            source,
          });
        }
      }
    }

    outcome.transitions.push(PhaseTransition::Done);
    info!(module = %name, "module complete");
    Ok(())
  }

  /// Reset the stored progress so the next run starts at the earliest
  /// recovery phase of `failed`, never later than `failed` itself.
  fn rewind_for_recovery(&self, module: &Module, failed: &Phase) -> Result<Option<RecoveryReset>, StateStoreError> {
    let graph = &module.phases;
    let Some(target) = graph.earliest(&failed.recovery_phases) else {
      return Ok(None);
    };
    let target = match (graph.position(&target.name), graph.position(&failed.name)) {
      (Some(t), Some(f)) if t > f => failed,
      _ => target,
    };

    let name = module.name.as_str();
    let revision = module.source_revision();
    match graph.before(&target.name) {
      Some(previous) => self.store.set_last_completed(name, Some(&previous.name), revision)?,
      None => self.store.invalidate(name)?,
    }

    info!(module = %name, failed = %failed.name, resume_from = %target.name, "build state rewound for recovery");
    Ok(Some(RecoveryReset {
      failed_phase: failed.name.clone(),
      resume_from: target.name.clone(),
    }))
  }
}
