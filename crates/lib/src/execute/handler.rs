//! Phase handlers: the seam between the executor and the build tools.

use std::collections::HashMap;
use std::process::Command;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::BuildContext;
use crate::module::Module;
use crate::phase::{ModuleType, Phase};

use super::types::HandlerError;

/// Performs one phase of one module. Calls block until the phase finishes.
pub trait PhaseHandler: Send + Sync {
  fn execute(&self, module: &Module, phase: &Phase, ctx: &BuildContext) -> Result<(), HandlerError>;
}

/// Selects the handler for a module.
pub trait PhaseHandlerProvider: Send + Sync {
  fn handler_for(&self, module: &Module) -> Option<&dyn PhaseHandler>;
}

/// Handlers keyed by module type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
  handlers: HashMap<ModuleType, Arc<dyn PhaseHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry running declared shell commands for every buildable type.
  pub fn with_shell_defaults() -> Self {
    let shell: Arc<dyn PhaseHandler> = Arc::new(ShellPhaseHandler::default());
    let mut registry = Self::new();
    for module_type in [
      ModuleType::Qmake,
      ModuleType::Node,
      ModuleType::Npm,
      ModuleType::Pip,
      ModuleType::Custom,
    ] {
      registry.register(module_type, shell.clone());
    }
    registry
  }

  pub fn register(&mut self, module_type: ModuleType, handler: Arc<dyn PhaseHandler>) -> &mut Self {
    self.handlers.insert(module_type, handler);
    self
  }
}

impl PhaseHandlerProvider for HandlerRegistry {
  fn handler_for(&self, module: &Module) -> Option<&dyn PhaseHandler> {
    self.handlers.get(&module.module_type).map(|h| h.as_ref())
  }
}

/// Runs the module's declared command for a phase through a shell, in the
/// module's build directory and with the context environment.
///
/// Phases without a declared command succeed without running anything.
#[derive(Debug, Clone)]
pub struct ShellPhaseHandler {
  shell: String,
}

impl Default for ShellPhaseHandler {
  fn default() -> Self {
    Self {
      shell: "/bin/sh".to_string(),
    }
  }
}

impl ShellPhaseHandler {
  pub fn new(shell: impl Into<String>) -> Self {
    Self { shell: shell.into() }
  }
}

impl PhaseHandler for ShellPhaseHandler {
  fn execute(&self, module: &Module, phase: &Phase, ctx: &BuildContext) -> Result<(), HandlerError> {
    let Some(command) = module.command_for(&phase.name) else {
      debug!(module = %module.name, phase = %phase.name, "no command declared, nothing to do");
      return Ok(());
    };

    let builddir = ctx.builddir(module);
    std::fs::create_dir_all(&builddir)?;

    info!(module = %module.name, phase = %phase.name, cmd = %command, "executing command");

    let output = Command::new(&self.shell)
      .arg("-c")
      .arg(command)
      .current_dir(&builddir)
      .envs(ctx.environment_for(module))
      .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
      debug!(module = %module.name, stdout = %stdout.trim(), "command output");
    }

    if output.status.success() {
      return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
      warn!(module = %module.name, phase = %phase.name, stderr = %stderr.trim(), "command stderr");
    }

    match output.status.code() {
      Some(code) => Err(HandlerError::CommandFailed {
        command: command.to_string(),
        code: Some(code),
      }),
      None => Err(HandlerError::Interrupted {
        signal: signal_of(&output.status),
      }),
    }
  }
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
  use std::os::unix::process::ExitStatusExt;
  status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
  None
}
