//! Implementation of the `mbuild build` command.
//!
//! Resolves the requested modules and their dependencies from the module set,
//! runs every outstanding phase, and records runtime system dependencies of
//! the modules that were built into the prefix.

use std::collections::HashSet;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::warn;

use mbuild_lib::execute::{ExecuteConfig, HandlerRegistry, execute_modules};
use mbuild_lib::sysdeps::runtime::record_runtime_dependencies;
use mbuild_lib::sysdeps::{HostPackageQuery, classify_modules};
use mbuild_lib::version::DpkgComparator;

use super::Session;
use crate::output::{format_duration, print_error, print_info, print_success, print_warning, symbols};

#[derive(Args, Debug)]
pub struct BuildArgs {
  /// Modules to build (default: the whole module set)
  modules: Vec<String>,

  /// Discard recorded progress and start every module from its first phase
  #[arg(long)]
  force_checkout: bool,

  /// Maximum number of modules built at the same time
  #[arg(short = 'j', long)]
  parallelism: Option<usize>,

  /// Skip system-preferred modules the host already provides
  #[arg(long)]
  use_system: bool,
}

pub fn cmd_build(session: &Session, args: BuildArgs) -> Result<ExitCode> {
  let moduleset = session.moduleset()?;
  let modules = moduleset
    .full_module_list(&args.modules)
    .context("Failed to resolve modules")?;

  let satisfied_by_system = if args.use_system {
    satisfied_by_system(&modules)
  } else {
    HashSet::new()
  };

  let config = ExecuteConfig {
    parallelism: args.parallelism.unwrap_or_else(|| session.config.parallelism()),
    force_checkout: args.force_checkout,
    satisfied_by_system,
  };
  let ctx = Arc::new(session.config.build_context());
  let store = Arc::new(session.state_store());
  let handlers = Arc::new(HandlerRegistry::with_shell_defaults());

  print_info(&format!("Building {} module(s)", modules.len()));

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(execute_modules(&modules, handlers, store, ctx.clone(), &config))
    .context("Build failed")?;

  for module in modules.iter().filter(|m| report.built.contains_key(&m.name)) {
    if let Err(e) = record_runtime_dependencies(&ctx.prefix, module) {
      warn!(module = %module.name, error = %e, "failed to record runtime dependencies");
    }
  }

  println!();
  for (name, outcome) in &report.built {
    println!("  {} {} ({})", symbols::SUCCESS, name, format_duration(outcome.elapsed));
  }
  for (name, reason) in &report.skipped {
    println!("  {} {} ({})", symbols::INFO, name, reason);
  }
  for (name, outcome) in &report.failed {
    let error = outcome.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
    println!("  {} {}: {}", symbols::ERROR, name, error);
    if let Some(recovery) = &outcome.recovery {
      println!(
        "      next run restarts at '{}' {} '{}' failed",
        recovery.resume_from,
        symbols::ARROW,
        recovery.failed_phase
      );
    }
    if let Some(e) = &outcome.recovery_error {
      print_warning(&format!("Could not rewind build state of {}: {}", name, e));
    }
  }
  println!();

  if report.is_success() {
    print_success(&format!(
      "Built {} module(s), skipped {}",
      report.built.len(),
      report.skipped.len()
    ));
    Ok(ExitCode::SUCCESS)
  } else {
    print_error(&format!("{} of {} module(s) failed", report.failed.len(), report.total()));
    Ok(ExitCode::FAILURE)
  }
}

/// System-preferred modules whose system package is new enough.
fn satisfied_by_system(modules: &[Arc<mbuild_lib::module::Module>]) -> HashSet<String> {
  let candidates: Vec<_> = modules.iter().filter(|m| m.system_preferred).cloned().collect();
  if candidates.is_empty() {
    return HashSet::new();
  }

  let states = classify_modules(&candidates, &HostPackageQuery::new(), &DpkgComparator);
  let satisfied = states.new_enough_modules();
  if satisfied.is_empty() {
    print_warning("No system-preferred module is provided by the system, building all of them");
  }
  satisfied
}
