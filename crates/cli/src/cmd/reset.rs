//! Implementation of the `mbuild reset` command.

use std::io::{self, BufRead, IsTerminal, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Args;

use mbuild_lib::state::BuildStateStore;

use super::Session;
use crate::output::{print_info, print_success};

#[derive(Args, Debug)]
pub struct ResetArgs {
  /// Modules whose build progress is discarded
  #[arg(required = true)]
  modules: Vec<String>,

  /// Skip confirmation prompt
  #[arg(long)]
  force: bool,
}

pub fn cmd_reset(session: &Session, args: ResetArgs) -> Result<ExitCode> {
  let store = session.state_store();

  let mut recorded = Vec::new();
  for module in &args.modules {
    if store.get(module).context("Failed to read build state")?.is_some() {
      recorded.push(module.as_str());
    } else {
      print_info(&format!("No build state recorded for {}", module));
    }
  }

  if recorded.is_empty() {
    return Ok(ExitCode::SUCCESS);
  }

  if !confirm(&format!("Reset build state of {} module(s)?", recorded.len()), args.force)? {
    print_info("Aborted");
    return Ok(ExitCode::FAILURE);
  }

  for module in &recorded {
    store
      .invalidate(module)
      .with_context(|| format!("Failed to reset {}", module))?;
  }
  print_success(&format!("Reset {} module(s): {}", recorded.len(), recorded.join(", ")));
  Ok(ExitCode::SUCCESS)
}

/// Ask on stderr; refuses to guess when nobody can answer.
fn confirm(question: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }
  if !io::stdin().is_terminal() {
    bail!("Refusing to reset without confirmation in non-interactive mode. Use --force.");
  }

  let mut stderr = io::stderr().lock();
  write!(stderr, "{} [y/N] ", question)?;
  stderr.flush()?;

  let mut answer = String::new();
  io::stdin().lock().read_line(&mut answer)?;
  Ok(answer.trim().eq_ignore_ascii_case("y") || answer.trim().eq_ignore_ascii_case("yes"))
}
