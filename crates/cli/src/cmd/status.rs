//! Status command implementation.
//!
//! Lists the recorded build progress per module. With a module set available,
//! records whose revision no longer matches are marked stale.

use std::process::ExitCode;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;
use tracing::debug;

use mbuild_lib::state::BuildStateStore;

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_stat, symbols};

#[derive(Args, Debug)]
pub struct StatusArgs {
  /// Only show these modules
  modules: Vec<String>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  output: OutputFormat,
}

#[derive(Debug, Serialize)]
struct ModuleStatus {
  module: String,
  last_completed_phase: Option<String>,
  source_revision: String,
  updated_at: u64,
  /// `None` when no module set is available to compare against.
  stale: Option<bool>,
}

pub fn cmd_status(session: &Session, args: StatusArgs, verbose: bool) -> Result<ExitCode> {
  let store = session.state_store();
  let records = store.list().context("Failed to read build state")?;

  let moduleset = match session.moduleset() {
    Ok(set) => Some(set),
    Err(e) => {
      debug!(error = %e, "module set unavailable, not checking revisions");
      None
    }
  };

  let statuses: Vec<ModuleStatus> = records
    .into_iter()
    .filter(|(name, _)| args.modules.is_empty() || args.modules.contains(name))
    .map(|(module, record)| {
      let stale = moduleset.as_ref().map(|set| {
        set
          .get(&module)
          .is_none_or(|m| m.source_revision() != record.source_revision)
      });
      ModuleStatus {
        module,
        last_completed_phase: record.last_completed_phase,
        source_revision: record.source_revision,
        updated_at: record.updated_at,
        stale,
      }
    })
    .collect();

  if args.output.is_json() {
    print_json(&statuses)?;
    return Ok(ExitCode::SUCCESS);
  }

  if statuses.is_empty() {
    print_info("No build state recorded. Run 'mbuild build' to start.");
    return Ok(ExitCode::SUCCESS);
  }

  if verbose {
    print_stat("State directory", &store.dir().display().to_string());
    println!();
  }

  for status in &statuses {
    let phase = status.last_completed_phase.as_deref().unwrap_or("(none)");
    let marker = if status.stale == Some(true) {
      format!(
        " {}",
        "stale".if_supports_color(Stream::Stdout, |s| s.yellow())
      )
    } else {
      String::new()
    };
    println!("  {} {} {} {}{}", symbols::INFO, status.module, symbols::ARROW, phase, marker);

    if verbose {
      print_stat("    revision", &status.source_revision);
      let updated = UNIX_EPOCH + Duration::from_secs(status.updated_at);
      print_stat("    updated", &humantime::format_rfc3339_seconds(updated).to_string());
    }
  }

  Ok(ExitCode::SUCCESS)
}
