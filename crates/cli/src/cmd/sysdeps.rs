//! Implementation of the `mbuild sysdeps` command.
//!
//! Without a mode flag, classifies every module that can be provided by the
//! system and prints what is installed, too old, or missing. The dump modes
//! print one `kind:id[,kind:id]*` line per dependency for scripting.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use mbuild_lib::module::Module;
use mbuild_lib::sysdeps::dump::{dump_all, dump_runtime, dump_unmet};
use mbuild_lib::sysdeps::runtime::{recorded_runtime_dependencies, resolve_runtime_packages, runtime_dependencies};
use mbuild_lib::sysdeps::{
  Category, HostPackageQuery, InstallPlan, PlanEntry, PlannerOptions, UNKNOWN_VERSION, classify_modules,
  execute_plan, find_best, plan_installs,
};
use mbuild_lib::version::DpkgComparator;

use super::Session;
use crate::output::{OutputFormat, print_category_entry, print_info, print_json, print_success, print_warning};

#[derive(Args, Debug)]
pub struct SysdepsArgs {
  /// Modules to check (default: the whole module set)
  modules: Vec<String>,

  /// Print dependencies the system does not satisfy
  #[arg(long, group = "mode")]
  dump: bool,

  /// Print every system dependency
  #[arg(long, group = "mode")]
  dump_all: bool,

  /// Print dependencies needed at runtime
  #[arg(long, group = "mode")]
  dump_runtime: bool,

  /// Print the installed packages providing runtime dependencies
  #[arg(long, group = "mode")]
  dump_runtime_packages: bool,

  /// Install missing and outdated packages with the system package manager
  #[arg(long, group = "mode")]
  install: bool,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  output: OutputFormat,
}

pub fn cmd_sysdeps(session: &Session, args: SysdepsArgs) -> Result<ExitCode> {
  let moduleset = session.moduleset()?;
  let modules = moduleset
    .full_module_list(&args.modules)
    .context("Failed to resolve modules")?;
  let options = PlannerOptions {
    partial_build: session.config.partial_build,
  };

  if args.dump_all {
    print_lines(&dump_all(&modules), args.output)?;
    return Ok(ExitCode::SUCCESS);
  }
  if args.dump_runtime {
    print_lines(&dump_runtime(&modules), args.output)?;
    return Ok(ExitCode::SUCCESS);
  }
  if args.dump_runtime_packages {
    return cmd_runtime_packages(session, &modules, args.output);
  }

  let oracle = HostPackageQuery::new();
  let states = classify_modules(&modules, &oracle, &DpkgComparator);

  if args.dump {
    let unmet = dump_unmet(&states, &options);
    print_lines(&unmet.lines, args.output)?;
    return Ok(exit_code(!unmet.has_too_old_required));
  }

  let mut plan = plan_installs(&states, &options);

  if args.install {
    let installer = find_best();
    execute_plan(&plan, installer.as_deref()).context("Failed to install system dependencies")?;
    let states = classify_modules(&modules, &oracle, &DpkgComparator);
    plan = plan_installs(&states, &options);
  }

  if args.output.is_json() {
    print_json(&plan)?;
  } else {
    print_report(&plan, options.partial_build);
  }

  Ok(exit_code(!plan.has_blocking()))
}

fn exit_code(success: bool) -> ExitCode {
  if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn print_lines(lines: &[String], output: OutputFormat) -> Result<()> {
  if output.is_json() {
    return print_json(&lines);
  }
  for line in lines {
    println!("{}", line);
  }
  Ok(())
}

#[derive(Debug, Serialize)]
struct RuntimePackage<'a> {
  package: &'a str,
  version: &'a str,
}

fn cmd_runtime_packages(session: &Session, modules: &[Arc<Module>], output: OutputFormat) -> Result<ExitCode> {
  let mut dependencies = runtime_dependencies(modules);
  dependencies.extend(recorded_runtime_dependencies(&session.config.prefix));

  let packages = resolve_runtime_packages(&dependencies, &HostPackageQuery::new());

  if output.is_json() {
    let packages: Vec<_> = packages
      .iter()
      .map(|(package, version)| RuntimePackage { package, version })
      .collect();
    print_json(&packages)?;
  } else {
    for (package, version) in &packages {
      println!("{}={}", package, version);
    }
  }
  Ok(ExitCode::SUCCESS)
}

fn print_report(plan: &InstallPlan, partial_build: bool) {
  print_section(plan, Category::NewEnough, "System installed packages which are new enough:");

  println!("Required packages:");
  print_section(plan, Category::TooOldRequired, "  System installed packages which are too old:");
  print_section(plan, Category::MissingRequired, "  No matching system package installed:");

  if partial_build {
    println!("Optional packages (modules that can be built instead):");
    print_section(plan, Category::TooOldOptional, "  System installed packages which are too old:");
    print_section(plan, Category::MissingOptional, "  No matching system package installed:");
  }

  let unknown: Vec<_> = plan.in_category(Category::Unknown).collect();
  if !unknown.is_empty() {
    println!();
    for entry in unknown {
      print_warning(&format!(
        "Could not check {}: {}",
        entry.module,
        entry.reason.as_deref().unwrap_or("unknown error")
      ));
    }
  }

  println!();
  if plan.has_blocking() {
    print_info(&format!(
      "{} required module(s) cannot be built from source; install them with 'mbuild sysdeps --install'",
      plan.in_category(Category::TooOldRequired).count() + plan.in_category(Category::MissingRequired).count()
    ));
  } else {
    print_success("All required system dependencies are satisfied");
  }
}

fn print_section(plan: &InstallPlan, category: Category, title: &str) {
  let indent = " ".repeat(title.len() - title.trim_start().len() + 2);
  println!("{}", title);

  let entries: Vec<_> = plan.in_category(category).collect();
  if entries.is_empty() {
    println!("{}(none)", indent);
    return;
  }
  for entry in entries {
    print_category_entry(&indent, category, &describe(entry));
  }
}

fn describe(entry: &PlanEntry) -> String {
  let mut details = Vec::new();
  if let Some(pc) = &entry.pkg_config {
    details.push(format!("{}.pc", pc));
  }
  if let Some(installed) = entry.installed_version.as_deref().filter(|v| *v != UNKNOWN_VERSION) {
    details.push(format!("installed={}", installed));
  }
  if let Some(required) = &entry.required_version {
    details.push(format!("required={}", required));
  }

  if details.is_empty() {
    entry.module.clone()
  } else {
    format!("{} ({})", entry.module, details.join(", "))
  }
}
