//! Runtime system dependencies.
//!
//! System modules marked `runtime` contribute their requirements to the set
//! of packages an installed prefix needs at runtime. Built modules record
//! their own requirements below `<prefix>/.mbuild/sysdeps/`, one
//! `kind:id[,kind:id]*` line per requirement.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::consts::PREFIX_META_DIR;
use crate::module::Module;

use super::query::{SystemPackageQuery, UNKNOWN_VERSION};
use super::types::{DependencyKind, DependencyRef, SystemDependency};

pub const SYSDEPS_DIR: &str = "sysdeps";

pub fn sysdeps_dir(prefix: &Path) -> PathBuf {
  prefix.join(PREFIX_META_DIR).join(SYSDEPS_DIR)
}

/// Requirements of system modules needed at runtime, in module order.
pub fn runtime_dependencies(modules: &[Arc<Module>]) -> Vec<SystemDependency> {
  modules
    .iter()
    .filter(|m| m.system_module && m.runtime)
    .flat_map(|m| m.requirements())
    .collect()
}

/// Write the runtime requirements of a built module into the prefix.
///
/// Modules without requirements get no file; a stale file is removed.
pub fn record_runtime_dependencies(prefix: &Path, module: &Module) -> io::Result<()> {
  let path = sysdeps_dir(prefix).join(&module.name);
  if !module.runtime || !module.has_requirements() {
    return match fs::remove_file(&path) {
      Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    };
  }

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }
  let mut content = module
    .requirements()
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("\n");
  content.push('\n');
  fs::write(&path, content)?;
  debug!(module = %module.name, path = %path.display(), "recorded runtime dependencies");
  Ok(())
}

/// All requirements recorded below the prefix. Unreadable files and
/// malformed lines are logged and skipped.
pub fn recorded_runtime_dependencies(prefix: &Path) -> Vec<SystemDependency> {
  let dir = sysdeps_dir(prefix);
  if !dir.is_dir() {
    return Vec::new();
  }

  let mut dependencies = Vec::new();
  for entry in WalkDir::new(&dir).sort_by_file_name() {
    let entry = match entry {
      Ok(entry) => entry,
      Err(e) => {
        warn!(error = %e, "failed to walk sysdeps directory");
        continue;
      }
    };
    if !entry.file_type().is_file() {
      continue;
    }

    let content = match fs::read_to_string(entry.path()) {
      Ok(content) => content,
      Err(e) => {
        warn!(path = %entry.path().display(), error = %e, "failed to read sysdeps file");
        continue;
      }
    };

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
      match line.parse::<SystemDependency>() {
        Ok(dependency) => dependencies.push(dependency),
        Err(e) => warn!(path = %entry.path().display(), error = %e, "skipping malformed sysdeps entry"),
      }
    }
  }
  dependencies
}

/// Owning package and its version for each dependency.
///
/// Path candidates are resolved through their owning package and package
/// candidates name themselves; the first candidate that resolves wins.
pub fn resolve_runtime_packages(
  dependencies: &[SystemDependency],
  oracle: &dyn SystemPackageQuery,
) -> BTreeMap<String, String> {
  let mut packages = BTreeMap::new();

  for dependency in dependencies {
    let Some(package) = dependency.candidates().find_map(|c| owning_package(c, oracle)) else {
      warn!(dependency = %dependency, "no package owns this dependency");
      continue;
    };
    if packages.contains_key(&package) {
      continue;
    }

    match oracle.lookup_version(&DependencyRef::package(package.clone())) {
      Ok(Some(version)) if version != UNKNOWN_VERSION => {
        packages.insert(package, version);
      }
      Ok(_) => warn!(package = %package, "package version unknown"),
      Err(e) => warn!(package = %package, error = %e, "failed to query package version"),
    }
  }

  packages
}

fn owning_package(candidate: &DependencyRef, oracle: &dyn SystemPackageQuery) -> Option<String> {
  match &candidate.kind {
    DependencyKind::Package => Some(candidate.identifier.clone()),
    DependencyKind::Path if candidate.identifier.starts_with('/') => oracle
      .owner_of(Path::new(&candidate.identifier))
      .unwrap_or_else(|e| {
        debug!(path = %candidate.identifier, error = %e, "owner lookup failed");
        None
      }),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phase::ModuleType;
  use crate::sysdeps::query::StaticPackageQuery;
  use tempfile::TempDir;

  fn system_module(name: &str, runtime: bool, deps: &[&str]) -> Arc<Module> {
    let mut module = Module::new(name, ModuleType::System).unwrap();
    module.runtime = runtime;
    module.system_dependencies = deps.iter().map(|d| d.parse().unwrap()).collect();
    Arc::new(module)
  }

  #[test]
  fn only_runtime_system_modules_contribute() {
    let mut pc = (*system_module("glib", true, &[])).clone();
    pc.pkg_config = Some("glib-2.0".into());
    let built = {
      let mut m = Module::new("app", ModuleType::Pip).unwrap();
      m.system_dependencies = vec!["path:/usr/bin/app".parse().unwrap()];
      Arc::new(m)
    };
    let modules = [
      Arc::new(pc),
      system_module("headers", false, &["c_include:zlib.h"]),
      system_module("libz", true, &["path:/usr/lib/libz.so,path:/lib/libz.so"]),
      built,
    ];

    let lines: Vec<String> = runtime_dependencies(&modules).iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec!["pkgconfig:glib-2.0", "path:/usr/lib/libz.so,path:/lib/libz.so"]);
  }

  #[test]
  fn records_and_reads_back_prefix_files() {
    let temp = TempDir::new().unwrap();
    let mut module = Module::new("app", ModuleType::Pip).unwrap();
    module.system_dependencies = vec!["path:/usr/lib/libfoo.so,package:libfoo1".parse().unwrap()];

    record_runtime_dependencies(temp.path(), &module).unwrap();
    std::fs::write(sysdeps_dir(temp.path()).join("junk"), "not-a-dependency\n\n").unwrap();

    let recorded = recorded_runtime_dependencies(temp.path());
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].alternatives, vec![DependencyRef::package("libfoo1")]);

    module.system_dependencies.clear();
    record_runtime_dependencies(temp.path(), &module).unwrap();
    assert!(!sysdeps_dir(temp.path()).join("app").exists());
  }

  #[test]
  fn missing_sysdeps_dir_is_empty() {
    let temp = TempDir::new().unwrap();
    assert!(recorded_runtime_dependencies(temp.path()).is_empty());
  }

  #[test]
  fn resolves_owners_with_fallback_to_alternatives() {
    let oracle = StaticPackageQuery::new()
      .with_owner("/lib/libz.so", "zlib1g")
      .with(DependencyRef::package("zlib1g"), "1:1.3")
      .with(DependencyRef::package("libfoo1"), "2.0-1");
    let deps: Vec<SystemDependency> = [
      "path:/usr/lib/libz.so,path:/lib/libz.so",
      "package:libfoo1",
      "path:/lib/libz.so",
      "path:/nowhere",
    ]
    .iter()
    .map(|d| d.parse().unwrap())
    .collect();

    let packages = resolve_runtime_packages(&deps, &oracle);

    assert_eq!(
      packages,
      BTreeMap::from([
        ("libfoo1".to_string(), "2.0-1".to_string()),
        ("zlib1g".to_string(), "1:1.3".to_string()),
      ])
    );
  }
}
