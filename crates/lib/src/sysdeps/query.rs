//! Host package queries.
//!
//! [`SystemPackageQuery`] answers two questions: which version of a
//! dependency is installed, and which package owns a file. The host
//! implementation shells out to the usual distribution tools; the static
//! implementation answers from a fixed table.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::platform;

use super::types::{DependencyKind, DependencyRef};

/// Version reported for dependencies whose presence is known but whose
/// version is not.
pub const UNKNOWN_VERSION: &str = "unknown";

const DEFAULT_XML_CATALOG: &str = "/etc/xml/catalog";
const DEFAULT_INCLUDE_DIRS: [&str; 2] = ["/usr/local/include", "/usr/include"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
  /// The tool needed to answer the query is missing or failed to start.
  #[error("package query unavailable: {0}")]
  OracleUnavailable(String),

  #[error("unsupported dependency kind '{0}'")]
  UnsupportedKind(String),
}

/// Read-only view of the packages installed on a system.
pub trait SystemPackageQuery: Send + Sync {
  /// Installed version of `dependency`, `Some(UNKNOWN_VERSION)` when present
  /// without a known version, `None` when absent.
  fn lookup_version(&self, dependency: &DependencyRef) -> Result<Option<String>, QueryError>;

  /// Name of the package owning `path`, if any.
  fn owner_of(&self, path: &Path) -> Result<Option<String>, QueryError>;
}

/// Queries the running host.
#[derive(Debug, Clone, Default)]
pub struct HostPackageQuery;

impl HostPackageQuery {
  pub fn new() -> Self {
    Self
  }

  fn pkgconfig_version(&self, name: &str) -> Result<Option<String>, QueryError> {
    run_probe("pkg-config", &["--modversion", name])
  }

  fn package_version(&self, name: &str) -> Result<Option<String>, QueryError> {
    if platform::has_command("dpkg-query") {
      let output = run_probe("dpkg-query", &["-W", "-f=${db:Status-Abbrev} ${Version}", name])?;
      return Ok(output.and_then(|out| parse_dpkg_status(&out)));
    }
    if platform::has_command("rpm") {
      let output = run_probe("rpm", &["-q", "--qf", "%{VERSION}-%{RELEASE}", name])?;
      return Ok(output.filter(|version| !version.is_empty()));
    }
    Err(QueryError::OracleUnavailable(
      "neither dpkg-query nor rpm is available".to_string(),
    ))
  }

  fn path_version(&self, path: &str) -> Result<Option<String>, QueryError> {
    let resolved = if Path::new(path).is_absolute() {
      Some(PathBuf::from(path)).filter(|p| p.exists())
    } else {
      platform::find_command(path)
    };

    let Some(resolved) = resolved else {
      return Ok(None);
    };

    // Owner's version when known, otherwise present without a version.
    let version = match self.owner_of(&resolved) {
      Ok(Some(package)) => self.package_version(&package).ok().flatten(),
      _ => None,
    };
    Ok(Some(version.unwrap_or_else(|| UNKNOWN_VERSION.to_string())))
  }

  fn c_include_present(&self, header: &str) -> bool {
    include_dirs().iter().any(|dir| dir.join(header).is_file())
  }

  fn xml_present(&self, identifier: &str) -> bool {
    xml_catalogs().iter().any(|catalog| {
      std::fs::read_to_string(catalog)
        .map(|content| content.contains(identifier))
        .unwrap_or(false)
    })
  }

  fn python_present(&self, module: &str) -> Result<bool, QueryError> {
    if !is_python_module_name(module) {
      warn!(module = %module, "not a valid python module name");
      return Ok(false);
    }
    let statement = format!("import {}", module);
    Ok(run_probe("python3", &["-c", &statement])?.is_some())
  }
}

impl SystemPackageQuery for HostPackageQuery {
  fn lookup_version(&self, dependency: &DependencyRef) -> Result<Option<String>, QueryError> {
    let id = dependency.identifier.as_str();
    let present = |found: bool| found.then(|| UNKNOWN_VERSION.to_string());

    let version = match &dependency.kind {
      DependencyKind::Pkgconfig => self.pkgconfig_version(id)?,
      DependencyKind::Package => self.package_version(id)?,
      DependencyKind::Path => self.path_version(id)?,
      DependencyKind::CInclude => present(self.c_include_present(id)),
      DependencyKind::Xml => present(self.xml_present(id)),
      DependencyKind::Python => present(self.python_present(id)?),
      DependencyKind::Other(kind) => return Err(QueryError::UnsupportedKind(kind.clone())),
    };

    debug!(dependency = %dependency, version = ?version, "looked up system dependency");
    Ok(version)
  }

  fn owner_of(&self, path: &Path) -> Result<Option<String>, QueryError> {
    let path = path.to_string_lossy();
    if platform::has_command("dpkg") {
      return Ok(run_probe("dpkg", &["-S", &path])?.and_then(|out| parse_dpkg_search(&out)));
    }
    if platform::has_command("rpm") {
      return run_probe("rpm", &["-qf", "--qf", "%{NAME}", &path]);
    }
    Err(QueryError::OracleUnavailable(
      "neither dpkg nor rpm is available".to_string(),
    ))
  }
}

/// Run a probe command. Success yields its trimmed stdout, a non-zero exit
/// means "not present", and a missing program is an unavailable oracle.
fn run_probe(program: &str, args: &[&str]) -> Result<Option<String>, QueryError> {
  trace!(program = %program, args = ?args, "running probe");
  let output = Command::new(program).args(args).output().map_err(|e| {
    if e.kind() == std::io::ErrorKind::NotFound {
      QueryError::OracleUnavailable(format!("{} not found", program))
    } else {
      QueryError::OracleUnavailable(format!("{}: {}", program, e))
    }
  })?;

  if !output.status.success() {
    return Ok(None);
  }
  let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
  Ok(Some(stdout))
}

/// First package named in `dpkg -S` output (`pkg[:arch][, pkg2]: /path`).
fn parse_dpkg_search(output: &str) -> Option<String> {
  let line = output.lines().find(|line| !line.starts_with("diversion by"))?;
  let (packages, _path) = line.split_once(": ")?;
  let first = packages.split(',').next()?.trim();
  let name = first.split(':').next()?.trim();
  (!name.is_empty()).then(|| name.to_string())
}

/// Version from `dpkg-query` status output (`ii  1.2-3`). dpkg also reports
/// removed and purged packages, so anything but `ii` is absent.
fn parse_dpkg_status(output: &str) -> Option<String> {
  let mut fields = output.split_whitespace();
  if fields.next()? != "ii" {
    return None;
  }
  fields.next().map(str::to_string)
}

fn include_dirs() -> Vec<PathBuf> {
  let mut dirs: Vec<PathBuf> = ["C_INCLUDE_PATH", "CPATH"]
    .iter()
    .filter_map(std::env::var_os)
    .flat_map(|value| std::env::split_paths(&value).collect::<Vec<_>>())
    .filter(|dir| !dir.as_os_str().is_empty())
    .collect();
  dirs.extend(DEFAULT_INCLUDE_DIRS.iter().map(PathBuf::from));
  dirs
}

fn xml_catalogs() -> Vec<PathBuf> {
  match std::env::var("XML_CATALOG_FILES") {
    Ok(files) if !files.trim().is_empty() => files
      .split_whitespace()
      .map(|f| PathBuf::from(f.trim_start_matches("file://")))
      .collect(),
    _ => vec![PathBuf::from(DEFAULT_XML_CATALOG)],
  }
}

fn is_python_module_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .split('.')
      .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Deterministic in-memory oracle.
#[derive(Debug, Clone, Default)]
pub struct StaticPackageQuery {
  versions: HashMap<DependencyRef, String>,
  owners: HashMap<PathBuf, String>,
  failing: HashSet<DependencyRef>,
}

impl StaticPackageQuery {
  pub fn new() -> Self {
    Self::default()
  }

  /// Report `dependency` as installed at `version`.
  pub fn with(mut self, dependency: DependencyRef, version: impl Into<String>) -> Self {
    self.versions.insert(dependency, version.into());
    self
  }

  pub fn with_owner(mut self, path: impl Into<PathBuf>, package: impl Into<String>) -> Self {
    self.owners.insert(path.into(), package.into());
    self
  }

  /// Fail every lookup of `dependency`.
  pub fn failing(mut self, dependency: DependencyRef) -> Self {
    self.failing.insert(dependency);
    self
  }
}

impl SystemPackageQuery for StaticPackageQuery {
  fn lookup_version(&self, dependency: &DependencyRef) -> Result<Option<String>, QueryError> {
    if self.failing.contains(dependency) {
      return Err(QueryError::OracleUnavailable(format!("lookup of {} failed", dependency)));
    }
    Ok(self.versions.get(dependency).cloned())
  }

  fn owner_of(&self, path: &Path) -> Result<Option<String>, QueryError> {
    Ok(self.owners.get(path).cloned())
  }
}
