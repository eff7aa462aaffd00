//! Declarative system dependency types.
//!
//! A [`SystemDependency`] is a primary `(kind, identifier)` pair plus an ordered
//! list of alternatives. Any one of them being present on the host satisfies the
//! requirement. The text form `kind:id[,kind:id]*` is what the dump modes print
//! and what the per-prefix runtime sysdeps files contain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a dependency identifier is probed on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencyKind {
  /// A pkg-config module name (without the `.pc` suffix).
  Pkgconfig,
  /// An absolute file path, or an executable name searched on `PATH`.
  Path,
  /// A header below one of the C include directories.
  CInclude,
  /// A named distribution package.
  Package,
  /// An entry in the system XML catalog.
  Xml,
  /// A module importable by `python3`.
  Python,
  /// Any other kind, passed through verbatim.
  Other(String),
}

impl DependencyKind {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Pkgconfig => "pkgconfig",
      Self::Path => "path",
      Self::CInclude => "c_include",
      Self::Package => "package",
      Self::Xml => "xml",
      Self::Python => "python3",
      Self::Other(kind) => kind,
    }
  }
}

impl From<&str> for DependencyKind {
  fn from(value: &str) -> Self {
    match value {
      "pkgconfig" | "pkg-config" => Self::Pkgconfig,
      "path" => Self::Path,
      "c_include" | "c-include" => Self::CInclude,
      "package" => Self::Package,
      "xml" => Self::Xml,
      "python" | "python3" => Self::Python,
      other => Self::Other(other.to_string()),
    }
  }
}

impl From<String> for DependencyKind {
  fn from(value: String) -> Self {
    Self::from(value.as_str())
  }
}

impl From<DependencyKind> for String {
  fn from(value: DependencyKind) -> Self {
    value.as_str().to_string()
  }
}

impl fmt::Display for DependencyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseDependencyError {
  #[error("dependency '{0}' is not of the form kind:identifier")]
  MissingSeparator(String),

  #[error("dependency '{0}' has an empty kind or identifier")]
  Empty(String),
}

/// A single `(kind, identifier)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyRef {
  pub kind: DependencyKind,
  #[serde(rename = "id")]
  pub identifier: String,
}

impl DependencyRef {
  pub fn new(kind: impl Into<DependencyKind>, identifier: impl Into<String>) -> Self {
    Self {
      kind: kind.into(),
      identifier: identifier.into(),
    }
  }

  pub fn pkgconfig(name: impl Into<String>) -> Self {
    Self::new(DependencyKind::Pkgconfig, name)
  }

  pub fn path(path: impl Into<String>) -> Self {
    Self::new(DependencyKind::Path, path)
  }

  pub fn package(name: impl Into<String>) -> Self {
    Self::new(DependencyKind::Package, name)
  }
}

impl fmt::Display for DependencyRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.kind, self.identifier)
  }
}

impl FromStr for DependencyRef {
  type Err = ParseDependencyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    let (kind, identifier) = s
      .split_once(':')
      .ok_or_else(|| ParseDependencyError::MissingSeparator(s.to_string()))?;
    let (kind, identifier) = (kind.trim(), identifier.trim());
    if kind.is_empty() || identifier.is_empty() {
      return Err(ParseDependencyError::Empty(s.to_string()));
    }
    Ok(Self::new(kind, identifier))
  }
}

/// A requirement satisfiable by any one of its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDependency {
  #[serde(flatten)]
  pub primary: DependencyRef,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub alternatives: Vec<DependencyRef>,
}

impl SystemDependency {
  pub fn new(primary: DependencyRef) -> Self {
    Self {
      primary,
      alternatives: Vec::new(),
    }
  }

  pub fn with_alternative(mut self, alternative: DependencyRef) -> Self {
    self.alternatives.push(alternative);
    self
  }

  /// Primary first, then alternatives in declaration order.
  pub fn candidates(&self) -> impl Iterator<Item = &DependencyRef> {
    std::iter::once(&self.primary).chain(self.alternatives.iter())
  }
}

impl From<DependencyRef> for SystemDependency {
  fn from(primary: DependencyRef) -> Self {
    Self::new(primary)
  }
}

impl fmt::Display for SystemDependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.primary)?;
    for alternative in &self.alternatives {
      write!(f, ",{}", alternative)?;
    }
    Ok(())
  }
}

impl FromStr for SystemDependency {
  type Err = ParseDependencyError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut candidates = s.split(',').map(str::parse::<DependencyRef>);
    let primary = candidates
      .next()
      .ok_or_else(|| ParseDependencyError::MissingSeparator(s.to_string()))??;
    let alternatives = candidates.collect::<Result<Vec<_>, _>>()?;
    Ok(Self { primary, alternatives })
  }
}

/// One package request handed to an installer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstallRequest {
  pub module: String,
  pub kind: DependencyKind,
  pub identifier: String,
}

impl InstallRequest {
  pub fn new(module: impl Into<String>, dependency: &DependencyRef) -> Self {
    Self {
      module: module.into(),
      kind: dependency.kind.clone(),
      identifier: dependency.identifier.clone(),
    }
  }

  pub fn dependency(&self) -> DependencyRef {
    DependencyRef::new(self.kind.clone(), self.identifier.clone())
  }
}
