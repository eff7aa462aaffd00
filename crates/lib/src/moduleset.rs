//! Module set loading.
//!
//! A module set is a TOML file with one `[[module]]` table per module:
//!
//! ```toml
//! [[module]]
//! name = "libfoo"
//! type = "system"
//! pkg-config = "libfoo"
//! version = "2.0"
//!
//! [[module]]
//! name = "app"
//! type = "qmake"
//! dependencies = ["libfoo"]
//! sysdeps = ["path:/usr/bin/xsltproc,package:xsltproc"]
//!
//! [module.commands]
//! build = "make -j4"
//! ```
//!
//! `sysdeps` entries are either `kind:id[,kind:id]*` strings or tables with
//! `kind`, `id` and `alternatives`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::module::Module;
use crate::phase::{ModuleType, Phase, PhaseGraphError};
use crate::sysdeps::types::{DependencyRef, ParseDependencyError, SystemDependency};

#[derive(Debug, Error)]
pub enum ModuleSetError {
  #[error("failed to read module set {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse module set {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("module '{module}' has invalid phases: {source}")]
  InvalidPhases {
    module: String,
    #[source]
    source: PhaseGraphError,
  },

  #[error("module '{module}' has an invalid system dependency: {source}")]
  InvalidDependency {
    module: String,
    #[source]
    source: ParseDependencyError,
  },

  #[error("module '{0}' is declared more than once")]
  DuplicateModule(String),

  #[error("invalid module name '{0}'")]
  InvalidName(String),

  #[error("module '{0}' is not in the module set")]
  UnknownModule(String),

  #[error("module dependencies form a cycle involving '{0}'")]
  DependencyCycle(String),
}

#[derive(Debug, Deserialize)]
struct ModuleSetFile {
  #[serde(default, rename = "module")]
  modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ModuleEntry {
  name: String,
  #[serde(rename = "type")]
  module_type: ModuleType,
  #[serde(default)]
  dependencies: Vec<String>,
  revision: Option<String>,
  pkg_config: Option<String>,
  version: Option<String>,
  #[serde(default)]
  system_preferred: bool,
  #[serde(default)]
  staged_install: bool,
  #[serde(default = "default_runtime")]
  runtime: bool,
  #[serde(default)]
  sysdeps: Vec<DependencyEntry>,
  #[serde(default)]
  commands: BTreeMap<String, String>,
  #[serde(default)]
  env: BTreeMap<String, String>,
  #[serde(default)]
  phases: Vec<Phase>,
}

fn default_runtime() -> bool {
  true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependencyEntry {
  Text(String),
  Table {
    kind: String,
    id: String,
    #[serde(default)]
    alternatives: Vec<AlternativeEntry>,
  },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AlternativeEntry {
  Text(String),
  Table(DependencyRef),
}

impl DependencyEntry {
  fn into_dependency(self) -> Result<SystemDependency, ParseDependencyError> {
    match self {
      Self::Text(text) => text.parse(),
      Self::Table { kind, id, alternatives } => {
        let primary = DependencyRef::new(kind, id);
        if primary.identifier.trim().is_empty() {
          return Err(ParseDependencyError::Empty(primary.to_string()));
        }
        alternatives.into_iter().try_fold(SystemDependency::new(primary), |dep, alt| {
          let alt = match alt {
            AlternativeEntry::Text(text) => text.parse()?,
            AlternativeEntry::Table(dep) => dep,
          };
          Ok(dep.with_alternative(alt))
        })
      }
    }
  }
}

impl ModuleEntry {
  fn into_module(self) -> Result<Module, ModuleSetError> {
    let name = self.name;
    let mut module = Module::with_phases(&name, self.module_type, &self.phases).map_err(|source| {
      ModuleSetError::InvalidPhases {
        module: name.clone(),
        source,
      }
    })?;

    module.system_dependencies = self
      .sysdeps
      .into_iter()
      .map(DependencyEntry::into_dependency)
      .collect::<Result<_, _>>()
      .map_err(|source| ModuleSetError::InvalidDependency { module: name, source })?;
    module.dependencies = self.dependencies;
    module.revision = self.revision;
    module.pkg_config = self.pkg_config;
    module.required_version = self.version;
    module.system_preferred = self.system_preferred;
    module.supports_staged_install = self.staged_install;
    module.runtime = self.runtime;
    module.commands = self.commands;
    module.env = self.env;
    Ok(module)
  }
}

/// All modules of a module set, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
  modules: Vec<Arc<Module>>,
  index: HashMap<String, usize>,
}

impl ModuleSet {
  pub fn load(path: &Path) -> Result<Self, ModuleSetError> {
    let path = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let content = std::fs::read_to_string(&path).map_err(|source| ModuleSetError::Read {
      path: path.clone(),
      source,
    })?;
    let file: ModuleSetFile = toml::from_str(&content).map_err(|source| ModuleSetError::Parse {
      path: path.clone(),
      source,
    })?;

    let set = Self::from_entries(file.modules)?;
    debug!(path = %path.display(), modules = set.len(), "loaded module set");
    Ok(set)
  }

  pub fn from_toml(content: &str) -> Result<Self, ModuleSetError> {
    let file: ModuleSetFile = toml::from_str(content).map_err(|source| ModuleSetError::Parse {
      path: PathBuf::from("<inline>"),
      source,
    })?;
    Self::from_entries(file.modules)
  }

  fn from_entries(entries: Vec<ModuleEntry>) -> Result<Self, ModuleSetError> {
    let modules = entries
      .into_iter()
      .map(ModuleEntry::into_module)
      .collect::<Result<Vec<_>, _>>()?;
    Self::from_modules(modules)
  }

  pub fn from_modules(modules: Vec<Module>) -> Result<Self, ModuleSetError> {
    let mut set = Self::default();
    for module in modules {
      if matches!(module.name.trim(), "" | "." | "..") {
        return Err(ModuleSetError::InvalidName(module.name));
      }
      if set.index.contains_key(&module.name) {
        return Err(ModuleSetError::DuplicateModule(module.name));
      }
      set.index.insert(module.name.clone(), set.modules.len());
      set.modules.push(Arc::new(module));
    }
    Ok(set)
  }

  pub fn get(&self, name: &str) -> Option<&Arc<Module>> {
    self.index.get(name).map(|&i| &self.modules[i])
  }

  pub fn modules(&self) -> &[Arc<Module>] {
    &self.modules
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// The requested modules plus everything they depend on, dependencies
  /// first. An empty request means the whole set. Dependencies naming
  /// modules outside the set are left to the caller.
  pub fn full_module_list(&self, requested: &[String]) -> Result<Vec<Arc<Module>>, ModuleSetError> {
    let roots: Vec<usize> = if requested.is_empty() {
      (0..self.modules.len()).collect()
    } else {
      requested
        .iter()
        .map(|name| {
          self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| ModuleSetError::UnknownModule(name.clone()))
        })
        .collect::<Result<_, _>>()?
    };

    let mut marks = vec![Mark::Unvisited; self.modules.len()];
    let mut ordered = Vec::new();
    for root in roots {
      self.visit(root, &mut marks, &mut ordered)?;
    }
    Ok(ordered)
  }

  fn visit(&self, idx: usize, marks: &mut [Mark], ordered: &mut Vec<Arc<Module>>) -> Result<(), ModuleSetError> {
    match marks[idx] {
      Mark::Done => return Ok(()),
      Mark::InProgress => return Err(ModuleSetError::DependencyCycle(self.modules[idx].name.clone())),
      Mark::Unvisited => {}
    }

    marks[idx] = Mark::InProgress;
    for dep in &self.modules[idx].dependencies {
      if let Some(&dep_idx) = self.index.get(dep) {
        self.visit(dep_idx, marks, ordered)?;
      }
    }
    marks[idx] = Mark::Done;
    ordered.push(Arc::clone(&self.modules[idx]));
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
  Unvisited,
  InProgress,
  Done,
}
