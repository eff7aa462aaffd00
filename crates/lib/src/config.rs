//! User configuration and the derived build context.
//!
//! Configuration is read from a TOML file (by default
//! `<config_dir>/mbuild/config.toml`) and then overridden by environment
//! variables:
//!
//! - `MBUILD_PREFIX`: install prefix
//! - `MBUILD_STATE_DIR`: build state directory
//! - `MBUILD_BUILDROOT`: out-of-tree build root
//!
//! ```toml
//! moduleset = "gnome.toml"
//! prefix = "/opt/gnome"
//! checkoutroot = "~/src"
//! parallelism = 4
//!
//! [env]
//! CFLAGS = "-O2"
//!
//! [module_env.glib]
//! CFLAGS = "-O0 -g"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::module::Module;
use crate::platform::paths;

pub const PREFIX_ENV: &str = "MBUILD_PREFIX";
pub const STATE_DIR_ENV: &str = "MBUILD_STATE_DIR";
pub const BUILDROOT_ENV: &str = "MBUILD_BUILDROOT";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("parallelism must be at least 1")]
  ZeroParallelism,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Module set file. Relative paths resolve against the config file.
  pub moduleset: Option<PathBuf>,
  pub prefix: PathBuf,
  pub checkoutroot: PathBuf,
  /// Out-of-tree build root. Modules build in their checkout when unset.
  pub buildroot: Option<PathBuf>,
  pub state_dir: Option<PathBuf>,
  /// Offer optional (buildable) modules for system installation too.
  pub partial_build: bool,
  pub parallelism: Option<usize>,
  pub env: BTreeMap<String, String>,
  pub module_env: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for Config {
  fn default() -> Self {
    let work_dir = paths::work_dir();
    Self {
      moduleset: None,
      prefix: work_dir.join("install"),
      checkoutroot: work_dir.join("checkout"),
      buildroot: None,
      state_dir: None,
      partial_build: true,
      parallelism: None,
      env: BTreeMap::new(),
      module_env: BTreeMap::new(),
    }
  }
}

impl Config {
  /// Load from `path`, or from the default location if it exists, then apply
  /// environment overrides. A missing default file yields the defaults.
  pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match path {
      Some(path) => Self::load_from_file(path)?,
      None => {
        let default_path = paths::config_file();
        if default_path.exists() {
          Self::load_from_file(&default_path)?
        } else {
          debug!(path = %default_path.display(), "no config file, using defaults");
          Self::default()
        }
      }
    };

    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
  }

  pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let mut config = Self::from_toml(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;

    config.expand_home();
    if let Some(parent) = path.parent()
      && let Some(moduleset) = config.moduleset.as_mut()
      && moduleset.is_relative()
    {
      *moduleset = parent.join(&*moduleset);
    }

    debug!(path = %path.display(), "loaded config file");
    Ok(config)
  }

  pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  fn apply_env_overrides(&mut self) {
    if let Ok(prefix) = std::env::var(PREFIX_ENV)
      && !prefix.is_empty()
    {
      self.prefix = paths::expand_path(Path::new(&prefix));
    }
    if let Ok(dir) = std::env::var(STATE_DIR_ENV)
      && !dir.is_empty()
    {
      self.state_dir = Some(paths::expand_path(Path::new(&dir)));
    }
    if let Ok(dir) = std::env::var(BUILDROOT_ENV)
      && !dir.is_empty()
    {
      self.buildroot = Some(paths::expand_path(Path::new(&dir)));
    }
  }

  /// Expand `~` in every path-valued key.
  fn expand_home(&mut self) {
    self.prefix = paths::expand_path(&self.prefix);
    self.checkoutroot = paths::expand_path(&self.checkoutroot);
    for path in [&mut self.moduleset, &mut self.buildroot, &mut self.state_dir]
      .into_iter()
      .flatten()
    {
      *path = paths::expand_path(path);
    }
  }

  fn validate(&self) -> Result<(), ConfigError> {
    if self.parallelism == Some(0) {
      return Err(ConfigError::ZeroParallelism);
    }
    Ok(())
  }

  pub fn state_dir(&self) -> PathBuf {
    self.state_dir.clone().unwrap_or_else(paths::state_dir)
  }

  pub fn parallelism(&self) -> usize {
    self
      .parallelism
      .unwrap_or_else(|| std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4))
  }

  pub fn build_context(&self) -> BuildContext {
    BuildContext {
      prefix: self.prefix.clone(),
      checkout_root: self.checkoutroot.clone(),
      build_root: self.buildroot.clone(),
      env: self.env.clone(),
      module_env: self.module_env.clone(),
    }
  }
}

/// Immutable per-build context shared by the executor and phase handlers.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
  pub prefix: PathBuf,
  pub checkout_root: PathBuf,
  pub build_root: Option<PathBuf>,
  pub env: BTreeMap<String, String>,
  pub module_env: BTreeMap<String, BTreeMap<String, String>>,
}

impl BuildContext {
  pub fn srcdir(&self, module: &Module) -> PathBuf {
    self.checkout_root.join(&module.name)
  }

  pub fn builddir(&self, module: &Module) -> PathBuf {
    match &self.build_root {
      Some(root) => root.join(&module.name),
      None => self.srcdir(module),
    }
  }

  /// Staging root for modules that install into a destdir first.
  pub fn destdir(&self, module: &Module) -> Option<PathBuf> {
    module
      .supports_staged_install
      .then(|| self.build_root.as_deref().unwrap_or(&self.checkout_root).join(format!("root-{}", module.name)))
  }

  /// Environment for one module's phase commands. Later layers win: global
  /// `env`, then `module_env.<name>`, then the module's own `env`.
  pub fn environment_for(&self, module: &Module) -> BTreeMap<String, String> {
    let prefix = self.prefix.display().to_string();
    let mut env = BTreeMap::from([
      (PREFIX_ENV.to_string(), prefix.clone()),
      ("MBUILD_MODULE".to_string(), module.name.clone()),
      ("MBUILD_SRCDIR".to_string(), self.srcdir(module).display().to_string()),
      ("MBUILD_BUILDDIR".to_string(), self.builddir(module).display().to_string()),
      (
        "PKG_CONFIG_PATH".to_string(),
        prepend_path(&self.prefix.join("lib").join("pkgconfig"), std::env::var("PKG_CONFIG_PATH").ok()),
      ),
      (
        "PATH".to_string(),
        prepend_path(&self.prefix.join("bin"), std::env::var("PATH").ok()),
      ),
    ]);
    if let Some(destdir) = self.destdir(module) {
      env.insert("DESTDIR".to_string(), destdir.display().to_string());
    }

    env.extend(self.env.clone());
    if let Some(overrides) = self.module_env.get(&module.name) {
      env.extend(overrides.clone());
    }
    env.extend(module.env.clone());
    env
  }
}

fn prepend_path(dir: &Path, existing: Option<String>) -> String {
  match existing {
    Some(existing) if !existing.is_empty() => format!("{}:{}", dir.display(), existing),
    _ => dir.display().to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::phase::ModuleType;
  use serial_test::serial;
  use tempfile::TempDir;

  #[test]
  fn parses_all_keys() {
    let config = Config::from_toml(
      r#"
      moduleset = "set.toml"
      prefix = "/opt/mb"
      checkoutroot = "/src"
      buildroot = "/build"
      state_dir = "/var/mb"
      partial_build = false
      parallelism = 3

      [env]
      CFLAGS = "-O2"

      [module_env.glib]
      CFLAGS = "-O0"
      "#,
    )
    .unwrap();

    assert_eq!(config.prefix, PathBuf::from("/opt/mb"));
    assert_eq!(config.buildroot, Some(PathBuf::from("/build")));
    assert!(!config.partial_build);
    assert_eq!(config.parallelism(), 3);
    assert_eq!(config.state_dir(), PathBuf::from("/var/mb"));
    assert_eq!(config.module_env["glib"]["CFLAGS"], "-O0");
  }

  #[test]
  fn defaults_allow_partial_builds() {
    let config = Config::from_toml("").unwrap();
    assert!(config.partial_build);
    assert!(config.parallelism() >= 1);
  }

  #[test]
  fn rejects_unknown_value_types() {
    assert!(Config::from_toml("parallelism = \"many\"").is_err());
  }

  #[test]
  #[serial]
  fn env_overrides_file_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "prefix = \"/opt/file\"\nmoduleset = \"mods.toml\"\n").unwrap();

    temp_env::with_vars(
      [
        (PREFIX_ENV, Some("/opt/env")),
        (STATE_DIR_ENV, Some("/tmp/state")),
        (BUILDROOT_ENV, None),
      ],
      || {
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.prefix, PathBuf::from("/opt/env"));
        assert_eq!(config.state_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(config.moduleset, Some(temp.path().join("mods.toml")));
      },
    );
  }

  #[test]
  #[serial]
  fn tilde_paths_expand_to_home() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(
      &path,
      "moduleset = \"~/sets/gnome.toml\"\nprefix = \"~/opt\"\ncheckoutroot = \"~/src\"\nbuildroot = \"~/build\"\n",
    )
    .unwrap();

    temp_env::with_vars(
      [
        ("HOME", Some("/home/builder")),
        (PREFIX_ENV, None),
        (STATE_DIR_ENV, Some("~/state")),
        (BUILDROOT_ENV, None),
      ],
      || {
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.moduleset, Some(PathBuf::from("/home/builder/sets/gnome.toml")));
        assert_eq!(config.prefix, PathBuf::from("/home/builder/opt"));
        assert_eq!(config.checkoutroot, PathBuf::from("/home/builder/src"));
        assert_eq!(config.buildroot, Some(PathBuf::from("/home/builder/build")));
        assert_eq!(config.state_dir(), PathBuf::from("/home/builder/state"));

        let module = Module::new("glib", ModuleType::Pip).unwrap();
        assert_eq!(config.build_context().srcdir(&module), PathBuf::from("/home/builder/src/glib"));
      },
    );
  }

  #[test]
  #[serial]
  fn zero_parallelism_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "parallelism = 0\n").unwrap();
    temp_env::with_vars_unset([PREFIX_ENV, STATE_DIR_ENV, BUILDROOT_ENV], || {
      assert!(matches!(Config::load(Some(&path)), Err(ConfigError::ZeroParallelism)));
    });
  }

  #[test]
  fn missing_file_is_a_read_error() {
    let err = Config::load_from_file(Path::new("/nonexistent/mbuild.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }

  #[test]
  fn context_layers_environment() {
    let mut config = Config::from_toml("prefix = \"/opt/mb\"\ncheckoutroot = \"/src\"").unwrap();
    config.env.insert("CFLAGS".into(), "-O2".into());
    config.env.insert("LDFLAGS".into(), "-s".into());
    config
      .module_env
      .insert("glib".into(), BTreeMap::from([("CFLAGS".to_string(), "-O0".to_string())]));
    let ctx = config.build_context();

    let mut module = Module::new("glib", ModuleType::Qmake).unwrap();
    module.env.insert("LDFLAGS".into(), "-g".into());
    let env = ctx.environment_for(&module);

    assert_eq!(env["CFLAGS"], "-O0");
    assert_eq!(env["LDFLAGS"], "-g");
    assert_eq!(env[PREFIX_ENV], "/opt/mb");
    assert!(env["PKG_CONFIG_PATH"].starts_with("/opt/mb/lib/pkgconfig"));
    assert!(!env.contains_key("DESTDIR"));
  }

  #[test]
  fn staged_modules_get_destdir() {
    let ctx = BuildContext {
      prefix: PathBuf::from("/opt/mb"),
      checkout_root: PathBuf::from("/src"),
      build_root: Some(PathBuf::from("/build")),
      ..Default::default()
    };
    let mut module = Module::new("qtapp", ModuleType::Qmake).unwrap();
    assert_eq!(ctx.builddir(&module), PathBuf::from("/build/qtapp"));
    assert_eq!(ctx.srcdir(&module), PathBuf::from("/src/qtapp"));
    assert!(ctx.destdir(&module).is_none());

    module.supports_staged_install = true;
    assert_eq!(ctx.destdir(&module), Some(PathBuf::from("/build/root-qtapp")));
    assert_eq!(ctx.environment_for(&module)["DESTDIR"], "/build/root-qtapp");
  }
}
