mod build;
mod reset;
mod status;
mod sysdeps;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use mbuild_lib::config::Config;
use mbuild_lib::moduleset::ModuleSet;
use mbuild_lib::state::FileStateStore;

pub use build::{BuildArgs, cmd_build};
pub use reset::{ResetArgs, cmd_reset};
pub use status::{StatusArgs, cmd_status};
pub use sysdeps::{SysdepsArgs, cmd_sysdeps};

/// Configuration shared by every command.
pub struct Session {
  pub config: Config,
  moduleset_override: Option<PathBuf>,
}

impl Session {
  pub fn load(config: Option<&Path>, moduleset: Option<PathBuf>) -> Result<Self> {
    let config = Config::load(config).context("Failed to load configuration")?;
    debug!(prefix = %config.prefix.display(), state_dir = %config.state_dir().display(), "configuration loaded");
    Ok(Self {
      config,
      moduleset_override: moduleset,
    })
  }

  /// The module set from `--moduleset`, falling back to the configured one.
  pub fn moduleset(&self) -> Result<ModuleSet> {
    let Some(path) = self.moduleset_override.as_ref().or(self.config.moduleset.as_ref()) else {
      bail!("No module set configured. Pass --moduleset or set 'moduleset' in the config file.");
    };
    ModuleSet::load(path).with_context(|| format!("Failed to load module set: {}", path.display()))
  }

  pub fn state_store(&self) -> FileStateStore {
    FileStateStore::new(self.config.state_dir())
  }
}
