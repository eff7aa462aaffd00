use std::path::{Path, PathBuf};

use crate::consts::APP_NAME;

/// Returns the user's home directory.
///
/// Falls back to the current directory when the home variable is not set,
/// which only happens in stripped-down service environments.
pub fn home_dir() -> PathBuf {
  #[cfg(windows)]
  let var = "USERPROFILE";
  #[cfg(not(windows))]
  let var = "HOME";

  std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

/// Expand a leading `~` to the home directory. Other paths are returned as-is.
pub fn expand_path(path: &Path) -> PathBuf {
  let path_str = path.to_string_lossy();
  if path_str == "~" {
    home_dir()
  } else if let Some(rest) = path_str.strip_prefix("~/") {
    home_dir().join(rest)
  } else {
    path.to_path_buf()
  }
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Default location of the config file.
pub fn config_file() -> PathBuf {
  config_dir().join("config.toml")
}

/// Directory holding per-module build state records.
///
/// `MBUILD_STATE_DIR` overrides the default `<data_dir>/state`.
pub fn state_dir() -> PathBuf {
  if let Ok(path) = std::env::var("MBUILD_STATE_DIR") {
    return PathBuf::from(path);
  }
  data_dir().join("state")
}

/// Root under which modules are checked out, built and installed by default.
pub fn work_dir() -> PathBuf {
  home_dir().join(APP_NAME)
}
