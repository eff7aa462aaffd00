//! Host platform helpers: well-known directories and command discovery.

pub mod paths;

use std::path::PathBuf;

/// Locate an executable on `PATH`.
pub fn find_command(name: &str) -> Option<PathBuf> {
  which::which(name).ok()
}

/// Returns true if `name` can be found on `PATH`.
pub fn has_command(name: &str) -> bool {
  find_command(name).is_some()
}

/// Returns true if the current process runs with root privileges.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  #[serial]
  #[cfg(unix)]
  fn finds_executables_on_path() {
    let temp = tempfile::tempdir().unwrap();
    let tool = temp.path().join("fake-tool");
    std::fs::write(&tool, "#!/bin/sh\n").unwrap();

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(temp.path().join("not-executable"), "").unwrap();

    temp_env::with_var("PATH", Some(temp.path()), || {
      assert_eq!(find_command("fake-tool"), Some(tool.clone()));
      assert!(!has_command("not-executable"));
      assert!(!has_command("missing-tool"));
    });
  }

  #[test]
  #[serial]
  fn missing_path_finds_nothing() {
    temp_env::with_var("PATH", None::<&str>, || {
      assert!(find_command("sh").is_none());
    });
  }
}
