//! CLI smoke tests for mbuild.
//!
//! Each test gets its own config, module set, prefix and state directory in a
//! temporary directory, so nothing touches the user's environment.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serial_test::serial;
use tempfile::TempDir;

/// Module set whose system requirements resolve on any unix host.
const SYSTEM_SET: &str = r#"
[[module]]
name = "shell"
type = "system"
sysdeps = ["path:/bin/sh"]

[[module]]
name = "headers"
type = "system"
runtime = false
sysdeps = ["c_include:mbuild-does-not-exist.h"]

[[module]]
name = "app"
type = "pip"
dependencies = ["shell"]
sysdeps = ["path:/nonexistent/mbuild-tool,path:/nonexistent/mbuild-tool2"]
"#;

const BUILD_SET: &str = r#"
[[module]]
name = "lib"
type = "pip"
revision = "1"
[module.commands]
install = "touch $MBUILD_PREFIX/lib-installed"

[[module]]
name = "app"
type = "pip"
dependencies = ["lib"]
[module.commands]
checkout = "true"
install = "test -f $MBUILD_PREFIX/lib-installed"
"#;

struct TestEnv {
  temp: TempDir,
}

impl TestEnv {
  fn new(moduleset: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    std::fs::create_dir_all(root.join("prefix")).unwrap();
    std::fs::write(root.join("modules.toml"), moduleset).unwrap();
    std::fs::write(
      root.join("config.toml"),
      format!(
        "moduleset = \"modules.toml\"\nprefix = \"{}\"\ncheckoutroot = \"{}\"\nstate_dir = \"{}\"\nparallelism = 2\n",
        root.join("prefix").display(),
        root.join("src").display(),
        root.join("state").display(),
      ),
    )
    .unwrap();
    Self { temp }
  }

  fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  fn prefix(&self) -> PathBuf {
    self.root().join("prefix")
  }

  fn cmd(&self) -> Command {
    let mut cmd = cargo_bin_cmd!("mbuild");
    cmd
      .arg("--config")
      .arg(self.root().join("config.toml"))
      .env_remove("MBUILD_PREFIX")
      .env_remove("MBUILD_STATE_DIR")
      .env_remove("MBUILD_BUILDROOT")
      .env_remove("RUST_LOG");
    cmd
  }
}

// =============================================================================
// Help & Version
// =============================================================================

#[test]
fn help_flag_works() {
  cargo_bin_cmd!("mbuild")
    .arg("--help")
    .assert()
    .success()
    .stdout(predicate::str::contains("Usage"))
    .stdout(predicate::str::contains("sysdeps"));
}

#[test]
fn version_flag_works() {
  cargo_bin_cmd!("mbuild")
    .arg("--version")
    .assert()
    .success()
    .stdout(predicate::str::contains("mbuild"));
}

#[test]
fn missing_moduleset_is_an_error() {
  let temp = TempDir::new().unwrap();
  let config = temp.path().join("config.toml");
  std::fs::write(&config, "prefix = \"/tmp/mbuild-prefix\"\n").unwrap();

  cargo_bin_cmd!("mbuild")
    .arg("--config")
    .arg(&config)
    .args(["sysdeps", "--dump-all"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("No module set configured"));
}

// =============================================================================
// Sysdeps
// =============================================================================

#[test]
fn dump_all_lists_every_requirement() {
  let env = TestEnv::new(SYSTEM_SET);
  env
    .cmd()
    .args(["sysdeps", "--dump-all"])
    .assert()
    .success()
    .stdout(predicate::str::contains("path:/bin/sh"))
    .stdout(predicate::str::contains("c_include:mbuild-does-not-exist.h"))
    .stdout(predicate::str::contains("app").not());
}

#[test]
fn dump_runtime_skips_build_only_modules() {
  let env = TestEnv::new(SYSTEM_SET);
  env
    .cmd()
    .args(["sysdeps", "--dump-runtime"])
    .assert()
    .success()
    .stdout(predicate::str::contains("path:/bin/sh"))
    .stdout(predicate::str::contains("c_include").not());
}

#[test]
#[cfg(unix)]
fn dump_lists_only_unmet_requirements() {
  let env = TestEnv::new(SYSTEM_SET);
  env
    .cmd()
    .args(["sysdeps", "--dump"])
    .assert()
    .success()
    .stdout(predicate::str::contains("c_include:mbuild-does-not-exist.h"))
    .stdout(predicate::str::contains("path:/nonexistent/mbuild-tool,path:/nonexistent/mbuild-tool2"))
    .stdout(predicate::str::contains("path:/bin/sh").not());
}

#[test]
#[cfg(unix)]
fn report_fails_when_required_module_is_missing() {
  let env = TestEnv::new(SYSTEM_SET);
  env
    .cmd()
    .arg("sysdeps")
    .assert()
    .failure()
    .stdout(predicate::str::contains("headers"))
    .stdout(predicate::str::contains("new enough"));
}

#[test]
#[cfg(unix)]
fn report_succeeds_when_system_provides_everything() {
  let env = TestEnv::new("[[module]]\nname = \"shell\"\ntype = \"system\"\nsysdeps = [\"path:/bin/sh\"]\n");
  env
    .cmd()
    .args(["sysdeps", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"new-enough\""));
}

#[test]
fn dump_modes_are_exclusive() {
  let env = TestEnv::new(SYSTEM_SET);
  env
    .cmd()
    .args(["sysdeps", "--dump", "--install"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot be used with"));
}

// =============================================================================
// Build, Status & Reset
// =============================================================================

#[test]
#[serial]
#[cfg(unix)]
fn build_records_progress_and_reset_clears_it() {
  let env = TestEnv::new(BUILD_SET);

  env
    .cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built 2 module(s)"));
  assert!(env.prefix().join("lib-installed").exists());

  env
    .cmd()
    .args(["status", "-o", "json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"module\": \"app\""))
    .stdout(predicate::str::contains("\"last_completed_phase\": \"install\""));

  env
    .cmd()
    .args(["reset", "app", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Reset 1 module(s): app"));

  env
    .cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("lib"))
    .stdout(predicate::str::contains("app").not());
}

#[test]
#[serial]
#[cfg(unix)]
fn failed_build_exits_non_zero() {
  let env = TestEnv::new(
    "[[module]]\nname = \"broken\"\ntype = \"pip\"\n[module.commands]\ncheckout = \"exit 7\"\n",
  );

  env
    .cmd()
    .arg("build")
    .assert()
    .failure()
    .stdout(predicate::str::contains("broken"))
    .stderr(predicate::str::contains("1 of 1 module(s) failed"));
}

#[test]
fn unknown_module_is_rejected() {
  let env = TestEnv::new(BUILD_SET);
  env
    .cmd()
    .args(["build", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not in the module set"));
}
