//! System package installers.
//!
//! An [`Installer`] turns install requests into distribution packages and
//! runs the package manager. Package resolution and command construction are
//! pure; only [`Installer::install`] touches the host.

use std::process::Command;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform;

use super::types::{DependencyKind, DependencyRef, InstallRequest};

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("don't know how to install packages on this system{}", hint_suffix(.hint))]
  NoInstallerAvailable { hint: Option<String> },

  #[error("could not resolve {dependency}: {reason}")]
  Resolve { dependency: String, reason: String },

  #[error("installer command failed with exit code {code:?}: {command}")]
  CommandFailed { command: String, code: Option<i32> },

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
  hint.as_ref().map(|h| format!(": {}", h)).unwrap_or_default()
}

pub trait Installer: Send + Sync {
  fn name(&self) -> &str;

  fn install(&self, requests: &[InstallRequest]) -> Result<(), InstallError>;
}

/// The best installer for this host, if any is supported.
pub fn find_best() -> Option<Box<dyn Installer>> {
  if platform::has_command("dnf") {
    debug!("using dnf installer");
    return Some(Box::new(DnfInstaller));
  }
  if platform::has_command("apt-get") && platform::has_command("apt-file") {
    debug!("using apt installer");
    return Some(Box::new(AptInstaller));
  }
  None
}

/// Extra advice when [`find_best`] finds nothing.
pub fn missing_installer_hint() -> Option<String> {
  (platform::has_command("apt-get") && !platform::has_command("apt-file"))
    .then(|| "apt-file is required to install packages on this system, please install apt-file".to_string())
}

/// Prefix with `sudo` unless already running as root.
fn elevate(mut command: Vec<String>, elevated: bool) -> Vec<String> {
  if !elevated {
    command.insert(0, "sudo".to_string());
  }
  command
}

fn run(command: &[String]) -> Result<(), InstallError> {
  let Some((program, args)) = command.split_first() else {
    return Ok(());
  };
  info!(cmd = %command.join(" "), "running package manager");
  let status = Command::new(program).args(args).status()?;
  if status.success() {
    Ok(())
  } else {
    Err(InstallError::CommandFailed {
      command: command.join(" "),
      code: status.code(),
    })
  }
}

fn dedup_in_order(packages: Vec<String>) -> Vec<String> {
  let mut seen = std::collections::HashSet::new();
  packages.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Debian and derivatives: resolves files through `apt-file`, installs with
/// `apt-get`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AptInstaller;

impl AptInstaller {
  /// `apt-file` regular expression locating the file that provides
  /// `dependency`. `None` for plain packages and unsearchable kinds.
  pub fn search_pattern(dependency: &DependencyRef) -> Option<String> {
    let id = regex::escape(&dependency.identifier);
    match &dependency.kind {
      DependencyKind::Pkgconfig => Some(format!("/{}\\.pc$", id)),
      DependencyKind::Path if dependency.identifier.starts_with('/') => Some(format!("^{}$", id)),
      DependencyKind::Path => Some(format!("/s?bin/{}$", id)),
      DependencyKind::CInclude => Some(format!("^/usr/include/(.*/)?{}$", id)),
      DependencyKind::Python => {
        let module = regex::escape(&dependency.identifier.replace('.', "/"));
        Some(format!("/(dist|site)-packages/{}(/__init__)?\\.py$", module))
      }
      DependencyKind::Package | DependencyKind::Xml | DependencyKind::Other(_) => None,
    }
  }

  fn resolve(&self, request: &InstallRequest) -> Result<Option<String>, InstallError> {
    let dependency = request.dependency();
    if dependency.kind == DependencyKind::Package {
      return Ok(Some(dependency.identifier));
    }
    let Some(pattern) = Self::search_pattern(&dependency) else {
      warn!(dependency = %dependency, "apt cannot resolve this kind of dependency, skipping");
      return Ok(None);
    };

    let output = Command::new("apt-file")
      .args(["search", "--regexp", &pattern])
      .output()?;
    if !output.status.success() && !output.stderr.is_empty() {
      return Err(InstallError::Resolve {
        dependency: dependency.to_string(),
        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let package = parse_apt_file_output(&String::from_utf8_lossy(&output.stdout));
    if package.is_none() {
      warn!(dependency = %dependency, "no package provides this dependency");
    }
    Ok(package)
  }

  pub fn install_command(packages: &[String], elevated: bool) -> Vec<String> {
    let mut command = vec!["apt-get".to_string(), "install".to_string(), "-y".to_string()];
    command.extend(packages.iter().cloned());
    elevate(command, elevated)
  }
}

impl Installer for AptInstaller {
  fn name(&self) -> &str {
    "apt"
  }

  fn install(&self, requests: &[InstallRequest]) -> Result<(), InstallError> {
    let mut packages = Vec::new();
    for request in requests {
      if let Some(package) = self.resolve(request)? {
        packages.push(package);
      }
    }
    let packages = dedup_in_order(packages);
    if packages.is_empty() {
      warn!("none of the requested dependencies resolved to a package");
      return Ok(());
    }
    run(&Self::install_command(&packages, platform::is_elevated()))
  }
}

/// First package of `apt-file search` output (`package: /path` per line).
pub fn parse_apt_file_output(output: &str) -> Option<String> {
  output
    .lines()
    .filter_map(|line| line.split_once(": "))
    .map(|(package, _)| package.trim())
    .find(|package| !package.is_empty())
    .map(str::to_string)
}

/// Fedora and derivatives: `dnf` resolves capabilities natively.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnfInstaller;

impl DnfInstaller {
  /// The dnf capability providing `dependency`.
  pub fn capability(dependency: &DependencyRef) -> Option<String> {
    let id = &dependency.identifier;
    match &dependency.kind {
      DependencyKind::Pkgconfig => Some(format!("pkgconfig({})", id)),
      DependencyKind::Path if id.starts_with('/') => Some(id.clone()),
      DependencyKind::Path => Some(format!("/usr/bin/{}", id)),
      DependencyKind::CInclude => Some(format!("/usr/include/{}", id)),
      DependencyKind::Python => Some(format!("python3dist({})", id.to_lowercase())),
      DependencyKind::Package => Some(id.clone()),
      DependencyKind::Xml | DependencyKind::Other(_) => None,
    }
  }

  pub fn install_command(capabilities: &[String], elevated: bool) -> Vec<String> {
    let mut command = vec!["dnf".to_string(), "install".to_string(), "-y".to_string()];
    command.extend(capabilities.iter().cloned());
    elevate(command, elevated)
  }
}

impl Installer for DnfInstaller {
  fn name(&self) -> &str {
    "dnf"
  }

  fn install(&self, requests: &[InstallRequest]) -> Result<(), InstallError> {
    let capabilities: Vec<String> = requests
      .iter()
      .filter_map(|request| {
        let dependency = request.dependency();
        let capability = Self::capability(&dependency);
        if capability.is_none() {
          warn!(dependency = %dependency, "dnf cannot resolve this kind of dependency, skipping");
        }
        capability
      })
      .collect();

    let capabilities = dedup_in_order(capabilities);
    if capabilities.is_empty() {
      warn!("none of the requested dependencies resolved to a package");
      return Ok(());
    }
    run(&Self::install_command(&capabilities, platform::is_elevated()))
  }
}
