//! Package version ordering.
//!
//! Versions use the Debian layout `[epoch:]upstream[-revision]`. Upstream and
//! revision strings are compared by alternating runs of non-digits and digits:
//! letters sort before non-letters, `~` sorts before everything (including the
//! end of the string), and digit runs compare numerically.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
  #[error("version string is empty")]
  Empty,

  #[error("invalid epoch in version '{0}'")]
  InvalidEpoch(String),

  #[error("missing upstream version in '{0}'")]
  MissingUpstream(String),

  #[error("invalid character '{ch}' in version '{version}'")]
  InvalidCharacter { version: String, ch: char },
}

/// A parsed package version.
#[derive(Debug, Clone)]
pub struct PackageVersion {
  epoch: u64,
  upstream: String,
  revision: String,
}

impl PackageVersion {
  pub fn parse(version: &str) -> Result<Self, VersionError> {
    let version = version.trim();
    if version.is_empty() {
      return Err(VersionError::Empty);
    }

    if let Some(ch) = version
      .chars()
      .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '~' | ':' | '_')))
    {
      return Err(VersionError::InvalidCharacter {
        version: version.to_string(),
        ch,
      });
    }

    let (epoch, rest) = match version.split_once(':') {
      Some((epoch, rest)) => {
        let epoch = epoch
          .parse::<u64>()
          .map_err(|_| VersionError::InvalidEpoch(version.to_string()))?;
        (epoch, rest)
      }
      None => (0, version),
    };

    let (upstream, revision) = match rest.rsplit_once('-') {
      Some((upstream, revision)) => (upstream, revision),
      None => (rest, ""),
    };

    if upstream.is_empty() {
      return Err(VersionError::MissingUpstream(version.to_string()));
    }

    Ok(Self {
      epoch,
      upstream: upstream.to_string(),
      revision: revision.to_string(),
    })
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn upstream(&self) -> &str {
    &self.upstream
  }

  pub fn revision(&self) -> &str {
    &self.revision
  }
}

impl FromStr for PackageVersion {
  type Err = VersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl Ord for PackageVersion {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .epoch
      .cmp(&other.epoch)
      .then_with(|| verrevcmp(&self.upstream, &other.upstream))
      .then_with(|| verrevcmp(&self.revision, &other.revision))
  }
}

impl PartialOrd for PackageVersion {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl PartialEq for PackageVersion {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for PackageVersion {}

impl fmt::Display for PackageVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.epoch != 0 {
      write!(f, "{}:", self.epoch)?;
    }
    write!(f, "{}", self.upstream)?;
    if !self.revision.is_empty() {
      write!(f, "-{}", self.revision)?;
    }
    Ok(())
  }
}

/// Weight of a single non-digit character.
fn order(c: Option<u8>) -> i32 {
  match c {
    None => 0,
    Some(b'~') => -1,
    Some(c) if c.is_ascii_digit() => 0,
    Some(c) if c.is_ascii_alphabetic() => c as i32,
    Some(c) => c as i32 + 256,
  }
}

fn is_digit(s: &[u8], i: usize) -> bool {
  s.get(i).is_some_and(u8::is_ascii_digit)
}

fn verrevcmp(a: &str, b: &str) -> Ordering {
  let (a, b) = (a.as_bytes(), b.as_bytes());
  let (mut i, mut j) = (0, 0);

  while i < a.len() || j < b.len() {
    while (i < a.len() && !is_digit(a, i)) || (j < b.len() && !is_digit(b, j)) {
      let (ac, bc) = (order(a.get(i).copied()), order(b.get(j).copied()));
      if ac != bc {
        return ac.cmp(&bc);
      }
      i += 1;
      j += 1;
    }

    while a.get(i) == Some(&b'0') {
      i += 1;
    }
    while b.get(j) == Some(&b'0') {
      j += 1;
    }

    let mut first_diff = Ordering::Equal;
    while is_digit(a, i) && is_digit(b, j) {
      if first_diff == Ordering::Equal {
        first_diff = a[i].cmp(&b[j]);
      }
      i += 1;
      j += 1;
    }

    if is_digit(a, i) {
      return Ordering::Greater;
    }
    if is_digit(b, j) {
      return Ordering::Less;
    }
    if first_diff != Ordering::Equal {
      return first_diff;
    }
  }

  Ordering::Equal
}

/// Compares installed and required versions of a system dependency.
pub trait VersionComparator: Send + Sync {
  /// Returns `None` when the two versions cannot be ordered.
  fn compare(&self, installed: &str, required: &str) -> Option<Ordering>;

  /// True iff `installed >= required`. Unordered versions are never new enough.
  fn is_new_enough(&self, installed: &str, required: &str) -> bool {
    matches!(
      self.compare(installed, required),
      Some(Ordering::Greater | Ordering::Equal)
    )
  }
}

/// Orders versions the way dpkg does.
#[derive(Debug, Clone, Copy, Default)]
pub struct DpkgComparator;

impl VersionComparator for DpkgComparator {
  fn compare(&self, installed: &str, required: &str) -> Option<Ordering> {
    let installed = PackageVersion::parse(installed).ok()?;
    let required = PackageVersion::parse(required).ok()?;
    Some(installed.cmp(&required))
  }
}
