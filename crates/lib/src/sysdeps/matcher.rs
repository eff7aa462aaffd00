//! Matching one system dependency against the host.

use tracing::debug;

use super::query::{QueryError, SystemPackageQuery};
use super::types::{DependencyRef, SystemDependency};

/// Which candidate of a [`SystemDependency`] is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matched {
  Primary,
  /// Zero-based index into the alternatives.
  Alternative(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatisfactionResult {
  pub satisfied: bool,
  pub matched: Option<Matched>,
  pub matched_ref: Option<DependencyRef>,
  pub installed_version: Option<String>,
}

impl SatisfactionResult {
  fn unsatisfied() -> Self {
    Self {
      satisfied: false,
      matched: None,
      matched_ref: None,
      installed_version: None,
    }
  }
}

/// Evaluate the primary, then each alternative in order; the first present
/// candidate wins.
///
/// A failed lookup does not stop evaluation. If no candidate is present and
/// at least one lookup failed, the first failure is returned.
pub fn satisfies(
  dependency: &SystemDependency,
  oracle: &dyn SystemPackageQuery,
) -> Result<SatisfactionResult, QueryError> {
  let mut first_error = None;

  for (idx, candidate) in dependency.candidates().enumerate() {
    match oracle.lookup_version(candidate) {
      Ok(Some(version)) => {
        let matched = match idx {
          0 => Matched::Primary,
          n => Matched::Alternative(n - 1),
        };
        debug!(dependency = %dependency, matched = %candidate, version = %version, "dependency satisfied");
        return Ok(SatisfactionResult {
          satisfied: true,
          matched: Some(matched),
          matched_ref: Some(candidate.clone()),
          installed_version: Some(version),
        });
      }
      Ok(None) => {}
      Err(e) => {
        debug!(candidate = %candidate, error = %e, "lookup failed, trying next candidate");
        first_error.get_or_insert(e);
      }
    }
  }

  match first_error {
    Some(e) => Err(e),
    None => Ok(SatisfactionResult::unsatisfied()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sysdeps::query::StaticPackageQuery;

  fn dep() -> SystemDependency {
    SystemDependency::new(DependencyRef::path("/usr/lib/libfoo.so"))
      .with_alternative(DependencyRef::path("/usr/lib64/libfoo.so"))
      .with_alternative(DependencyRef::pkgconfig("foo"))
  }

  #[test]
  fn primary_wins_when_present() {
    let oracle = StaticPackageQuery::new()
      .with(DependencyRef::path("/usr/lib/libfoo.so"), "1.0")
      .with(DependencyRef::pkgconfig("foo"), "1.1");
    let result = satisfies(&dep(), &oracle).unwrap();
    assert_eq!(result.matched, Some(Matched::Primary));
    assert_eq!(result.installed_version.as_deref(), Some("1.0"));
  }

  #[test]
  fn second_alternative_is_index_one() {
    let oracle = StaticPackageQuery::new().with(DependencyRef::pkgconfig("foo"), "1.1");
    let result = satisfies(&dep(), &oracle).unwrap();
    assert!(result.satisfied);
    assert_eq!(result.matched, Some(Matched::Alternative(1)));
    assert_eq!(result.matched_ref, Some(DependencyRef::pkgconfig("foo")));
  }

  #[test]
  fn nothing_present_is_unsatisfied() {
    let result = satisfies(&dep(), &StaticPackageQuery::new()).unwrap();
    assert!(!result.satisfied);
    assert!(result.matched.is_none());
    assert!(result.installed_version.is_none());
  }

  #[test]
  fn failed_lookup_does_not_hide_later_match() {
    let oracle = StaticPackageQuery::new()
      .failing(DependencyRef::path("/usr/lib/libfoo.so"))
      .with(DependencyRef::path("/usr/lib64/libfoo.so"), "unknown");
    let result = satisfies(&dep(), &oracle).unwrap();
    assert_eq!(result.matched, Some(Matched::Alternative(0)));
  }

  #[test]
  fn failed_lookup_without_match_is_an_error() {
    let oracle = StaticPackageQuery::new().failing(DependencyRef::pkgconfig("foo"));
    assert!(matches!(
      satisfies(&dep(), &oracle),
      Err(QueryError::OracleUnavailable(_))
    ));
  }
}
