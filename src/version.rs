//! Version comparison
//!
//! Two comparators live here on purpose and must not be merged:
//!
//! - [`versions_match`] decides package freshness. Package versions are opaque
//!   strings; only exact equality counts, so `"1.0"` and `"1.0.0"` differ and
//!   non-numeric versions such as `"beta-3"` keep working.
//! - [`DottedVersion`] orders platform versions numerically (`1.10.0` > `1.9.9`),
//!   which gates the platform update flow.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Exact, case-sensitive package version comparison.
pub fn versions_match(local: &str, remote: &str) -> bool {
    local == remote
}

/// A numeric dotted version such as `3.10.0.1234`.
///
/// Missing trailing components compare as zero, so `1.2` == `1.2.0.0`.
#[derive(Debug, Clone)]
pub struct DottedVersion {
    parts: Vec<u64>,
}

impl DottedVersion {
    fn component(&self, index: usize) -> u64 {
        self.parts.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for DottedVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_matches('"').trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        let parts = trimmed
            .split('.')
            .map(|part| part.trim().parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::InvalidVersion(s.to_string()))?;

        Ok(Self { parts })
    }
}

impl PartialEq for DottedVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DottedVersion {}

impl PartialOrd for DottedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DottedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl fmt::Display for DottedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.parts.iter().map(|p| p.to_string()).collect();
        f.write_str(&joined.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> DottedVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_versions_match_is_exact() {
        assert!(versions_match("1.0", "1.0"));
        assert!(!versions_match("1.0", "1.0.0"));
        assert!(!versions_match("Beta", "beta"));
        assert!(!versions_match("1.0 ", "1.0"));
    }

    #[test]
    fn test_dotted_numeric_ordering() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("3.10.0.1") > v("3.9.99.99"));
        assert!(v("2") > v("1.99"));
        assert!(v("1.2.3.4") < v("1.2.3.5"));
    }

    #[test]
    fn test_dotted_missing_components_are_zero() {
        assert_eq!(v("1.2"), v("1.2.0.0"));
        assert!(v("1.2") < v("1.2.0.1"));
    }

    #[test]
    fn test_dotted_accepts_json_quotes() {
        assert_eq!(v("\"3.9.8\""), v("3.9.8"));
        assert_eq!(v(" 4.0 ").to_string(), "4.0");
    }

    #[test]
    fn test_dotted_rejects_garbage() {
        assert!("".parse::<DottedVersion>().is_err());
        assert!("1.x.3".parse::<DottedVersion>().is_err());
        assert!("beta".parse::<DottedVersion>().is_err());
        assert!("1..2".parse::<DottedVersion>().is_err());
    }
}
