//! Protocol and capability versions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    /// Parses `major[.minor[.patch]]`; missing parts are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in s.split('.') {
            if count == parts.len() {
                return Err(VersionParseError::TooManyParts(s.to_string()));
            }
            parts[count] = part
                .parse()
                .map_err(|_| VersionParseError::InvalidPart(s.to_string()))?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

impl TryFrom<String> for Version {
    type Error = VersionParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.to_string()
    }
}

/// Error parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("version part is not a number in {0:?}")]
    InvalidPart(String),
    #[error("version has more than three parts: {0:?}")]
    TooManyParts(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_and_short() {
        assert_eq!("1.2.3".parse::<Version>().unwrap(), Version::new(1, 2, 3));
        assert_eq!("4".parse::<Version>().unwrap(), Version::new(4, 0, 0));
        assert_eq!("4.1".parse::<Version>().unwrap(), Version::new(4, 1, 0));
    }

    #[test]
    fn reject_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("1.x".parse::<Version>().is_err());
        assert!(matches!(
            "1.2.3.4".parse::<Version>(),
            Err(VersionParseError::TooManyParts(_))
        ));
    }

    #[test]
    fn ordering() {
        assert!(Version::new(1, 0, 0) < Version::new(1, 0, 1));
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
    }

    #[test]
    fn display_roundtrip() {
        let v = Version::new(2, 10, 0);
        assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
    }
}
