//! Dotted file format version numbers (`0.1`, `0.2`, `1`).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,
    #[error("Invalid version number: \"{0}\"")]
    Invalid(String),
}

/// A file format version.
///
/// Trailing zero components are insignificant, so `1.0` equals `1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u32>);

impl Version {
    pub fn new(numbers: &[u32]) -> Self {
        let mut numbers = numbers.to_vec();
        normalize(&mut numbers);
        Version(numbers)
    }

    pub fn numbers(&self) -> &[u32] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut numbers = text
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                    return Err(VersionError::Invalid(text.to_string()));
                }
                part.parse::<u32>()
                    .map_err(|_| VersionError::Invalid(text.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        normalize(&mut numbers);
        Ok(Version(numbers))
    }
}

fn normalize(numbers: &mut Vec<u32>) {
    while numbers.len() > 1 && numbers.last() == Some(&0) {
        numbers.pop();
    }
    if numbers.is_empty() {
        numbers.push(0);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl serde::Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
