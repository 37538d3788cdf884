//! Random (version 4) UUIDs used as the only stable cross-file reference key.
//!
//! A valid UUID looks like `d79d354b-62bd-4866-996a-78941c575e78`: 36 characters,
//! lowercase hex digits grouped 8-4-4-4-12, version nibble `4` and an RFC 4122 variant
//! nibble. Strings which don't match exactly are rejected; they are never normalized.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const UUID_LENGTH: usize = 36;
const DASH_POSITIONS: [usize; 4] = [8, 13, 18, 23];
const VERSION_POSITION: usize = 14;
const VARIANT_POSITION: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UuidError {
    #[error("Invalid UUID length: expected 36 characters, got {0}")]
    WrongLength(usize),
    #[error("Expected '-' at position {0}")]
    MisplacedDash(usize),
    #[error("Invalid character '{ch}' at position {index}")]
    InvalidCharacter { ch: char, index: usize },
    #[error("Uppercase character '{ch}' at position {index}, UUIDs must be lowercase")]
    Uppercase { ch: char, index: usize },
    #[error("Unsupported UUID version '{0}', only random (version 4) UUIDs are valid")]
    WrongVersion(char),
    #[error("Unsupported UUID variant '{0}'")]
    WrongVariant(char),
}

/// A validated, immutable random UUID.
///
/// Ordering compares the 128-bit value byte by byte, which is the same as comparing the
/// canonical lowercase strings.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid(::uuid::Uuid);

impl Uuid {
    /// Create a new random UUID.
    pub fn create_random() -> Self {
        Uuid(::uuid::Uuid::new_v4())
    }

    /// Check whether `text` is a valid UUID string.
    pub fn is_valid(text: &str) -> bool {
        validate(text).is_ok()
    }

    /// Parse a UUID, returning `None` if `text` is not a valid UUID.
    pub fn try_from_str(text: &str) -> Option<Self> {
        text.parse().ok()
    }

    /// Canonical string form.
    pub fn to_str(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

fn validate(text: &str) -> Result<(), UuidError> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() != UUID_LENGTH {
        return Err(UuidError::WrongLength(chars.len()));
    }
    for (index, &ch) in chars.iter().enumerate() {
        if DASH_POSITIONS.contains(&index) {
            if ch != '-' {
                return Err(UuidError::MisplacedDash(index));
            }
        } else if ch.is_ascii_uppercase() && ch.is_ascii_hexdigit() {
            return Err(UuidError::Uppercase { ch, index });
        } else if !matches!(ch, '0'..='9' | 'a'..='f') {
            return Err(UuidError::InvalidCharacter { ch, index });
        }
    }
    if chars[VERSION_POSITION] != '4' {
        return Err(UuidError::WrongVersion(chars[VERSION_POSITION]));
    }
    if !matches!(chars[VARIANT_POSITION], '8' | '9' | 'a' | 'b') {
        return Err(UuidError::WrongVariant(chars[VARIANT_POSITION]));
    }
    Ok(())
}

impl FromStr for Uuid {
    type Err = UuidError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        validate(text)?;
        ::uuid::Uuid::parse_str(text)
            .map(Uuid)
            .map_err(|_| UuidError::WrongLength(text.len()))
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uuid({})", self.0.hyphenated())
    }
}

impl serde::Serialize for Uuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_str())
    }
}
