use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementNameError {
    #[error("Element name must not be empty")]
    Empty,
    #[error("Element name \"{0}\" has leading or trailing whitespace")]
    Untrimmed(String),
    #[error("Element name must not contain line breaks")]
    LineBreak,
}

/// Name of a library element or project item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementName(String);

impl ElementName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ElementName {
    type Err = ElementNameError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        if text.is_empty() {
            Err(ElementNameError::Empty)
        } else if text.contains(['\n', '\r']) {
            Err(ElementNameError::LineBreak)
        } else if text.trim() != text {
            Err(ElementNameError::Untrimmed(text.to_string()))
        } else {
            Ok(ElementName(text.to_string()))
        }
    }
}

impl fmt::Display for ElementName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
