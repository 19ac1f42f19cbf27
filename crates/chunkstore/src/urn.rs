use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const PART_SUFFIX: &str = "_part";
const HEADER_SUFFIX: &str = "_header";

/// Errors produced when parsing a [`Urn`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrnError {
    #[error("urn must not be empty")]
    Empty,

    #[error("urn must not contain control characters, '/' or '\\': {0:?}")]
    InvalidCharacter(String),
}

/// Unique name of one logical object.
///
/// A urn is opaque to the store; it only derives blob names from it:
/// `<urn>_part<N>` for part `N` (1-based) and `<urn>_header` for the
/// manifest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Urn(String);

impl Urn {
    /// Parse a urn.
    pub fn new(value: impl Into<String>) -> Result<Self, UrnError> {
        let value = value.into();
        if value.is_empty() {
            return Err(UrnError::Empty);
        }
        if value.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
            return Err(UrnError::InvalidCharacter(value));
        }
        Ok(Self(value))
    }

    /// A fresh, time-ordered urn of the form `urn:oid:<uuid>`.
    pub fn generate() -> Self {
        Self(format!("urn:oid:{}", uuid::Uuid::now_v7()))
    }

    /// The urn as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blob name of part `number` (1-based).
    pub fn part_name(&self, number: u64) -> String {
        format!("{}{PART_SUFFIX}{number}", self.0)
    }

    /// Blob name of the manifest.
    pub fn header_name(&self) -> String {
        format!("{}{HEADER_SUFFIX}", self.0)
    }

    /// Part number encoded in `blob`, if `blob` is a part of this urn.
    pub fn part_number(&self, blob: &str) -> Option<u64> {
        let digits = blob.strip_prefix(self.0.as_str())?.strip_prefix(PART_SUFFIX)?;
        if digits.is_empty()
            || digits.starts_with('0')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        digits.parse().ok()
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Urn {
    type Err = UrnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Urn {
    type Error = UrnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Urn> for String {
    fn from(urn: Urn) -> Self {
        urn.0
    }
}

impl AsRef<str> for Urn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
