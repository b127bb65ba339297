//! Specimen identifiers
//!
//! Every specimen envelope carries a UUID in its barcode. Anything that does
//! not parse as a hyphenated UUID is "no identifier", never a value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// A validated specimen identifier.
///
/// Input is case-insensitive; output is always the lowercase hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(Uuid);

impl Identifier {
    /// Length of the canonical textual form
    pub const LEN: usize = 36;

    /// Parse the canonical `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` form.
    ///
    /// The uuid crate also accepts simple, braced and URN spellings; those
    /// are rejected here by the length check.
    pub fn parse(text: &str) -> Option<Self> {
        if text.len() != Self::LEN {
            return None;
        }
        Uuid::try_parse(text).ok().map(Identifier)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

/// True for any valid identifier regardless of letter case; false for
/// `None`, the empty string and anything off the UUID grammar.
pub fn is_valid_identifier(value: Option<&str>) -> bool {
    value.and_then(Identifier::parse).is_some()
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Identifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identifier::parse(s)
            .ok_or_else(|| Error::InvalidInput(format!("not an identifier: {:?}", s)))
    }
}

impl TryFrom<String> for Identifier {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.to_string()
    }
}
