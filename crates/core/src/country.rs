//! Country code value object.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::value_object::ValueObject;

/// ISO 3166-1 alpha-2 country code, normalized to uppercase.
///
/// Countries scope reference-number sequences (one series per country and
/// month), so a malformed code would silently fork a numbering series.
/// Construction validates instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Country(String);

impl Country {
    pub fn new(code: &str) -> EngineResult<Self> {
        let code = code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(EngineError::validation(
                "country must be a two-letter ISO code",
            ));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Country {}

impl core::fmt::Display for Country {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Country {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
