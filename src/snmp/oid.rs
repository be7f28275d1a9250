//! Object identifier type.
//!
//! OIDs are kept in memory as their integer component sequence; the
//! derived `Ord` on the inner `Vec<u32>` is exactly the numeric
//! lexicographic order SNMP requires (`1.3.6.1.2.1` sorts before
//! `1.3.6.1.2.1.1.1.0`, and `1.3.6.1.2.11` after both).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An SNMP object identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Oid(Vec<u32>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OidParseError {
    #[error("empty OID")]
    Empty,
    #[error("invalid OID component: {0}")]
    InvalidComponent(String),
}

impl Oid {
    pub fn new(components: Vec<u32>) -> Self {
        Oid(components)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component-wise prefix test. `1.3.6.1.2.11` is *not* under
    /// `1.3.6.1.2.1`.
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// The OID with the last component removed, or `None` at the root.
    pub fn parent(&self) -> Option<Oid> {
        if self.0.len() < 2 {
            return None;
        }
        Some(Oid(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn child(&self, component: u32) -> Oid {
        let mut components = self.0.clone();
        components.push(component);
        Oid(components)
    }

    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }
}

impl From<&[u32]> for Oid {
    fn from(components: &[u32]) -> Self {
        Oid(components.to_vec())
    }
}

impl<const N: usize> From<[u32; N]> for Oid {
    fn from(components: [u32; N]) -> Self {
        Oid(components.to_vec())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for c in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{}", c)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for Oid {
    type Err = OidParseError;

    /// Parses dotted notation, tolerating a leading dot as emitted by
    /// net-snmp tools (`.1.3.6.1.2.1.1.1.0`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(OidParseError::Empty);
        }
        let components = trimmed
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| OidParseError::InvalidComponent(part.to_string()))
            })
            .collect::<Result<Vec<u32>, _>>()?;
        Ok(Oid(components))
    }
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
