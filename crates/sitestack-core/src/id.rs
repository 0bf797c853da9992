//! Logical and state identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Identifier of a resource inside a synthesized template.
///
/// Templates only accept ASCII alphanumerics, so the check happens once at
/// construction and every later use can rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(try_from = "String", into = "String")]
#[display("{_0}")]
pub struct LogicalId(String);

impl LogicalId {
    pub const MAX_LEN: usize = 255;

    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let valid = !id.is_empty()
            && id.len() <= Self::MAX_LEN
            && id.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            Ok(Self(id))
        } else {
            Err(Error::InvalidLogicalId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive a child id, e.g. `ViteSitePipeline` + `Role`.
    pub fn child(&self, suffix: &str) -> Result<Self> {
        Self::new(format!("{}{}", self.0, suffix))
    }
}

impl TryFrom<String> for LogicalId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

impl std::str::FromStr for LogicalId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Identifies one continuous history of a stack's state.
/// Uses UUIDv7 so lineages sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Lineage(Uuid);

impl Lineage {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for Lineage {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies the holder of a state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct LockId(Uuid);

impl LockId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_alphanumeric() {
        let id = LogicalId::new("ViteSiteBucket").unwrap();
        assert_eq!(id.as_str(), "ViteSiteBucket");
        assert_eq!(id.to_string(), "ViteSiteBucket");
    }

    #[test]
    fn test_rejects_separators_and_empty() {
        assert!(LogicalId::new("vite-site").is_err());
        assert!(LogicalId::new("vite_site").is_err());
        assert!(LogicalId::new("").is_err());
        assert!(LogicalId::new("a".repeat(256)).is_err());
    }

    #[test]
    fn test_child_id() {
        let id = LogicalId::new("ViteSitePipeline").unwrap();
        assert_eq!(id.child("Role").unwrap().as_str(), "ViteSitePipelineRole");
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: LogicalId = serde_json::from_str("\"Bucket1\"").unwrap();
        assert_eq!(ok.as_str(), "Bucket1");
        assert!(serde_json::from_str::<LogicalId>("\"bad id\"").is_err());
    }
}
