//! Pipeline artifacts.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Opaque, named handle to a bundle of files passed between stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct Artifact(String);

impl Artifact {
    /// Artifact names are limited to letters, digits, `_` and `-`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 100
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(Self(name))
        } else {
            Err(Error::InvalidInput(format!("invalid artifact name '{}'", name)))
        }
    }

    /// Name an artifact after the action producing it: `Artifact_<Stage>_<Action>`.
    pub fn for_action(stage: &str, action: &str) -> Result<Self> {
        let clean = |s: &str| -> String {
            s.chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .collect()
        };
        Self::new(format!("Artifact_{}_{}", clean(stage), clean(action)))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_action_naming() {
        let artifact = Artifact::for_action("Source", "GithubSource").unwrap();
        assert_eq!(artifact.name(), "Artifact_Source_GithubSource");
    }

    #[test]
    fn test_for_action_strips_spaces() {
        let artifact = Artifact::for_action("Build Stage", "Build").unwrap();
        assert_eq!(artifact.name(), "Artifact_BuildStage_Build");
    }

    #[test]
    fn test_rejects_invalid_names() {
        assert!(Artifact::new("").is_err());
        assert!(Artifact::new("has space").is_err());
    }
}
