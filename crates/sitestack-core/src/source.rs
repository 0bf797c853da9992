//! Source stage declaration.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::secret::SecretRef;
use crate::{Error, Result};

/// How the pipeline learns about new commits on the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTrigger {
    /// Repository webhook registered by the engine.
    #[default]
    Webhook,
    /// Periodic polling by the pipeline service.
    Poll,
    /// Runs only when started manually.
    None,
}

impl std::fmt::Display for SourceTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceTrigger::Webhook => write!(f, "webhook"),
            SourceTrigger::Poll => write!(f, "poll"),
            SourceTrigger::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for SourceTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "webhook" => Ok(SourceTrigger::Webhook),
            "poll" => Ok(SourceTrigger::Poll),
            "none" => Ok(SourceTrigger::None),
            other => Err(Error::InvalidInput(format!("unknown source trigger: {}", other))),
        }
    }
}

/// A GitHub repository branch feeding the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSource {
    /// Action name inside the source stage.
    pub action_name: String,
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to track.
    pub branch: String,
    /// OAuth token reference, resolved at apply time.
    pub credential: SecretRef,
    pub trigger: SourceTrigger,
    /// Artifact carrying the checked-out tree.
    pub output: Artifact,
}

impl GitHubSource {
    pub const DEFAULT_ACTION_NAME: &'static str = "GithubSource";

    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
        credential: SecretRef,
    ) -> Result<Self> {
        let owner = owner.into();
        let repo = repo.into();
        let branch = branch.into();

        for (field, value) in [("owner", &owner), ("repo", &repo), ("branch", &branch)] {
            if value.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "source {} must not be empty",
                    field
                )));
            }
        }

        Ok(Self {
            action_name: Self::DEFAULT_ACTION_NAME.to_string(),
            owner,
            repo,
            branch,
            credential,
            trigger: SourceTrigger::default(),
            output: Artifact::for_action("Source", Self::DEFAULT_ACTION_NAME)?,
        })
    }

    pub fn with_action_name(mut self, name: impl Into<String>) -> Result<Self> {
        self.action_name = name.into();
        self.output = Artifact::for_action("Source", &self.action_name)?;
        Ok(self)
    }

    pub fn with_trigger(mut self, trigger: SourceTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Git ref the webhook filter matches.
    pub fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.branch)
    }
}
