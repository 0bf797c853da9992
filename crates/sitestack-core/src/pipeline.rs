//! Pipeline and stage definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::artifact::Artifact;
use crate::build::BuildProject;
use crate::source::GitHubSource;
use crate::storage::Bucket;
use crate::{Error, LogicalId, Result};

/// A release pipeline: stages run strictly in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Logical id of the pipeline resource.
    pub id: LogicalId,
    /// Pipeline name (e.g., "ViteSitePipeline").
    pub name: String,
    /// Whether a customer-managed key is created for cross-account actions.
    pub cross_account_keys: bool,
    /// Restart the pipeline when its definition is updated.
    pub restart_on_update: bool,
    /// Pipeline stages.
    pub stages: Vec<Stage>,
}

/// A stage in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name.
    pub name: String,
    /// Actions, one per stage in this stack.
    pub actions: Vec<Action>,
}

/// Coarse kind of an action, used to check stage layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Source,
    Build,
    Deploy,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Source => write!(f, "Source"),
            ActionKind::Build => write!(f, "Build"),
            ActionKind::Deploy => write!(f, "Deploy"),
        }
    }
}

/// What a stage does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Check out a repository branch.
    Source(GitHubSource),
    /// Run the build project.
    Build(BuildAction),
    /// Upload an artifact into a bucket.
    Deploy(DeployAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAction {
    pub name: String,
    /// Build project to run.
    pub project: LogicalId,
    pub input: Artifact,
    pub outputs: Vec<Artifact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployAction {
    pub name: String,
    pub input: Artifact,
    /// Target bucket.
    pub bucket: LogicalId,
    /// Unpack the artifact archive into the bucket instead of uploading the zip.
    pub extract: bool,
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::Source(s) => &s.action_name,
            Action::Build(b) => &b.name,
            Action::Deploy(d) => &d.name,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Source(_) => ActionKind::Source,
            Action::Build(_) => ActionKind::Build,
            Action::Deploy(_) => ActionKind::Deploy,
        }
    }

    pub fn inputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(_) => vec![],
            Action::Build(b) => vec![&b.input],
            Action::Deploy(d) => vec![&d.input],
        }
    }

    pub fn outputs(&self) -> Vec<&Artifact> {
        match self {
            Action::Source(s) => vec![&s.output],
            Action::Build(b) => b.outputs.iter().collect(),
            Action::Deploy(_) => vec![],
        }
    }
}

impl Pipeline {
    pub fn new(id: LogicalId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cross_account_keys: false,
            restart_on_update: false,
            stages: Vec::new(),
        }
    }

    pub fn with_cross_account_keys(mut self, enabled: bool) -> Self {
        self.cross_account_keys = enabled;
        self
    }

    /// The fixed Source → Build → Deploy layout: `source` checks out the
    /// repository, `build` runs on its output and the deploy action unpacks
    /// the build output into `bucket`.
    pub fn source_build_deploy(
        id: LogicalId,
        name: impl Into<String>,
        source: GitHubSource,
        build: &BuildProject,
        bucket: &Bucket,
    ) -> Result<Self> {
        let build_output = Artifact::for_action("Build", "Build")?;
        let build_action = BuildAction {
            name: "Build".to_string(),
            project: build.id.clone(),
            input: source.output.clone(),
            outputs: vec![build_output.clone()],
        };
        let deploy_action = DeployAction {
            name: "S3Deploy".to_string(),
            input: build_output,
            bucket: bucket.id.clone(),
            extract: true,
        };

        let mut pipeline = Self::new(id, name);
        pipeline
            .add_stage("Source", vec![Action::Source(source)])?
            .add_stage("Build", vec![Action::Build(build_action)])?
            .add_stage("Deploy", vec![Action::Deploy(deploy_action)])?;
        Ok(pipeline)
    }

    /// Append a stage. Stages execute in the order they are added.
    pub fn add_stage(&mut self, name: impl Into<String>, actions: Vec<Action>) -> Result<&mut Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("stage name must not be empty".to_string()));
        }
        if self.stages.iter().any(|s| s.name == name) {
            return Err(Error::DuplicateStage(name));
        }
        if actions.is_empty() {
            return Err(Error::InvalidInput(format!(
                "stage '{}' must contain at least one action",
                name
            )));
        }
        let mut seen = Vec::new();
        for action in &actions {
            if seen.contains(&action.name()) {
                return Err(Error::InvalidInput(format!(
                    "stage '{}' has duplicate action '{}'",
                    name,
                    action.name()
                )));
            }
            seen.push(action.name());
        }

        self.stages.push(Stage { name, actions });
        Ok(self)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn actions(&self) -> impl Iterator<Item = (&Stage, &Action)> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter().map(move |action| (stage, action)))
    }

    pub fn source(&self) -> Option<&GitHubSource> {
        self.actions().find_map(|(_, a)| match a {
            Action::Source(s) => Some(s),
            _ => None,
        })
    }

    pub fn build_actions(&self) -> impl Iterator<Item = &BuildAction> {
        self.actions().filter_map(|(_, a)| match a {
            Action::Build(b) => Some(b),
            _ => None,
        })
    }

    pub fn deploy_actions(&self) -> impl Iterator<Item = &DeployAction> {
        self.actions().filter_map(|(_, a)| match a {
            Action::Deploy(d) => Some(d),
            _ => None,
        })
    }

    /// Check the artifact hand-off between stages.
    ///
    /// - the first stage holds only source actions, and no later stage does
    /// - each artifact has exactly one producer
    /// - every input was produced by an earlier stage
    /// - every produced artifact is consumed by a later stage
    pub fn check_artifacts(&self) -> Result<()> {
        let mut producers: HashMap<&Artifact, usize> = HashMap::new();
        let mut consumed: Vec<&Artifact> = Vec::new();

        for (idx, stage) in self.stages.iter().enumerate() {
            for action in &stage.actions {
                let is_source = action.kind() == ActionKind::Source;
                if idx == 0 && !is_source {
                    return Err(Error::ArtifactContract(format!(
                        "first stage '{}' may only contain source actions, found '{}'",
                        stage.name,
                        action.name()
                    )));
                }
                if idx > 0 && is_source {
                    return Err(Error::ArtifactContract(format!(
                        "source action '{}' must be in the first stage",
                        action.name()
                    )));
                }

                for input in action.inputs() {
                    match producers.get(input) {
                        Some(&producer) if producer < idx => consumed.push(input),
                        _ => {
                            return Err(Error::ArtifactContract(format!(
                                "action '{}' consumes '{}' which no earlier stage produces",
                                action.name(),
                                input
                            )));
                        }
                    }
                }
            }

            // Outputs become visible only to later stages.
            for action in &stage.actions {
                for output in action.outputs() {
                    if producers.insert(output, idx).is_some() {
                        return Err(Error::ArtifactContract(format!(
                            "artifact '{}' is produced more than once",
                            output
                        )));
                    }
                }
            }
        }

        let mut unused: Vec<&str> = producers
            .keys()
            .filter(|a| !consumed.contains(a))
            .map(|a| a.name())
            .collect();
        if !unused.is_empty() {
            unused.sort_unstable();
            return Err(Error::ArtifactContract(format!(
                "artifact(s) never consumed: {}",
                unused.join(", ")
            )));
        }

        Ok(())
    }
}
