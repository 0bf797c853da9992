//! Stack composition, state and plan types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::build::BuildProject;
use crate::distribution::Distribution;
use crate::id::Lineage;
use crate::pipeline::Pipeline;
use crate::storage::Bucket;
use crate::synth;
use crate::{Error, LogicalId, Result};

/// Target account and region. Unset values are left to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEnv {
    pub account: Option<String>,
    pub region: Option<String>,
}

/// The static-site hosting stack: one unit applied and torn down together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStack {
    pub name: String,
    pub description: Option<String>,
    pub env: StackEnv,
    pub build: BuildProject,
    pub bucket: Bucket,
    pub distribution: Option<Distribution>,
    pub pipeline: Pipeline,
}

impl SiteStack {
    pub fn new(
        name: impl Into<String>,
        build: BuildProject,
        bucket: Bucket,
        distribution: Option<Distribution>,
        pipeline: Pipeline,
    ) -> Result<Self> {
        let name = name.into();
        let valid = !name.is_empty()
            && name.len() <= 128
            && name.starts_with(|c: char| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::InvalidInput(format!(
                "stack name '{}' must start with a letter and contain only letters, digits and '-'",
                name
            )));
        }

        let stack = Self {
            name,
            description: None,
            env: StackEnv::default(),
            build,
            bucket,
            distribution,
            pipeline,
        };
        stack.check_unique_ids()?;
        Ok(stack)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_env(mut self, env: StackEnv) -> Self {
        self.env = env;
        self
    }

    /// Logical ids of the declared resources, in declaration order.
    pub fn declared_ids(&self) -> Vec<&LogicalId> {
        let mut ids = vec![&self.build.id, &self.bucket.id];
        if let Some(dist) = &self.distribution {
            if let Some(oai) = &dist.origin.identity {
                ids.push(&oai.id);
            }
            ids.push(&dist.id);
        }
        ids.push(&self.pipeline.id);
        ids
    }

    fn check_unique_ids(&self) -> Result<()> {
        let ids = self.declared_ids();
        for (i, id) in ids.iter().enumerate() {
            if ids[..i].contains(id) {
                return Err(Error::InvalidInput(format!(
                    "logical id '{}' is declared more than once",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Leaves-first order in which the engine creates the stack's resources.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        synth::synthesize(self)?.dependency_order()
    }
}

/// State of an applied stack, as recorded by a provisioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackState {
    pub stack_name: String,
    pub lineage: Lineage,
    /// Incremented on every apply that changed something.
    pub serial: u64,
    /// Digest of the last applied template.
    pub template_digest: String,
    /// The last applied template, diffed against on the next plan.
    pub template: serde_json::Value,
    pub resources: BTreeMap<String, ResourceState>,
    pub updated_at: DateTime<Utc>,
}

/// One applied resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub physical_id: String,
    pub properties: serde_json::Value,
    pub deletion_policy: Option<String>,
}

impl ResourceState {
    pub fn is_retained(&self) -> bool {
        self.deletion_policy.as_deref() == Some("Retain")
    }
}

/// What happens to a resource in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Replace,
    Delete,
    /// Removed from the stack but left in the account.
    Orphan,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Replace => write!(f, "replace"),
            ChangeAction::Delete => write!(f, "delete"),
            ChangeAction::Orphan => write!(f, "orphan"),
        }
    }
}

/// A resource change in a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceChange {
    pub logical_id: String,
    pub resource_type: String,
    pub action: ChangeAction,
    /// Property paths that differ, e.g. `Properties.WebsiteConfiguration.IndexDocument`.
    pub changed_paths: Vec<String>,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

/// Changes needed to move from one template to another.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanSummary {
    pub to_add: Vec<ResourceChange>,
    pub to_change: Vec<ResourceChange>,
    pub to_destroy: Vec<ResourceChange>,
    pub to_orphan: Vec<ResourceChange>,
    /// Changed paths outside `Resources`, e.g. `Description` or `Outputs.SiteUrl`.
    #[serde(default)]
    pub stack_changes: Vec<String>,
}

impl PlanSummary {
    /// A plan with no changes: applying it is a no-op.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty()
            && self.to_change.is_empty()
            && self.to_destroy.is_empty()
            && self.to_orphan.is_empty()
            && self.stack_changes.is_empty()
    }

    pub fn changes(&self) -> impl Iterator<Item = &ResourceChange> {
        self.to_add
            .iter()
            .chain(&self.to_change)
            .chain(&self.to_destroy)
            .chain(&self.to_orphan)
    }
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes.");
        }
        for change in self.changes() {
            writeln!(
                f,
                "{:>8} {} ({})",
                change.action, change.logical_id, change.resource_type
            )?;
            for path in &change.changed_paths {
                writeln!(f, "           ~ {}", path)?;
            }
        }
        for path in &self.stack_changes {
            writeln!(f, "{:>8} stack ~ {}", ChangeAction::Update, path)?;
        }
        write!(
            f,
            "Plan: {} to add, {} to change, {} to destroy, {} to orphan.",
            self.to_add.len(),
            self.to_change.len(),
            self.to_destroy.len(),
            self.to_orphan.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revisions::Revision;

    #[test]
    fn test_rejects_bad_stack_name() {
        let stack = Revision::PrivateWithIdentity.stack().unwrap();
        let result = SiteStack::new(
            "1nfra stack",
            stack.build,
            stack.bucket,
            stack.distribution,
            stack.pipeline,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_duplicate_logical_ids() {
        let mut stack = Revision::PublicWebsite.stack().unwrap();
        stack.bucket.id = stack.pipeline.id.clone();
        let result = SiteStack::new(
            "InfraStack",
            stack.build,
            stack.bucket,
            stack.distribution,
            stack.pipeline,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_plan_display() {
        let plan = PlanSummary::default();
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes.");
    }

    #[test]
    fn test_declared_ids_include_identity() {
        let stack = Revision::PrivateWithIdentity.stack().unwrap();
        let ids: Vec<&str> = stack.declared_ids().iter().map(|id| id.as_str()).collect();
        assert!(ids.contains(&"OriginAccessControl"));
        assert!(ids.contains(&"ViteSiteDistribution"));
    }
}
