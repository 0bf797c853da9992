//! Provisioner trait and apply/destroy results.
//!
//! Provisioners take a synthesized template and converge a target
//! (a cloud account, a local state file) to it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::stack::{PlanSummary, StackState};
use crate::synth::Template;

/// Outcome of an apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Changes that were carried out. Empty when the stack was up to date.
    pub plan: PlanSummary,
    /// State serial after the apply.
    pub serial: u64,
    /// Stack outputs by name, resolved against physical ids.
    pub outputs: Vec<(String, String)>,
    pub applied_at: DateTime<Utc>,
}

impl ApplyResult {
    pub fn changed(&self) -> bool {
        !self.plan.is_empty()
    }
}

/// Outcome of a destroy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DestroyResult {
    /// Logical ids deleted, in deletion order.
    pub destroyed: Vec<String>,
    /// Logical ids left in place because of a Retain deletion policy.
    pub orphaned: Vec<String>,
}

/// Seam to a provisioning engine.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Name of this provisioner.
    fn name(&self) -> &'static str;

    /// Changes an apply of `template` would make.
    async fn plan(&self, template: &Template) -> Result<PlanSummary>;

    /// Converge to `template`. Applying an up-to-date template is a no-op.
    async fn apply(&self, template: &Template) -> Result<ApplyResult>;

    /// Tear down everything the stack owns, honoring retention.
    async fn destroy(&self) -> Result<DestroyResult>;

    /// Last recorded state, `None` if the stack was never applied.
    async fn state(&self) -> Result<Option<StackState>>;
}
