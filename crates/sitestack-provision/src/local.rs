//! Local state-file provisioner.
//!
//! Records what an apply would have created in `<dir>/<stack>.state.json`
//! instead of calling a cloud API. Physical ids are derived from the stack
//! name and logical id, so two applies of the same template agree.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use sitestack_core::id::LockId;
use sitestack_core::provisioner::{ApplyResult, DestroyResult, Provisioner};
use sitestack_core::stack::{ChangeAction, PlanSummary, ResourceState, StackState};
use sitestack_core::{Error, Result, Template, diff};

/// Provisioner backed by a JSON state file.
pub struct LocalProvisioner {
    state_dir: PathBuf,
    stack_name: String,
}

impl LocalProvisioner {
    pub fn new(state_dir: impl Into<PathBuf>, stack_name: impl Into<String>) -> Self {
        Self {
            state_dir: state_dir.into(),
            stack_name: stack_name.into(),
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}.state.json", self.stack_name))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(format!("{}.lock", self.stack_name))
    }

    /// Physical id for `logical_id`, stable across applies.
    pub fn physical_id(&self, logical_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.stack_name.as_bytes());
        hasher.update(b"/");
        hasher.update(logical_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!(
            "{}-{}-{}",
            self.stack_name.to_lowercase(),
            logical_id.to_lowercase(),
            &digest[..12]
        )
    }

    async fn lock(&self) -> Result<StateLock> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let path = self.lock_path();
        let id = LockId::new();
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let holder = tokio::fs::read_to_string(&path).await.unwrap_or_default();
                return Err(Error::StateLocked(format!(
                    "lock {} ({})",
                    holder.trim(),
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let lock = StateLock { path };
        file.write_all(id.to_string().as_bytes()).await?;
        file.flush().await?;
        debug!(lock_id = %id, path = %lock.path.display(), "Acquired state lock");
        Ok(lock)
    }

    async fn load(&self) -> Result<Option<StackState>> {
        let path = self.state_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: StackState = serde_json::from_slice(&bytes)?;
        if state.stack_name != self.stack_name {
            return Err(Error::State(format!(
                "{} belongs to stack '{}', not '{}'",
                path.display(),
                state.stack_name,
                self.stack_name
            )));
        }
        Ok(Some(state))
    }

    async fn save(&self, state: &StackState) -> Result<()> {
        let path = self.state_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    fn previous_template(state: Option<&StackState>) -> Result<Option<Template>> {
        state
            .map(|s| Template::from_value(s.template.clone()))
            .transpose()
    }
}

/// Held for the duration of an apply or destroy.
struct StateLock {
    path: PathBuf,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release state lock");
        }
    }
}

#[async_trait]
impl Provisioner for LocalProvisioner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn plan(&self, template: &Template) -> Result<PlanSummary> {
        let state = self.load().await?;
        let before = Self::previous_template(state.as_ref())?;
        Ok(diff(before.as_ref(), template))
    }

    async fn apply(&self, template: &Template) -> Result<ApplyResult> {
        let _lock = self.lock().await?;
        let state = self.load().await?;
        let before = Self::previous_template(state.as_ref())?;
        let plan = diff(before.as_ref(), template);

        let up_to_date = plan.is_empty()
            && state
                .as_ref()
                .is_some_and(|s| s.template_digest == template.digest());
        if up_to_date {
            let serial = state.as_ref().map_or(0, |s| s.serial);
            info!(stack = %self.stack_name, serial, "Stack is up to date");
            let resources = state.map(|s| s.resources).unwrap_or_default();
            return Ok(ApplyResult {
                outputs: resolve_outputs(template, &resources),
                plan,
                serial,
                applied_at: Utc::now(),
            });
        }

        let order = template.dependency_order()?;
        let previous = state.as_ref().map(|s| &s.resources);
        let serial = state.as_ref().map_or(0, |s| s.serial) + 1;
        let mut resources = BTreeMap::new();

        for logical_id in &order {
            let Some(resource) = template.resource(logical_id) else {
                continue;
            };
            let action = plan
                .changes()
                .find(|c| &c.logical_id == logical_id)
                .map(|c| c.action);
            let physical_id = match (previous.and_then(|p| p.get(logical_id)), action) {
                (Some(_), Some(ChangeAction::Replace)) => {
                    format!("{}-r{}", self.physical_id(logical_id), serial)
                }
                (Some(old), _) => old.physical_id.clone(),
                (None, _) => self.physical_id(logical_id),
            };
            if let Some(action) = action {
                info!(
                    stack = %self.stack_name,
                    logical_id = %logical_id,
                    physical_id = %physical_id,
                    %action,
                    "Applied resource change"
                );
            }
            resources.insert(logical_id.clone(), resource_state(resource, physical_id));
        }

        for change in &plan.to_destroy {
            info!(stack = %self.stack_name, logical_id = %change.logical_id, "Deleted resource");
        }
        for change in &plan.to_orphan {
            warn!(
                stack = %self.stack_name,
                logical_id = %change.logical_id,
                "Resource removed from stack but retained"
            );
        }

        let new_state = StackState {
            stack_name: self.stack_name.clone(),
            lineage: state.as_ref().map(|s| s.lineage).unwrap_or_default(),
            serial,
            template_digest: template.digest(),
            template: template.as_value().clone(),
            resources,
            updated_at: Utc::now(),
        };
        self.save(&new_state).await?;
        info!(stack = %self.stack_name, serial, "{}", summary_line(&plan));

        Ok(ApplyResult {
            outputs: resolve_outputs(template, &new_state.resources),
            plan,
            serial,
            applied_at: new_state.updated_at,
        })
    }

    async fn destroy(&self) -> Result<DestroyResult> {
        let _lock = self.lock().await?;
        let Some(state) = self.load().await? else {
            info!(stack = %self.stack_name, "Nothing to destroy");
            return Ok(DestroyResult::default());
        };

        let template = Template::from_value(state.template.clone())?;
        let mut order = template.dependency_order()?;
        order.reverse();

        let mut result = DestroyResult::default();
        for logical_id in order {
            let Some(resource) = state.resources.get(&logical_id) else {
                continue;
            };
            if resource.is_retained() {
                warn!(
                    stack = %self.stack_name,
                    logical_id = %logical_id,
                    physical_id = %resource.physical_id,
                    "Retaining resource"
                );
                result.orphaned.push(logical_id);
            } else {
                debug!(stack = %self.stack_name, logical_id = %logical_id, "Deleted resource");
                result.destroyed.push(logical_id);
            }
        }

        remove_if_exists(&self.state_path()).await?;
        info!(
            stack = %self.stack_name,
            destroyed = result.destroyed.len(),
            orphaned = result.orphaned.len(),
            "Stack destroyed"
        );
        Ok(result)
    }

    async fn state(&self) -> Result<Option<StackState>> {
        self.load().await
    }
}

fn resource_state(resource: &Value, physical_id: String) -> ResourceState {
    ResourceState {
        resource_type: resource
            .get("Type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        physical_id,
        properties: resource.get("Properties").cloned().unwrap_or_else(|| json!({})),
        deletion_policy: resource
            .get("DeletionPolicy")
            .and_then(Value::as_str)
            .map(String::from),
    }
}

/// Render each output, substituting physical ids for `Ref` and `Fn::GetAtt`.
fn resolve_outputs(
    template: &Template,
    resources: &BTreeMap<String, ResourceState>,
) -> Vec<(String, String)> {
    let Some(outputs) = template.outputs() else {
        return Vec::new();
    };
    outputs
        .iter()
        .map(|(name, output)| {
            let value = output.get("Value").unwrap_or(&Value::Null);
            let physical = |id: &str| {
                resources
                    .get(id)
                    .map(|r| r.physical_id.clone())
                    .unwrap_or_else(|| id.to_string())
            };
            let rendered = if let Some(id) = value.get("Ref").and_then(Value::as_str) {
                physical(id)
            } else if let Some([id, attr]) = value
                .get("Fn::GetAtt")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
            {
                format!(
                    "{}.{}",
                    physical(id.as_str().unwrap_or_default()),
                    attr.as_str().unwrap_or_default()
                )
            } else {
                match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                }
            };
            (name.clone(), rendered)
        })
        .collect()
}

fn summary_line(plan: &PlanSummary) -> String {
    format!(
        "Applied: {} added, {} changed, {} destroyed, {} orphaned",
        plan.to_add.len(),
        plan.to_change.len(),
        plan.to_destroy.len(),
        plan.to_orphan.len()
    )
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitestack_core::distribution::ViewerProtocolPolicy;
    use sitestack_core::{Revision, synthesize};

    fn template(revision: Revision) -> Template {
        synthesize(&revision.stack().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        let template = template(Revision::PrivateWithIdentity);

        let first = provisioner.apply(&template).await.unwrap();
        assert!(first.changed());
        assert_eq!(first.serial, 1);
        assert_eq!(first.plan.to_add.len(), template.resources().len());

        let plan = provisioner.plan(&template).await.unwrap();
        assert!(plan.is_empty());

        let second = provisioner.apply(&template).await.unwrap();
        assert!(!second.changed());
        assert_eq!(second.serial, 1);
        assert_eq!(first.outputs, second.outputs);
        assert!(!provisioner.lock_path().exists());
    }

    #[tokio::test]
    async fn test_plan_before_apply_creates_everything() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        let template = template(Revision::PublicWebsite);

        let plan = provisioner.plan(&template).await.unwrap();
        assert_eq!(plan.to_add.len(), template.resources().len());
        assert!(provisioner.state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_physical_ids() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        let mut stack = Revision::PrivateWithIdentity.stack().unwrap();
        provisioner.apply(&synthesize(&stack).unwrap()).await.unwrap();
        let before = provisioner.state().await.unwrap().unwrap();

        if let Some(dist) = stack.distribution.as_mut() {
            dist.viewer_protocol = ViewerProtocolPolicy::RedirectToHttps;
        }
        let result = provisioner.apply(&synthesize(&stack).unwrap()).await.unwrap();
        assert_eq!(result.serial, 2);
        assert_eq!(result.plan.to_change.len(), 1);
        assert_eq!(result.plan.to_change[0].logical_id, "ViteSiteDistribution");

        let after = provisioner.state().await.unwrap().unwrap();
        assert_eq!(after.lineage, before.lineage);
        assert_eq!(
            after.resources["ViteSiteDistribution"].physical_id,
            before.resources["ViteSiteDistribution"].physical_id
        );
    }

    #[tokio::test]
    async fn test_description_change_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        let stack = Revision::PublicWebsite.stack().unwrap();
        provisioner.apply(&synthesize(&stack).unwrap()).await.unwrap();

        let updated = synthesize(&stack.with_description("new description")).unwrap();
        let result = provisioner.apply(&updated).await.unwrap();
        assert!(result.changed());
        assert_eq!(result.serial, 2);
        assert_eq!(result.plan.stack_changes, vec!["Description"]);

        let state = provisioner.state().await.unwrap().unwrap();
        assert_eq!(state.template_digest, updated.digest());
        assert_eq!(state.template["Description"], "new description");
        assert!(provisioner.plan(&updated).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_released_when_apply_fails() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        std::fs::write(provisioner.state_path(), "not json").unwrap();

        assert!(provisioner.apply(&template(Revision::PublicWebsite)).await.is_err());
        assert!(!provisioner.lock_path().exists());
    }

    #[tokio::test]
    async fn test_held_lock_blocks_apply() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        std::fs::write(provisioner.lock_path(), "someone-else").unwrap();

        let err = provisioner
            .apply(&template(Revision::PublicWebsite))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateLocked(holder) if holder.contains("someone-else")));
        assert!(provisioner.lock_path().exists());
    }

    #[tokio::test]
    async fn test_destroy_orphans_retained_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        provisioner
            .apply(&template(Revision::PublicWebsite))
            .await
            .unwrap();

        let result = provisioner.destroy().await.unwrap();
        assert_eq!(result.orphaned, vec!["ViteSiteBucket".to_string()]);
        assert!(result.destroyed.contains(&"ViteSitePipeline".to_string()));
        assert!(!provisioner.state_path().exists());
        assert!(provisioner.state().await.unwrap().is_none());

        let again = provisioner.destroy().await.unwrap();
        assert!(again.destroyed.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_deletes_in_reverse_dependency_order() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner = LocalProvisioner::new(dir.path(), "InfraStack");
        let template = template(Revision::PrivateWithIdentity);
        provisioner.apply(&template).await.unwrap();

        let result = provisioner.destroy().await.unwrap();
        let position = |id: &str| result.destroyed.iter().position(|d| d == id).unwrap();
        assert!(position("ViteSiteDistribution") < position("OriginAccessControl"));
        assert!(position("ViteSitePipeline") < position("ViteSiteBuildProject"));
    }

    #[test]
    fn test_physical_ids_are_deterministic() {
        let a = LocalProvisioner::new("/tmp/a", "InfraStack");
        let b = LocalProvisioner::new("/tmp/b", "InfraStack");
        assert_eq!(a.physical_id("ViteSiteBucket"), b.physical_id("ViteSiteBucket"));
        assert!(a.physical_id("ViteSiteBucket").starts_with("infrastack-vitesitebucket-"));
        assert_ne!(a.physical_id("ViteSiteBucket"), a.physical_id("ViteSitePipeline"));
    }
}
