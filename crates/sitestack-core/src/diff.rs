//! Plan computation between two templates.

use serde_json::Value;

use crate::stack::{ChangeAction, PlanSummary, ResourceChange};
use crate::synth::Template;

/// Properties the engine cannot update in place, per resource type.
const REPLACEMENT_PROPERTIES: &[(&str, &[&str])] = &[
    ("AWS::S3::Bucket", &["BucketName"]),
    ("AWS::S3::BucketPolicy", &["Bucket"]),
    ("AWS::CodeBuild::Project", &["Name"]),
    ("AWS::CodePipeline::Pipeline", &["Name"]),
    ("AWS::CodePipeline::Webhook", &["Name"]),
    ("AWS::IAM::Role", &["RoleName", "Path"]),
    ("AWS::KMS::Alias", &["AliasName"]),
];

/// Compute the changes that move `before` to `after`.
///
/// `before` is `None` for a stack that was never applied, in which case every
/// resource is created. Sections other than `Resources` are reported as
/// stack-level changes.
pub fn diff(before: Option<&Template>, after: &Template) -> PlanSummary {
    let mut plan = PlanSummary::default();
    if let Some(before) = before {
        plan.stack_changes = stack_changes(before.as_value(), after.as_value());
    }
    let after_resources = after.resources();

    for (id, new) in after_resources {
        let old = before.and_then(|t| t.resource(id));
        let Some(old) = old else {
            plan.to_add.push(change(id, new, ChangeAction::Create, Vec::new(), None, Some(new)));
            continue;
        };
        if old == new {
            continue;
        }

        let mut paths = Vec::new();
        changed_paths(old, new, "", &mut paths);
        let action = if requires_replacement(old, new, &paths) {
            ChangeAction::Replace
        } else {
            ChangeAction::Update
        };
        plan.to_change
            .push(change(id, new, action, paths, Some(old), Some(new)));
    }

    if let Some(before) = before {
        for (id, old) in before.resources() {
            if after_resources.contains_key(id) {
                continue;
            }
            let retained = old.get("DeletionPolicy").and_then(Value::as_str) == Some("Retain");
            let action = if retained {
                ChangeAction::Orphan
            } else {
                ChangeAction::Delete
            };
            let entry = change(id, old, action, Vec::new(), Some(old), None);
            if retained {
                plan.to_orphan.push(entry);
            } else {
                plan.to_destroy.push(entry);
            }
        }
    }

    plan
}

fn stack_changes(before: &Value, after: &Value) -> Vec<String> {
    let strip = |body: &Value| {
        let mut body = body.clone();
        if let Some(sections) = body.as_object_mut() {
            sections.remove("Resources");
        }
        body
    };
    let mut paths = Vec::new();
    changed_paths(&strip(before), &strip(after), "", &mut paths);
    paths
}

fn change(
    id: &str,
    resource: &Value,
    action: ChangeAction,
    changed_paths: Vec<String>,
    before: Option<&Value>,
    after: Option<&Value>,
) -> ResourceChange {
    ResourceChange {
        logical_id: id.to_string(),
        resource_type: resource
            .get("Type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        action,
        changed_paths,
        before: before.cloned(),
        after: after.cloned(),
    }
}

fn requires_replacement(old: &Value, new: &Value, paths: &[String]) -> bool {
    let old_type = old.get("Type").and_then(Value::as_str);
    let new_type = new.get("Type").and_then(Value::as_str);
    if old_type != new_type {
        return true;
    }
    let Some(immutable) = REPLACEMENT_PROPERTIES
        .iter()
        .find(|(t, _)| Some(*t) == new_type)
        .map(|(_, props)| *props)
    else {
        return false;
    };
    paths.iter().any(|path| {
        immutable.iter().any(|prop| {
            let prefix = format!("Properties.{}", prop);
            path == &prefix || path.starts_with(&format!("{}.", prefix))
        })
    })
}

/// Dotted paths of leaves that differ. Arrays are compared as a whole.
fn changed_paths(old: &Value, new: &Value, prefix: &str, out: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) if x == y => {}
                    (Some(x), Some(y)) => changed_paths(x, y, &path, out),
                    _ => out.push(path),
                }
            }
        }
        _ if old != new => out.push(prefix.to_string()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revisions::Revision;
    use crate::synthesize;
    use serde_json::json;

    fn template(resources: Value) -> Template {
        Template::from_value(json!({ "Resources": resources })).unwrap()
    }

    #[test]
    fn test_identical_templates_have_empty_plan() {
        let t = synthesize(&Revision::PrivateWithIdentity.stack().unwrap()).unwrap();
        let plan = diff(Some(&t), &t);
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes.");
    }

    #[test]
    fn test_first_apply_creates_everything() {
        let t = synthesize(&Revision::PublicWebsite.stack().unwrap()).unwrap();
        let plan = diff(None, &t);
        assert_eq!(plan.to_add.len(), t.resources().len());
        assert!(plan.to_change.is_empty());
        assert!(plan.to_add.iter().all(|c| c.action == ChangeAction::Create));
    }

    #[test]
    fn test_property_update_records_path() {
        let before = template(json!({
            "Site": { "Type": "AWS::S3::Bucket", "Properties": {
                "WebsiteConfiguration": { "IndexDocument": "index.html" } } }
        }));
        let after = template(json!({
            "Site": { "Type": "AWS::S3::Bucket", "Properties": {
                "WebsiteConfiguration": { "IndexDocument": "home.html" } } }
        }));
        let plan = diff(Some(&before), &after);
        assert_eq!(plan.to_change.len(), 1);
        let change = &plan.to_change[0];
        assert_eq!(change.action, ChangeAction::Update);
        assert_eq!(
            change.changed_paths,
            vec!["Properties.WebsiteConfiguration.IndexDocument"]
        );
    }

    #[test]
    fn test_immutable_property_forces_replace() {
        let before = template(json!({
            "Site": { "Type": "AWS::S3::Bucket", "Properties": { "BucketName": "a" } }
        }));
        let after = template(json!({
            "Site": { "Type": "AWS::S3::Bucket", "Properties": { "BucketName": "b" } }
        }));
        let plan = diff(Some(&before), &after);
        assert_eq!(plan.to_change[0].action, ChangeAction::Replace);
    }

    #[test]
    fn test_retained_resource_is_orphaned() {
        let before = template(json!({
            "Kept": { "Type": "AWS::S3::Bucket", "DeletionPolicy": "Retain" },
            "Gone": { "Type": "AWS::S3::Bucket", "DeletionPolicy": "Delete" }
        }));
        let after = template(json!({}));
        let plan = diff(Some(&before), &after);
        assert_eq!(plan.to_orphan.len(), 1);
        assert_eq!(plan.to_orphan[0].logical_id, "Kept");
        assert_eq!(plan.to_destroy.len(), 1);
        assert_eq!(plan.to_destroy[0].logical_id, "Gone");
    }

    #[test]
    fn test_description_change_is_planned() {
        let stack = Revision::PublicWebsite.stack().unwrap();
        let before = synthesize(&stack).unwrap();
        let after = synthesize(&stack.with_description("new description")).unwrap();

        let plan = diff(Some(&before), &after);
        assert!(!plan.is_empty());
        assert!(plan.to_change.is_empty());
        assert_eq!(plan.stack_changes, vec!["Description"]);
        assert!(plan.to_string().contains("stack ~ Description"));
    }

    #[test]
    fn test_output_change_is_planned() {
        let before = Template::from_value(json!({
            "Resources": {},
            "Outputs": { "SiteUrl": { "Value": "a" } }
        }))
        .unwrap();
        let after = Template::from_value(json!({
            "Resources": {},
            "Outputs": { "SiteUrl": { "Value": "b" } }
        }))
        .unwrap();
        assert_eq!(diff(Some(&before), &after).stack_changes, vec!["Outputs.SiteUrl.Value"]);
    }

    #[test]
    fn test_switching_revisions() {
        let legacy = synthesize(&Revision::LegacyAnyPrincipal.stack().unwrap()).unwrap();
        let private = synthesize(&Revision::PrivateWithIdentity.stack().unwrap()).unwrap();
        let plan = diff(Some(&legacy), &private);

        assert!(plan.to_add.iter().any(|c| c.logical_id == "ViteSiteBucket"));
        assert!(plan.to_destroy.iter().any(|c| c.logical_id == "ViteStiteBucket"));
        let summary = plan.to_string();
        assert!(summary.contains("to add"));
    }
}
