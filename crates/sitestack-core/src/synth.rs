//! Template synthesis.
//!
//! Turns a [`SiteStack`] into the JSON template a provisioning engine
//! consumes. Synthesis is deterministic: the same stack always yields the
//! same template and therefore the same [`Template::digest`].

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::distribution::{Distribution, ErrorResponse, OriginAccessIdentity};
use crate::pipeline::{Action, BuildAction, DeployAction, Pipeline};
use crate::source::{GitHubSource, SourceTrigger};
use crate::stack::SiteStack;
use crate::storage::{Bucket, BucketAccess, Effect, PolicyResource, PolicyStatement, Principal, PublicAccessBlock};
use crate::validate::{self, Findings};
use crate::{Error, LogicalId, Result};

pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";
pub const POLICY_VERSION: &str = "2012-10-17";
/// Managed cache policy "CachingOptimized".
pub const CACHING_OPTIMIZED_POLICY_ID: &str = "658327ea-f89d-4fab-a63d-7e88639e58f6";

const ORIGIN_ID: &str = "origin1";

/// A synthesized template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    body: Value,
}

impl Template {
    /// Wrap an existing template document, e.g. one read back from disk.
    pub fn from_value(body: Value) -> Result<Self> {
        match body.get("Resources") {
            Some(Value::Object(_)) => Ok(Self { body }),
            _ => Err(Error::InvalidInput(
                "template must contain a 'Resources' object".to_string(),
            )),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.body
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.body)?)
    }

    pub fn resources(&self) -> &Map<String, Value> {
        static EMPTY: std::sync::LazyLock<Map<String, Value>> = std::sync::LazyLock::new(Map::new);
        self.body
            .get("Resources")
            .and_then(Value::as_object)
            .unwrap_or(&EMPTY)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.resources().get(logical_id)
    }

    pub fn resource_type(&self, logical_id: &str) -> Option<&str> {
        self.resource(logical_id)
            .and_then(|r| r.get("Type"))
            .and_then(Value::as_str)
    }

    pub fn outputs(&self) -> Option<&Map<String, Value>> {
        self.body.get("Outputs").and_then(Value::as_object)
    }

    /// SHA-256 of the template with object keys sorted.
    pub fn digest(&self) -> String {
        let canonical = canonicalize(&self.body);
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Resources `logical_id` depends on through `Ref`, `Fn::GetAtt` or `DependsOn`.
    pub fn dependencies(&self, logical_id: &str) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        let Some(resource) = self.resource(logical_id) else {
            return deps;
        };
        collect_references(resource, &mut deps);
        match resource.get("DependsOn") {
            Some(Value::String(dep)) => {
                deps.insert(dep.clone());
            }
            Some(Value::Array(items)) => {
                deps.extend(items.iter().filter_map(Value::as_str).map(String::from));
            }
            _ => {}
        }
        // Only resources count; parameters and pseudo parameters do not.
        let resources = self.resources();
        deps.retain(|d| d != logical_id && resources.contains_key(d));
        deps
    }

    /// Leaves-first creation order. Deletion runs in reverse.
    pub fn dependency_order(&self) -> Result<Vec<String>> {
        let graph: HashMap<&str, BTreeSet<String>> = self
            .resources()
            .keys()
            .map(|id| (id.as_str(), self.dependencies(id)))
            .collect();

        let mut marks: HashMap<String, Mark> = HashMap::new();
        let mut order = Vec::new();
        for id in self.resources().keys() {
            visit(id, &graph, &mut marks, &mut order)?;
        }
        Ok(order)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn visit(
    id: &str,
    graph: &HashMap<&str, BTreeSet<String>>,
    marks: &mut HashMap<String, Mark>,
    order: &mut Vec<String>,
) -> Result<()> {
    match marks.get(id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => return Err(Error::DependencyCycle(id.to_string())),
        None => {}
    }

    marks.insert(id.to_string(), Mark::Visiting);
    if let Some(deps) = graph.get(id) {
        for dep in deps {
            visit(dep, graph, marks, order).map_err(|e| match e {
                Error::DependencyCycle(path) => {
                    Error::DependencyCycle(format!("{} -> {}", id, path))
                }
                other => other,
            })?;
        }
    }
    marks.insert(id.to_string(), Mark::Done);
    order.push(id.to_string());
    Ok(())
}

fn collect_references(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                out.insert(target.clone());
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = parts.first() {
                    out.insert(target.clone());
                }
            }
            for (key, child) in map {
                if key != "DependsOn" {
                    collect_references(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

// Intrinsic function helpers.

fn reference(id: &LogicalId) -> Value {
    json!({ "Ref": id.as_str() })
}

fn get_att(id: &LogicalId, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_str(), attribute] })
}

fn join(parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": ["", parts] })
}

fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

fn public_access_block(block: PublicAccessBlock) -> Value {
    json!({
        "BlockPublicAcls": block.block_public_acls,
        "BlockPublicPolicy": block.block_public_policy,
        "IgnorePublicAcls": block.ignore_public_acls,
        "RestrictPublicBuckets": block.restrict_public_buckets,
    })
}

/// Synthesize without running validation.
pub fn synthesize(stack: &SiteStack) -> Result<Template> {
    let mut synth = Synth::new(stack);
    synth.build_project()?;
    synth.site_bucket()?;
    if let Some(dist) = &stack.distribution {
        synth.distribution(dist)?;
    }
    synth.pipeline(&stack.pipeline)?;
    synth.outputs();

    let mut body = Map::new();
    body.insert("AWSTemplateFormatVersion".to_string(), json!(TEMPLATE_FORMAT_VERSION));
    if let Some(description) = &stack.description {
        body.insert("Description".to_string(), json!(description));
    }
    body.insert("Resources".to_string(), Value::Object(synth.resources));
    if !synth.outputs.is_empty() {
        body.insert("Outputs".to_string(), Value::Object(synth.outputs));
    }

    let template = Template::from_value(Value::Object(body))?;
    debug!(
        stack = %stack.name,
        resources = template.resources().len(),
        digest = %template.digest(),
        "Synthesized template"
    );
    Ok(template)
}

/// Validate first and refuse to synthesize a stack with error findings
/// unless `force` is set. Findings are returned either way.
pub fn synthesize_checked(stack: &SiteStack, force: bool) -> Result<(Template, Findings)> {
    let findings = validate::validate(stack);
    let errors = findings.errors().count();
    if errors > 0 && !force {
        return Err(Error::Validation(errors));
    }
    Ok((synthesize(stack)?, findings))
}

struct Synth<'a> {
    stack: &'a SiteStack,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl<'a> Synth<'a> {
    fn new(stack: &'a SiteStack) -> Self {
        Self {
            stack,
            resources: Map::new(),
            outputs: Map::new(),
        }
    }

    fn add(&mut self, id: &LogicalId, resource: Value) -> Result<()> {
        if self.resources.contains_key(id.as_str()) {
            return Err(Error::InvalidInput(format!(
                "resource '{}' synthesized twice",
                id
            )));
        }
        self.resources.insert(id.as_str().to_string(), resource);
        Ok(())
    }

    fn artifacts_bucket_id(&self) -> Result<LogicalId> {
        self.stack.pipeline.id.child("ArtifactsBucket")
    }

    fn encryption_key_id(&self) -> Result<LogicalId> {
        self.stack.pipeline.id.child("ArtifactsBucketEncryptionKey")
    }

    fn identity(&self) -> Option<&'a OriginAccessIdentity> {
        self.stack
            .distribution
            .as_ref()
            .and_then(|d| d.origin.identity.as_ref())
    }

    fn build_project(&mut self) -> Result<()> {
        let stack = self.stack;
        let project = &stack.build;
        let role_id = project.id.child("Role")?;
        let artifacts = self.artifacts_bucket_id()?;

        let mut statements = vec![
            json!({
                "Effect": "Allow",
                "Action": ["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"],
                "Resource": sub("arn:${AWS::Partition}:logs:${AWS::Region}:${AWS::AccountId}:log-group:/aws/codebuild/*"),
            }),
            json!({
                "Effect": "Allow",
                "Action": ["s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:Abort*"],
                "Resource": [
                    get_att(&artifacts, "Arn"),
                    join(vec![get_att(&artifacts, "Arn"), json!("/*")]),
                ],
            }),
        ];
        if stack.pipeline.cross_account_keys {
            statements.push(json!({
                "Effect": "Allow",
                "Action": ["kms:Decrypt", "kms:Encrypt", "kms:ReEncrypt*", "kms:GenerateDataKey*"],
                "Resource": get_att(&self.encryption_key_id()?, "Arn"),
            }));
        }

        self.add(
            &role_id,
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "AssumeRolePolicyDocument": assume_role_policy("codebuild.amazonaws.com"),
                    "Policies": [{
                        "PolicyName": "BuildPolicy",
                        "PolicyDocument": { "Version": POLICY_VERSION, "Statement": statements },
                    }],
                },
            }),
        )?;

        let buildspec = serde_json::to_string_pretty(&project.spec.to_json())?;
        let mut properties = Map::new();
        properties.insert("Artifacts".to_string(), json!({ "Type": "CODEPIPELINE" }));
        properties.insert(
            "Environment".to_string(),
            json!({
                "ComputeType": project.compute.as_str(),
                "Image": project.image.image_id(),
                "ImagePullCredentialsType": "CODEBUILD",
                "PrivilegedMode": false,
                "Type": "LINUX_CONTAINER",
            }),
        );
        properties.insert("ServiceRole".to_string(), get_att(&role_id, "Arn"));
        properties.insert(
            "Source".to_string(),
            json!({ "BuildSpec": buildspec, "Type": "CODEPIPELINE" }),
        );
        if let Some(minutes) = project.timeout_minutes {
            properties.insert("TimeoutInMinutes".to_string(), json!(minutes));
        }

        self.add(
            &project.id,
            json!({ "Type": "AWS::CodeBuild::Project", "Properties": properties }),
        )
    }

    fn site_bucket(&mut self) -> Result<()> {
        let stack = self.stack;
        let bucket = &stack.bucket;
        let deletion = bucket.removal.deletion_policy();

        let mut properties = Map::new();
        properties.insert(
            "PublicAccessBlockConfiguration".to_string(),
            public_access_block(bucket.public_access_block()),
        );
        if let Some(index) = &bucket.index_document {
            let mut website = Map::new();
            website.insert("IndexDocument".to_string(), json!(index));
            if let Some(error) = &bucket.error_document {
                website.insert("ErrorDocument".to_string(), json!(error));
            }
            properties.insert("WebsiteConfiguration".to_string(), Value::Object(website));
        }
        if bucket.access == BucketAccess::PublicRead {
            properties.insert(
                "OwnershipControls".to_string(),
                json!({ "Rules": [{ "ObjectOwnership": "ObjectWriter" }] }),
            );
        }

        self.add(
            &bucket.id,
            json!({
                "Type": "AWS::S3::Bucket",
                "Properties": properties,
                "UpdateReplacePolicy": deletion,
                "DeletionPolicy": deletion,
            }),
        )?;

        let statements = bucket.effective_policy(self.identity());
        if statements.is_empty() {
            return Ok(());
        }
        let rendered = statements
            .iter()
            .map(|s| self.policy_statement(bucket, s))
            .collect::<Result<Vec<_>>>()?;

        self.add(
            &bucket.id.child("Policy")?,
            json!({
                "Type": "AWS::S3::BucketPolicy",
                "Properties": {
                    "Bucket": reference(&bucket.id),
                    "PolicyDocument": { "Version": POLICY_VERSION, "Statement": rendered },
                },
            }),
        )
    }

    fn policy_statement(&self, bucket: &Bucket, statement: &PolicyStatement) -> Result<Value> {
        let principal = match &statement.principal {
            Principal::Any => json!({ "AWS": "*" }),
            Principal::OriginAccessIdentity(id) => {
                if self.identity().map(|oai| &oai.id) != Some(id) {
                    return Err(Error::UnknownReference(format!(
                        "bucket policy names origin access identity '{}' which is not declared",
                        id
                    )));
                }
                json!({ "CanonicalUser": get_att(id, "S3CanonicalUserId") })
            }
            Principal::Service(service) => json!({ "Service": service }),
            Principal::Aws(arn) => json!({ "AWS": arn }),
        };
        let resource = match statement.resource {
            PolicyResource::Objects => join(vec![get_att(&bucket.id, "Arn"), json!("/*")]),
            PolicyResource::Bucket => get_att(&bucket.id, "Arn"),
        };

        let mut rendered = Map::new();
        if let Some(sid) = &statement.sid {
            rendered.insert("Sid".to_string(), json!(sid));
        }
        let effect = match statement.effect {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        };
        rendered.insert("Effect".to_string(), json!(effect));
        rendered.insert("Principal".to_string(), principal);
        rendered.insert("Action".to_string(), json!(statement.actions));
        rendered.insert("Resource".to_string(), resource);
        Ok(Value::Object(rendered))
    }

    fn distribution(&mut self, dist: &Distribution) -> Result<()> {
        let stack = self.stack;
        let bucket = &stack.bucket;
        if dist.origin.bucket != bucket.id {
            return Err(Error::UnknownReference(format!(
                "distribution '{}' origin bucket '{}' is not declared in the stack",
                dist.id, dist.origin.bucket
            )));
        }

        let origin = match &dist.origin.identity {
            Some(oai) => {
                self.add(
                    &oai.id,
                    json!({
                        "Type": "AWS::CloudFront::CloudFrontOriginAccessIdentity",
                        "Properties": {
                            "CloudFrontOriginAccessIdentityConfig": { "Comment": oai.comment },
                        },
                    }),
                )?;
                json!({
                    "Id": ORIGIN_ID,
                    "DomainName": get_att(&bucket.id, "RegionalDomainName"),
                    "S3OriginConfig": {
                        "OriginAccessIdentity": join(vec![
                            json!("origin-access-identity/cloudfront/"),
                            reference(&oai.id),
                        ]),
                    },
                })
            }
            None if bucket.serves_website() && bucket.access == BucketAccess::PublicRead => {
                json!({
                    "Id": ORIGIN_ID,
                    "DomainName": {
                        "Fn::Select": [2, { "Fn::Split": ["/", get_att(&bucket.id, "WebsiteURL")] }],
                    },
                    "CustomOriginConfig": { "OriginProtocolPolicy": "http-only" },
                })
            }
            None => json!({
                "Id": ORIGIN_ID,
                "DomainName": get_att(&bucket.id, "RegionalDomainName"),
                "S3OriginConfig": { "OriginAccessIdentity": "" },
            }),
        };

        let mut config = Map::new();
        config.insert("Enabled".to_string(), json!(true));
        if let Some(root) = &dist.default_root_object {
            config.insert("DefaultRootObject".to_string(), json!(root));
        }
        config.insert("HttpVersion".to_string(), json!("http2"));
        config.insert("IPV6Enabled".to_string(), json!(true));
        config.insert("PriceClass".to_string(), json!(dist.price_class.as_str()));
        config.insert("Origins".to_string(), json!([origin]));
        config.insert(
            "DefaultCacheBehavior".to_string(),
            json!({
                "TargetOriginId": ORIGIN_ID,
                "ViewerProtocolPolicy": dist.viewer_protocol.as_str(),
                "AllowedMethods": dist.allowed_methods.methods(),
                "CachedMethods": dist.allowed_methods.cached_methods(),
                "CachePolicyId": CACHING_OPTIMIZED_POLICY_ID,
                "Compress": true,
            }),
        );
        if !dist.error_responses.is_empty() {
            let responses: Vec<Value> = dist.error_responses.iter().map(error_response).collect();
            config.insert("CustomErrorResponses".to_string(), json!(responses));
        }

        self.add(
            &dist.id,
            json!({
                "Type": "AWS::CloudFront::Distribution",
                "Properties": { "DistributionConfig": config },
            }),
        )
    }

    fn pipeline(&mut self, pipeline: &Pipeline) -> Result<()> {
        let stack = self.stack;
        let artifacts = self.artifacts_bucket_id()?;
        let role_id = pipeline.id.child("Role")?;

        let encryption = if pipeline.cross_account_keys {
            let key_id = self.encryption_key_id()?;
            self.add(
                &key_id,
                json!({
                    "Type": "AWS::KMS::Key",
                    "Properties": {
                        "KeyPolicy": {
                            "Version": POLICY_VERSION,
                            "Statement": [{
                                "Effect": "Allow",
                                "Principal": { "AWS": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:root") },
                                "Action": "kms:*",
                                "Resource": "*",
                            }],
                        },
                    },
                    "UpdateReplacePolicy": "Delete",
                    "DeletionPolicy": "Delete",
                }),
            )?;
            self.add(
                &key_id.child("Alias")?,
                json!({
                    "Type": "AWS::KMS::Alias",
                    "Properties": {
                        "AliasName": format!(
                            "alias/codepipeline-{}-{}",
                            stack.name.to_lowercase(),
                            pipeline.name.to_lowercase()
                        ),
                        "TargetKeyId": get_att(&key_id, "Arn"),
                    },
                }),
            )?;
            Some(key_id)
        } else {
            None
        };

        let sse = match &encryption {
            Some(key_id) => json!({
                "SSEAlgorithm": "aws:kms",
                "KMSMasterKeyID": get_att(key_id, "Arn"),
            }),
            None => json!({ "SSEAlgorithm": "AES256" }),
        };
        self.add(
            &artifacts,
            json!({
                "Type": "AWS::S3::Bucket",
                "Properties": {
                    "BucketEncryption": {
                        "ServerSideEncryptionConfiguration": [{ "ServerSideEncryptionByDefault": sse }],
                    },
                    "PublicAccessBlockConfiguration": public_access_block(PublicAccessBlock::BLOCK_ALL),
                },
                "UpdateReplacePolicy": "Retain",
                "DeletionPolicy": "Retain",
            }),
        )?;

        let site = &stack.bucket.id;
        let mut statements = vec![
            json!({
                "Effect": "Allow",
                "Action": ["s3:GetObject*", "s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:Abort*"],
                "Resource": [
                    get_att(&artifacts, "Arn"),
                    join(vec![get_att(&artifacts, "Arn"), json!("/*")]),
                ],
            }),
            json!({
                "Effect": "Allow",
                "Action": ["codebuild:BatchGetBuilds", "codebuild:StartBuild", "codebuild:StopBuild"],
                "Resource": get_att(&stack.build.id, "Arn"),
            }),
            json!({
                "Effect": "Allow",
                "Action": ["s3:GetBucket*", "s3:List*", "s3:PutObject", "s3:PutObjectAcl", "s3:DeleteObject*", "s3:Abort*"],
                "Resource": [
                    get_att(site, "Arn"),
                    join(vec![get_att(site, "Arn"), json!("/*")]),
                ],
            }),
        ];
        if let Some(key_id) = &encryption {
            statements.push(json!({
                "Effect": "Allow",
                "Action": ["kms:Decrypt", "kms:DescribeKey", "kms:Encrypt", "kms:ReEncrypt*", "kms:GenerateDataKey*"],
                "Resource": get_att(key_id, "Arn"),
            }));
        }
        self.add(
            &role_id,
            json!({
                "Type": "AWS::IAM::Role",
                "Properties": {
                    "AssumeRolePolicyDocument": assume_role_policy("codepipeline.amazonaws.com"),
                    "Policies": [{
                        "PolicyName": "PipelinePolicy",
                        "PolicyDocument": { "Version": POLICY_VERSION, "Statement": statements },
                    }],
                },
            }),
        )?;

        let mut stages = Vec::new();
        for stage in &pipeline.stages {
            let actions = stage
                .actions
                .iter()
                .map(|action| self.action(action))
                .collect::<Result<Vec<_>>>()?;
            stages.push(json!({ "Name": stage.name, "Actions": actions }));
        }

        let mut artifact_store = Map::new();
        artifact_store.insert("Type".to_string(), json!("S3"));
        artifact_store.insert("Location".to_string(), reference(&artifacts));
        if let Some(key_id) = &encryption {
            artifact_store.insert(
                "EncryptionKey".to_string(),
                json!({ "Id": get_att(key_id, "Arn"), "Type": "KMS" }),
            );
        }

        self.add(
            &pipeline.id,
            json!({
                "Type": "AWS::CodePipeline::Pipeline",
                "Properties": {
                    "Name": pipeline.name,
                    "RoleArn": get_att(&role_id, "Arn"),
                    "ArtifactStore": artifact_store,
                    "Stages": stages,
                    "RestartExecutionOnUpdate": pipeline.restart_on_update,
                },
                "DependsOn": [role_id.as_str()],
            }),
        )?;

        if let Some(source) = pipeline.source() {
            if source.trigger == SourceTrigger::Webhook {
                self.webhook(pipeline, source)?;
            }
        }
        Ok(())
    }

    fn action(&self, action: &Action) -> Result<Value> {
        let value = match action {
            Action::Source(source) => json!({
                "Name": source.action_name,
                "ActionTypeId": {
                    "Category": "Source",
                    "Owner": "ThirdParty",
                    "Provider": "GitHub",
                    "Version": "1",
                },
                "Configuration": {
                    "Owner": source.owner,
                    "Repo": source.repo,
                    "Branch": source.branch,
                    "OAuthToken": source.credential.dynamic_reference(),
                    "PollForSourceChanges": source.trigger == SourceTrigger::Poll,
                },
                "OutputArtifacts": [{ "Name": source.output.name() }],
                "RunOrder": 1,
            }),
            Action::Build(build) => self.build_action(build)?,
            Action::Deploy(deploy) => self.deploy_action(deploy)?,
        };
        Ok(value)
    }

    fn build_action(&self, build: &BuildAction) -> Result<Value> {
        if build.project != self.stack.build.id {
            return Err(Error::UnknownReference(format!(
                "build action '{}' runs project '{}' which is not declared",
                build.name, build.project
            )));
        }
        let outputs: Vec<Value> = build
            .outputs
            .iter()
            .map(|a| json!({ "Name": a.name() }))
            .collect();
        Ok(json!({
            "Name": build.name,
            "ActionTypeId": {
                "Category": "Build",
                "Owner": "AWS",
                "Provider": "CodeBuild",
                "Version": "1",
            },
            "Configuration": { "ProjectName": reference(&build.project) },
            "InputArtifacts": [{ "Name": build.input.name() }],
            "OutputArtifacts": outputs,
            "RunOrder": 1,
        }))
    }

    fn deploy_action(&self, deploy: &DeployAction) -> Result<Value> {
        if deploy.bucket != self.stack.bucket.id {
            return Err(Error::UnknownReference(format!(
                "deploy action '{}' targets bucket '{}' which is not declared",
                deploy.name, deploy.bucket
            )));
        }
        Ok(json!({
            "Name": deploy.name,
            "ActionTypeId": {
                "Category": "Deploy",
                "Owner": "AWS",
                "Provider": "S3",
                "Version": "1",
            },
            "Configuration": {
                "BucketName": reference(&deploy.bucket),
                "Extract": if deploy.extract { "true" } else { "false" },
            },
            "InputArtifacts": [{ "Name": deploy.input.name() }],
            "RunOrder": 1,
        }))
    }

    fn webhook(&mut self, pipeline: &Pipeline, source: &GitHubSource) -> Result<()> {
        let stage = pipeline
            .stages
            .first()
            .map(|s| s.name.as_str())
            .unwrap_or("Source");
        let clean: String = format!("{}{}", stage, source.action_name)
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        let id = pipeline.id.child(&format!("{}WebhookResource", clean))?;
        self.add(
            &id,
            json!({
                "Type": "AWS::CodePipeline::Webhook",
                "Properties": {
                    "Authentication": "GITHUB_HMAC",
                    "AuthenticationConfiguration": {
                        "SecretToken": source.credential.dynamic_reference(),
                    },
                    "Filters": [{ "JsonPath": "$.ref", "MatchEquals": source.branch_ref() }],
                    "TargetAction": source.action_name,
                    "TargetPipeline": reference(&pipeline.id),
                    "TargetPipelineVersion": 1,
                    "RegisterWithThirdParty": true,
                },
            }),
        )
    }

    fn outputs(&mut self) {
        let stack = self.stack;
        let bucket = &stack.bucket;
        self.outputs.insert(
            "BucketName".to_string(),
            json!({ "Description": "Site bucket", "Value": reference(&bucket.id) }),
        );
        if bucket.serves_website() && bucket.access == BucketAccess::PublicRead {
            self.outputs.insert(
                "WebsiteURL".to_string(),
                json!({
                    "Description": "Bucket website endpoint",
                    "Value": get_att(&bucket.id, "WebsiteURL"),
                }),
            );
        }
        if let Some(dist) = &stack.distribution {
            self.outputs.insert(
                "DistributionDomainName".to_string(),
                json!({
                    "Description": "Distribution domain",
                    "Value": get_att(&dist.id, "DomainName"),
                }),
            );
        }
        self.outputs.insert(
            "PipelineName".to_string(),
            json!({ "Description": "Release pipeline", "Value": reference(&stack.pipeline.id) }),
        );
    }
}

fn error_response(rule: &ErrorResponse) -> Value {
    let mut map = Map::new();
    map.insert("ErrorCode".to_string(), json!(rule.http_status));
    if let Some(path) = &rule.response_page_path {
        map.insert("ResponsePagePath".to_string(), json!(path));
    }
    if let Some(status) = rule.response_http_status {
        map.insert("ResponseCode".to_string(), json!(status));
    }
    if let Some(ttl) = rule.ttl_seconds {
        map.insert("ErrorCachingMinTTL".to_string(), json!(ttl));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revisions::Revision;

    fn template(revision: Revision) -> Template {
        synthesize(&revision.stack().unwrap()).unwrap()
    }

    #[test]
    fn test_pipeline_stages_in_order() {
        for revision in Revision::ALL {
            let t = template(revision);
            let pipeline = t.resource("ViteSitePipeline").unwrap();
            let names: Vec<&str> = pipeline["Properties"]["Stages"]
                .as_array()
                .unwrap()
                .iter()
                .map(|s| s["Name"].as_str().unwrap())
                .collect();
            assert_eq!(names, vec!["Source", "Build", "Deploy"], "{:?}", revision);
        }
    }

    #[test]
    fn test_credential_is_dynamic_reference() {
        let t = template(Revision::PrivateWithIdentity);
        let source = &t.resource("ViteSitePipeline").unwrap()["Properties"]["Stages"][0]["Actions"][0];
        assert_eq!(
            source["Configuration"]["OAuthToken"],
            "{{resolve:secretsmanager:github_token2:SecretString:::}}"
        );
    }

    #[test]
    fn test_buildspec_output_directory() {
        let t = template(Revision::PrivateWithIdentity);
        let project = t.resource("ViteSiteBuildProject").unwrap();
        let spec: Value =
            serde_json::from_str(project["Properties"]["Source"]["BuildSpec"].as_str().unwrap())
                .unwrap();
        assert_eq!(spec["artifacts"]["base-directory"], "app/dist");
        assert_eq!(spec["phases"]["install"]["runtime-versions"]["nodejs"], "20");
    }

    #[test]
    fn test_private_bucket_template() {
        let t = template(Revision::PrivateWithIdentity);
        let bucket = t.resource("ViteSiteBucket").unwrap();
        assert_eq!(bucket["DeletionPolicy"], "Delete");
        assert_eq!(
            bucket["Properties"]["PublicAccessBlockConfiguration"]["BlockPublicPolicy"],
            true
        );

        let policy = t.resource("ViteSiteBucketPolicy").unwrap();
        let statement = &policy["Properties"]["PolicyDocument"]["Statement"][0];
        assert_eq!(
            statement["Principal"]["CanonicalUser"]["Fn::GetAtt"][0],
            "OriginAccessControl"
        );
    }

    #[test]
    fn test_distribution_error_page_and_origin() {
        let t = template(Revision::PrivateWithIdentity);
        let dist = &t.resource("ViteSiteDistribution").unwrap()["Properties"]["DistributionConfig"];
        assert_eq!(dist["DefaultCacheBehavior"]["ViewerProtocolPolicy"], "allow-all");
        assert_eq!(
            dist["DefaultCacheBehavior"]["AllowedMethods"],
            json!(["GET", "HEAD", "OPTIONS"])
        );
        assert_eq!(
            dist["CustomErrorResponses"],
            json!([{ "ErrorCode": 403, "ResponsePagePath": "/error.html", "ResponseCode": 200 }])
        );
        assert_eq!(
            dist["Origins"][0]["DomainName"]["Fn::GetAtt"][0],
            "ViteSiteBucket"
        );
    }

    #[test]
    fn test_public_website_has_no_distribution() {
        let t = template(Revision::PublicWebsite);
        assert!(t.resource("ViteSiteDistribution").is_none());
        assert!(t.resource("OriginAccessControl").is_none());
        assert!(t.outputs().unwrap().contains_key("WebsiteURL"));

        let policy = t.resource("ViteSiteBucketPolicy").unwrap();
        assert_eq!(
            policy["Properties"]["PolicyDocument"]["Statement"][0]["Principal"],
            json!({ "AWS": "*" })
        );
    }

    #[test]
    fn test_no_customer_key_without_cross_account() {
        let t = template(Revision::PrivateWithIdentity);
        assert!(t.resource("ViteSitePipelineArtifactsBucketEncryptionKey").is_none());
        let artifacts = t.resource("ViteSitePipelineArtifactsBucket").unwrap();
        assert_eq!(
            artifacts["Properties"]["BucketEncryption"]["ServerSideEncryptionConfiguration"][0]
                ["ServerSideEncryptionByDefault"]["SSEAlgorithm"],
            "AES256"
        );
    }

    #[test]
    fn test_cross_account_keys_add_kms_key() {
        let mut stack = Revision::PrivateWithIdentity.stack().unwrap();
        stack.pipeline.cross_account_keys = true;
        let t = synthesize(&stack).unwrap();
        assert_eq!(
            t.resource_type("ViteSitePipelineArtifactsBucketEncryptionKey"),
            Some("AWS::KMS::Key")
        );
        assert_eq!(
            t.resource_type("ViteSitePipelineArtifactsBucketEncryptionKeyAlias"),
            Some("AWS::KMS::Alias")
        );
    }

    #[test]
    fn test_webhook_filters_branch() {
        let t = template(Revision::PrivateWithIdentity);
        let hook = t
            .resource("ViteSitePipelineSourceGithubSourceWebhookResource")
            .unwrap();
        assert_eq!(
            hook["Properties"]["Filters"][0]["MatchEquals"],
            "refs/heads/master"
        );
    }

    #[test]
    fn test_digest_is_stable() {
        let a = template(Revision::PublicWebsite);
        let b = template(Revision::PublicWebsite);
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), template(Revision::PrivateWithIdentity).digest());
    }

    #[test]
    fn test_digest_ignores_key_order() {
        let a = Template::from_value(json!({ "Resources": { "A": { "Type": "T", "X": 1 } } })).unwrap();
        let b = Template::from_value(json!({ "Resources": { "A": { "X": 1, "Type": "T" } } })).unwrap();
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_dependency_order_leaves_first() {
        let t = template(Revision::PrivateWithIdentity);
        let order = t.dependency_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

        assert!(pos("ViteSiteBuildProjectRole") < pos("ViteSiteBuildProject"));
        assert!(pos("ViteSiteBuildProject") < pos("ViteSitePipeline"));
        assert!(pos("OriginAccessControl") < pos("ViteSiteDistribution"));
        assert!(pos("ViteSiteBucket") < pos("ViteSiteDistribution"));
        assert!(pos("ViteSiteBucket") < pos("ViteSitePipeline"));
        assert!(pos("ViteSitePipeline") < pos("ViteSitePipelineSourceGithubSourceWebhookResource"));
        assert_eq!(order.len(), t.resources().len());
    }

    #[test]
    fn test_dependency_cycle_detected() {
        let t = Template::from_value(json!({
            "Resources": {
                "A": { "Type": "T", "Properties": { "X": { "Ref": "B" } } },
                "B": { "Type": "T", "DependsOn": "A" },
            }
        }))
        .unwrap();
        assert!(matches!(
            t.dependency_order().unwrap_err(),
            Error::DependencyCycle(_)
        ));
    }

    #[test]
    fn test_pseudo_parameters_ignored() {
        let t = Template::from_value(json!({
            "Resources": {
                "A": { "Type": "T", "Properties": { "R": { "Ref": "AWS::Region" } } },
            }
        }))
        .unwrap();
        assert!(t.dependencies("A").is_empty());
    }

    #[test]
    fn test_undeclared_deploy_bucket_rejected() {
        let mut stack = Revision::PublicWebsite.stack().unwrap();
        for stage in &mut stack.pipeline.stages {
            for action in &mut stage.actions {
                if let Action::Deploy(deploy) = action {
                    deploy.bucket = LogicalId::new("OtherBucket").unwrap();
                }
            }
        }
        assert!(matches!(
            synthesize(&stack).unwrap_err(),
            Error::UnknownReference(_)
        ));
    }

    #[test]
    fn test_checked_synthesis_refuses_legacy_revision() {
        let stack = Revision::LegacyAnyPrincipal.stack().unwrap();
        assert!(matches!(
            synthesize_checked(&stack, false).unwrap_err(),
            Error::Validation(_)
        ));
        let (template, findings) = synthesize_checked(&stack, true).unwrap();
        assert!(findings.has_errors());
        assert!(template.resource("ViteStiteBucket").is_some());
    }
}
