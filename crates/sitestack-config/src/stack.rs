//! Stack definition parsing.
//!
//! A definition declares the stack, its source, build project, bucket,
//! optional distribution and pipeline:
//!
//! ```kdl
//! stack "InfraStack"
//!
//! source {
//!     owner "mactunechy"
//!     repo "cdk-s3-static-site-hosting"
//!     branch "master"
//!     token secret="github_token2"
//! }
//!
//! build "ViteSiteBuildProject" {
//!     runtime "nodejs" "20"
//! }
//!
//! bucket "ViteSiteBucket" {
//!     access "private-with-identity"
//!     removal "destroy"
//! }
//!
//! distribution "ViteSiteDistribution" {
//!     identity "OriginAccessControl" comment="Vite site"
//!     error-page 403 "/error.html"
//! }
//!
//! pipeline "ViteSitePipeline"
//! ```

use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::Path;
use tracing::debug;

use sitestack_core::LogicalId;
use sitestack_core::build::{
    BuildImage, BuildProject, ComputeType, PackageManager, Runtime, RuntimeLanguage, Toolchain,
};
use sitestack_core::distribution::{
    AllowedMethods, Distribution, Origin, OriginAccessIdentity, PriceClass, ViewerProtocolPolicy,
};
use sitestack_core::pipeline::Pipeline;
use sitestack_core::secret::SecretRef;
use sitestack_core::source::{GitHubSource, SourceTrigger};
use sitestack_core::stack::{SiteStack, StackEnv};
use sitestack_core::storage::{Bucket, BucketAccess, PolicyStatement, Principal, RemovalPolicy};

use crate::variables::VariableContext;
use crate::{ConfigError, ConfigResult};

/// Parse a stack definition from KDL text without interpolation.
pub fn parse_stack(kdl: &str) -> ConfigResult<SiteStack> {
    parse_stack_with(kdl, &VariableContext::new())
}

/// Parse a definition and interpolate `${...}` variables in its string
/// values.
///
/// The document is parsed before any variable is resolved, so a value can
/// never add nodes or properties. The `stack` node's name, region and
/// account fill `${stack.*}` unless the context already sets them.
pub fn parse_stack_with(kdl: &str, ctx: &VariableContext) -> ConfigResult<SiteStack> {
    let secrets = ctx.find_secrets_in_string(kdl);
    if !secrets.is_empty() {
        return Err(ConfigError::PlaintextSecret(format!(
            "'${{{}}}' would embed a secret value; reference it with `token secret=\"<name>\"`",
            secrets[0]
        )));
    }

    let mut doc: KdlDocument = kdl.parse()?;
    let mut ctx = ctx.clone();
    if ctx.stack.name.is_empty() {
        if let Some(node) = doc.nodes().iter().find(|n| n.name().value() == "stack") {
            ctx.stack.name = get_first_string_arg(node).unwrap_or_default();
            for child in children(node) {
                match child.name().value() {
                    "region" if ctx.stack.region.is_none() => {
                        ctx.stack.region = get_first_string_arg(child);
                    }
                    "account" if ctx.stack.account.is_none() => {
                        ctx.stack.account = get_first_string_arg(child);
                    }
                    _ => {}
                }
            }
        }
    }

    interpolate_document(&mut doc, &ctx);
    let stack = StackDefinition::collect(&doc)?.into_stack()?;
    debug!(
        stack = %stack.name,
        bucket = %stack.bucket.id,
        distribution = stack.distribution.is_some(),
        "Parsed stack definition"
    );
    Ok(stack)
}

/// Rewrite every string argument and property in place.
fn interpolate_document(doc: &mut KdlDocument, ctx: &VariableContext) {
    for node in doc.nodes_mut() {
        for entry in node.entries_mut() {
            if let KdlValue::String(value) = entry.value_mut() {
                *value = ctx.interpolate(value);
            }
        }
        if let Some(children) = node.children_mut() {
            interpolate_document(children, ctx);
        }
    }
}

/// Read and parse a definition file.
pub fn load_stack(path: impl AsRef<Path>, ctx: &VariableContext) -> ConfigResult<SiteStack> {
    let text = std::fs::read_to_string(path)?;
    parse_stack_with(&text, ctx)
}

/// Top-level nodes of a definition, each at most once.
#[derive(Default)]
struct StackDefinition<'a> {
    stack: Option<&'a KdlNode>,
    source: Option<&'a KdlNode>,
    build: Option<&'a KdlNode>,
    bucket: Option<&'a KdlNode>,
    distribution: Option<&'a KdlNode>,
    pipeline: Option<&'a KdlNode>,
}

impl<'a> StackDefinition<'a> {
    fn collect(doc: &'a KdlDocument) -> ConfigResult<Self> {
        let mut def = Self::default();
        for node in doc.nodes() {
            let name = node.name().value();
            let slot = match name {
                "stack" => &mut def.stack,
                "source" => &mut def.source,
                "build" => &mut def.build,
                "bucket" => &mut def.bucket,
                "distribution" => &mut def.distribution,
                "pipeline" => &mut def.pipeline,
                other => return Err(ConfigError::UnknownNode(other.to_string())),
            };
            if slot.replace(node).is_some() {
                return Err(ConfigError::Duplicate(format!("'{}' node", name)));
            }
        }
        Ok(def)
    }

    fn into_stack(self) -> ConfigResult<SiteStack> {
        let stack_node = required(self.stack, "stack")?;
        let name = get_first_string_arg(stack_node)
            .ok_or_else(|| ConfigError::MissingField("stack name".to_string()))?;

        let build = parse_build(required(self.build, "build")?)?;
        let bucket = parse_bucket(required(self.bucket, "bucket")?)?;
        let distribution = self
            .distribution
            .map(|node| parse_distribution(node, &bucket))
            .transpose()?;
        let source = parse_source(required(self.source, "source")?)?;
        let pipeline = parse_pipeline(required(self.pipeline, "pipeline")?, source, &build, &bucket)?;

        let mut stack = SiteStack::new(name, build, bucket, distribution, pipeline)?;
        let mut env = StackEnv::default();
        for child in children(stack_node) {
            match child.name().value() {
                "description" => {
                    stack = stack.with_description(required_arg(child, "stack description")?);
                }
                "region" => env.region = Some(required_arg(child, "stack region")?),
                "account" => env.account = Some(required_arg(child, "stack account")?),
                other => return Err(unknown_child("stack", other)),
            }
        }
        Ok(stack.with_env(env))
    }
}

fn parse_source(node: &KdlNode) -> ConfigResult<GitHubSource> {
    let mut owner = None;
    let mut repo = None;
    let mut branch = None;
    let mut credential = None;
    let mut trigger = SourceTrigger::default();

    for child in children(node) {
        match child.name().value() {
            "owner" => owner = Some(required_arg(child, "source owner")?),
            "repo" => repo = Some(required_arg(child, "source repo")?),
            "branch" => branch = Some(required_arg(child, "source branch")?),
            "token" => credential = Some(parse_token(child)?),
            "trigger" => {
                trigger = required_arg(child, "source trigger")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("source trigger", e))?;
            }
            other => return Err(unknown_child("source", other)),
        }
    }

    let owner = owner.ok_or_else(|| ConfigError::MissingField("source owner".to_string()))?;
    let repo = repo.ok_or_else(|| ConfigError::MissingField("source repo".to_string()))?;
    let branch = branch.ok_or_else(|| ConfigError::MissingField("source branch".to_string()))?;
    let credential =
        credential.ok_or_else(|| ConfigError::MissingField("source token".to_string()))?;

    let mut source = GitHubSource::new(owner, repo, branch, credential)?.with_trigger(trigger);
    if let Some(action_name) = get_first_string_arg(node) {
        source = source.with_action_name(action_name)?;
    }
    Ok(source)
}

/// `token secret="<name>" field="<json key>"`. A bare argument would be the
/// token itself and is refused.
fn parse_token(node: &KdlNode) -> ConfigResult<SecretRef> {
    if get_first_string_arg(node).is_some() {
        return Err(ConfigError::PlaintextSecret(
            "source token must be a secret reference: token secret=\"<name>\"".to_string(),
        ));
    }
    let name = get_string_prop(node, "secret")
        .ok_or_else(|| ConfigError::MissingField("source token secret".to_string()))?;
    let mut secret = SecretRef::secrets_manager(name)?;
    if let Some(field) = get_string_prop(node, "field") {
        secret = secret.with_json_field(field);
    }
    Ok(secret)
}

fn parse_build(node: &KdlNode) -> ConfigResult<BuildProject> {
    let id = logical_id(node, "build")?;
    let mut runtime = None;
    let mut image = BuildImage::default();
    let mut compute = ComputeType::default();
    let mut toolchain = Toolchain::default();
    let mut timeout = None;

    for child in children(node) {
        match child.name().value() {
            "runtime" => {
                let args = get_all_string_args(child);
                let [language, version] = args.as_slice() else {
                    return Err(ConfigError::invalid(
                        "build runtime",
                        "expected a language and a version, e.g. runtime \"nodejs\" \"20\"",
                    ));
                };
                let language: RuntimeLanguage = language
                    .parse()
                    .map_err(|e| ConfigError::invalid("build runtime", e))?;
                runtime = Some(
                    Runtime::new(language, version)
                        .map_err(|e| ConfigError::invalid("build runtime", e))?,
                );
            }
            "image" => {
                image = required_arg(child, "build image")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("build image", e))?;
            }
            "compute" => {
                compute = required_arg(child, "build compute")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("build compute", e))?;
            }
            "package-manager" => {
                toolchain.package_manager = required_arg(child, "build package-manager")?
                    .parse::<PackageManager>()
                    .map_err(|e| ConfigError::invalid("build package-manager", e))?;
            }
            "app-dir" => toolchain.app_dir = required_arg(child, "build app-dir")?,
            "output-dir" => toolchain.output_dir = required_arg(child, "build output-dir")?,
            "timeout" => {
                let minutes = get_first_int_arg(child)
                    .and_then(|m| u16::try_from(m).ok())
                    .ok_or_else(|| ConfigError::invalid("build timeout", "expected minutes"))?;
                timeout = Some(minutes);
            }
            other => return Err(unknown_child("build", other)),
        }
    }

    let runtime = runtime.ok_or_else(|| ConfigError::MissingField("build runtime".to_string()))?;
    let mut project = BuildProject::new(id, toolchain, runtime).with_image(image);
    project.compute = compute;
    if let Some(minutes) = timeout {
        project = project
            .with_timeout(minutes)
            .map_err(|e| ConfigError::invalid("build timeout", e))?;
    }
    Ok(project)
}

fn parse_bucket(node: &KdlNode) -> ConfigResult<Bucket> {
    let id = logical_id(node, "bucket")?;
    let mut access = None;
    let mut removal = RemovalPolicy::default();
    let mut index_document = Some("index.html".to_string());
    let mut error_document = None;
    let mut statements = Vec::new();

    for child in children(node) {
        match child.name().value() {
            "access" => {
                access = Some(
                    required_arg(child, "bucket access")?
                        .parse::<BucketAccess>()
                        .map_err(|e| ConfigError::invalid("bucket access", e))?,
                );
            }
            "removal" => {
                removal = required_arg(child, "bucket removal")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("bucket removal", e))?;
            }
            "index-document" => {
                // `index-document #null` turns the website endpoint off.
                index_document = get_first_string_arg(child);
            }
            "error-document" => error_document = Some(required_arg(child, "bucket error-document")?),
            "allow-read" => {
                statements.push(PolicyStatement::allow_get_object(parse_principal(child)?));
            }
            other => return Err(unknown_child("bucket", other)),
        }
    }

    let access = access.ok_or_else(|| ConfigError::MissingField("bucket access".to_string()))?;
    let mut bucket = Bucket::new(id, access).with_removal(removal);
    bucket.index_document = index_document;
    bucket.error_document = error_document;
    for statement in statements {
        bucket.add_to_resource_policy(statement);
    }
    Ok(bucket)
}

/// `allow-read "*"`, `allow-read identity="<id>"`, `allow-read service="<name>"`
/// or `allow-read aws="<arn>"`.
fn parse_principal(node: &KdlNode) -> ConfigResult<Principal> {
    if let Some(arg) = get_first_string_arg(node) {
        return match arg.as_str() {
            "*" => Ok(Principal::Any),
            other => Err(ConfigError::invalid(
                "bucket allow-read",
                format!("unknown principal '{}'", other),
            )),
        };
    }
    if let Some(id) = get_string_prop(node, "identity") {
        return Ok(Principal::OriginAccessIdentity(LogicalId::new(id)?));
    }
    if let Some(service) = get_string_prop(node, "service") {
        return Ok(Principal::Service(service));
    }
    if let Some(arn) = get_string_prop(node, "aws") {
        return Ok(Principal::Aws(arn));
    }
    Err(ConfigError::MissingField("bucket allow-read principal".to_string()))
}

fn parse_distribution(node: &KdlNode, bucket: &Bucket) -> ConfigResult<Distribution> {
    let id = logical_id(node, "distribution")?;
    if let Some(origin) = get_string_prop(node, "origin") {
        if origin != bucket.id.as_str() {
            return Err(ConfigError::InvalidReference(format!(
                "distribution '{}' origin '{}' is not the declared bucket '{}'",
                id, origin, bucket.id
            )));
        }
    }

    let mut identity = None;
    let mut error_pages = Vec::new();
    let mut viewer_protocol = ViewerProtocolPolicy::default();
    let mut allowed_methods = AllowedMethods::default();
    let mut price_class = PriceClass::default();
    let mut default_root_object = None;

    for child in children(node) {
        match child.name().value() {
            "identity" => {
                let oai_id = LogicalId::new(required_arg(child, "distribution identity")?)?;
                let comment = get_string_prop(child, "comment")
                    .unwrap_or_else(|| format!("Identity for {}", id));
                identity = Some(OriginAccessIdentity::new(oai_id, comment));
            }
            "viewer-protocol" => {
                viewer_protocol = required_arg(child, "distribution viewer-protocol")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("distribution viewer-protocol", e))?;
            }
            "allowed-methods" => {
                allowed_methods = required_arg(child, "distribution allowed-methods")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("distribution allowed-methods", e))?;
            }
            "price-class" => {
                price_class = required_arg(child, "distribution price-class")?
                    .parse()
                    .map_err(|e| ConfigError::invalid("distribution price-class", e))?;
            }
            "default-root-object" => {
                default_root_object = Some(required_arg(child, "distribution default-root-object")?);
            }
            "error-page" => {
                let status = get_first_int_arg(child)
                    .and_then(|s| u16::try_from(s).ok())
                    .ok_or_else(|| ConfigError::invalid("distribution error-page", "expected a status code"))?;
                let page = get_all_string_args(child)
                    .into_iter()
                    .next()
                    .ok_or_else(|| ConfigError::MissingField("distribution error-page path".to_string()))?;
                error_pages.push((status, page));
            }
            other => return Err(unknown_child("distribution", other)),
        }
    }

    let mut distribution = Distribution::new(
        id,
        Origin {
            bucket: bucket.id.clone(),
            identity,
        },
    );
    distribution.viewer_protocol = viewer_protocol;
    distribution.allowed_methods = allowed_methods;
    distribution.price_class = price_class;
    distribution.default_root_object = default_root_object;
    for (status, page) in error_pages {
        distribution = distribution
            .soft_error_page(status, page)
            .map_err(|e| ConfigError::invalid("distribution error-page", e))?;
    }
    Ok(distribution)
}

fn parse_pipeline(
    node: &KdlNode,
    source: GitHubSource,
    build: &BuildProject,
    bucket: &Bucket,
) -> ConfigResult<Pipeline> {
    let id = logical_id(node, "pipeline")?;
    let mut name = id.to_string();
    let mut cross_account_keys = false;
    let mut restart_on_update = false;

    for child in children(node) {
        match child.name().value() {
            "name" => name = required_arg(child, "pipeline name")?,
            "cross-account-keys" => cross_account_keys = required_bool(child, "pipeline cross-account-keys")?,
            "restart-on-update" => restart_on_update = required_bool(child, "pipeline restart-on-update")?,
            other => return Err(unknown_child("pipeline", other)),
        }
    }

    let mut pipeline = Pipeline::source_build_deploy(id, name, source, build, bucket)?
        .with_cross_account_keys(cross_account_keys);
    pipeline.restart_on_update = restart_on_update;
    Ok(pipeline)
}

// Helper functions for extracting values from KDL nodes

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn required<'a>(node: Option<&'a KdlNode>, name: &str) -> ConfigResult<&'a KdlNode> {
    node.ok_or_else(|| ConfigError::MissingField(format!("'{}' node", name)))
}

fn unknown_child(parent: &str, child: &str) -> ConfigError {
    ConfigError::UnknownNode(format!("{}.{}", parent, child))
}

fn logical_id(node: &KdlNode, what: &str) -> ConfigResult<LogicalId> {
    let id = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField(format!("{} logical id", what)))?;
    Ok(LogicalId::new(id)?)
}

fn required_arg(node: &KdlNode, field: &str) -> ConfigResult<String> {
    get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))
}

fn required_bool(node: &KdlNode, field: &str) -> ConfigResult<bool> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
        .ok_or_else(|| ConfigError::invalid(field, "expected #true or #false"))
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_int_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::VariableContextBuilder;
    use sitestack_core::Revision;

    const PRIVATE_SITE: &str = r#"
        stack "InfraStack"

        source {
            owner "mactunechy"
            repo "cdk-s3-static-site-hosting"
            branch "master"
            token secret="github_token2"
        }

        build "ViteSiteBuildProject" {
            runtime "nodejs" "20"
            image "amazon-linux-2-5"
        }

        bucket "ViteSiteBucket" {
            access "private-with-identity"
            removal "destroy"
        }

        distribution "ViteSiteDistribution" origin="ViteSiteBucket" {
            identity "OriginAccessControl" comment="Vite site"
            error-page 403 "/error.html"
        }

        pipeline "ViteSitePipeline" {
            cross-account-keys #false
        }
    "#;

    #[test]
    fn test_parse_matches_builtin_revision() {
        let parsed = parse_stack(PRIVATE_SITE).unwrap();
        let builtin = Revision::PrivateWithIdentity.stack().unwrap();
        assert_eq!(parsed, builtin);
    }

    #[test]
    fn test_sample_definition_is_valid() {
        let stack = parse_stack(include_str!("../../../site.kdl")).unwrap();
        assert_eq!(stack.description.as_deref(), Some("Vite site hosting"));
        assert!(!sitestack_core::validate(&stack).has_errors());
    }

    #[test]
    fn test_parse_public_site() {
        let kdl = r#"
            stack "SiteStack" {
                region "eu-west-1"
            }
            source "Checkout" {
                owner "acme"
                repo "site"
                branch "main"
                token secret="github" field="token"
                trigger "poll"
            }
            build "SiteBuild" {
                runtime "node" "22"
                package-manager "npm"
                output-dir "build"
                timeout 30
            }
            bucket "SiteBucket" {
                access "public-read"
            }
            pipeline "SitePipeline" {
                name "site-${stack.region}"
            }
        "#;

        let stack = parse_stack(kdl).unwrap();
        assert_eq!(stack.env.region.as_deref(), Some("eu-west-1"));
        assert_eq!(stack.pipeline.name, "site-eu-west-1");
        assert!(stack.distribution.is_none());
        assert_eq!(stack.bucket.removal, RemovalPolicy::Retain);
        assert_eq!(stack.build.toolchain.output_path(), "app/build");
        assert_eq!(stack.build.timeout_minutes, Some(30));

        let source = stack.pipeline.source().unwrap();
        assert_eq!(source.action_name, "Checkout");
        assert_eq!(source.trigger, SourceTrigger::Poll);
        assert_eq!(source.credential.json_field.as_deref(), Some("token"));
    }

    #[test]
    fn test_latest_runtime_rejected() {
        let kdl = PRIVATE_SITE.replace(r#"runtime "nodejs" "20""#, r#"runtime "nodejs" "latest""#);
        let err = parse_stack(&kdl).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_secret_interpolation_rejected() {
        let kdl = PRIVATE_SITE.replace("branch \"master\"", "branch \"${secrets.BRANCH}\"");
        let err = parse_stack(&kdl).unwrap_err();
        assert!(matches!(err, ConfigError::PlaintextSecret(_)));
    }

    #[test]
    fn test_plaintext_token_rejected() {
        let kdl = PRIVATE_SITE.replace(r#"token secret="github_token2""#, r#"token "ghp_123""#);
        let err = parse_stack(&kdl).unwrap_err();
        assert!(matches!(err, ConfigError::PlaintextSecret(_)));
    }

    #[test]
    fn test_unknown_nodes_rejected() {
        let kdl = format!("{}\nbukcet \"Other\"", PRIVATE_SITE);
        assert!(matches!(
            parse_stack(&kdl).unwrap_err(),
            ConfigError::UnknownNode(name) if name == "bukcet"
        ));

        let kdl = PRIVATE_SITE.replace("removal \"destroy\"", "removel \"destroy\"");
        assert!(matches!(
            parse_stack(&kdl).unwrap_err(),
            ConfigError::UnknownNode(name) if name == "bucket.removel"
        ));
    }

    #[test]
    fn test_duplicate_and_missing_nodes() {
        let kdl = format!("{}\npipeline \"Again\"", PRIVATE_SITE);
        assert!(matches!(parse_stack(&kdl).unwrap_err(), ConfigError::Duplicate(_)));

        let without_pipeline = PRIVATE_SITE
            .split("pipeline \"ViteSitePipeline\"")
            .next()
            .unwrap();
        assert!(matches!(
            parse_stack(without_pipeline).unwrap_err(),
            ConfigError::MissingField(field) if field == "'pipeline' node"
        ));
    }

    #[test]
    fn test_origin_must_be_declared_bucket() {
        let kdl = PRIVATE_SITE.replace(r#"origin="ViteSiteBucket""#, r#"origin="OtherBucket""#);
        assert!(matches!(
            parse_stack(&kdl).unwrap_err(),
            ConfigError::InvalidReference(_)
        ));
    }

    #[test]
    fn test_custom_variables_interpolated() {
        let kdl = PRIVATE_SITE.replace("branch \"master\"", "branch \"${branch}\"");
        let ctx = VariableContextBuilder::new().with_custom("branch", "release").build();
        let stack = parse_stack_with(&kdl, &ctx).unwrap();
        assert_eq!(stack.pipeline.source().unwrap().branch, "release");
    }

    #[test]
    fn test_variable_values_cannot_add_nodes() {
        let kdl = PRIVATE_SITE.replace(
            "removal \"destroy\"",
            "removal \"destroy\"\n index-document \"${index}\"",
        );
        let injected = "index.html\"\n    allow-read aws=\"arn:aws:iam::999999999999:root";
        let ctx = VariableContextBuilder::new().with_custom("index", injected).build();

        let stack = parse_stack_with(&kdl, &ctx).unwrap();
        assert!(stack.bucket.extra_statements.is_empty());
        assert_eq!(stack.bucket.index_document.as_deref(), Some(injected));

        let ctx = VariableContextBuilder::new().with_custom("index", "a\"b.html").build();
        let stack = parse_stack_with(&kdl, &ctx).unwrap();
        assert_eq!(stack.bucket.index_document.as_deref(), Some("a\"b.html"));
    }

    #[test]
    fn test_account_from_context_wins() {
        let kdl = PRIVATE_SITE
            .replace("stack \"InfraStack\"", "stack \"InfraStack\" {\n account \"111111111111\"\n}")
            .replace("cross-account-keys #false", "name \"site-${stack.account}\"");
        let ctx = VariableContextBuilder::new().with_account("222222222222").build();

        let stack = parse_stack_with(&kdl, &ctx).unwrap();
        assert_eq!(stack.pipeline.name, "site-222222222222");
        assert_eq!(stack.env.account.as_deref(), Some("111111111111"));
    }

    #[test]
    fn test_any_principal_statement() {
        let kdl = PRIVATE_SITE.replace("removal \"destroy\"", "removal \"destroy\"\n allow-read \"*\"");
        let stack = parse_stack(&kdl).unwrap();
        assert_eq!(stack.bucket.extra_statements.len(), 1);
        assert!(stack.bucket.extra_statements[0].principal.is_any());
    }
}
