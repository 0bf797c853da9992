//! Resource graph and access policy checks.
//!
//! Validation never changes the stack. Inconsistencies are reported as
//! [`Finding`]s so the author decides how to reconcile them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::ViewerProtocolPolicy;
use crate::pipeline::ActionKind;
use crate::stack::SiteStack;
use crate::storage::{BucketAccess, RemovalPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Stable code, e.g. `identity-gating-defeated`.
    pub code: &'static str,
    pub severity: Severity,
    /// Logical id or pipeline element the finding is about.
    pub subject: String,
    pub message: String,
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] {}: {}",
            self.severity, self.code, self.subject, self.message
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Findings(Vec<Finding>);

impl Findings {
    fn push(
        &mut self,
        code: &'static str,
        severity: Severity,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.0.push(Finding {
            code,
            severity,
            subject: subject.into(),
            message: message.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.0.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.0.iter().any(|f| f.code == code)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Findings {
    type Item = Finding;
    type IntoIter = std::vec::IntoIter<Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Run every check against the stack.
pub fn validate(stack: &SiteStack) -> Findings {
    let mut findings = Findings::default();

    check_stage_layout(stack, &mut findings);
    check_build_output(stack, &mut findings);
    check_bucket_access(stack, &mut findings);
    check_distribution(stack, &mut findings);

    debug!(
        stack = %stack.name,
        findings = findings.len(),
        errors = findings.errors().count(),
        "Validated stack"
    );
    findings
}

fn check_stage_layout(stack: &SiteStack, findings: &mut Findings) {
    let pipeline = &stack.pipeline;
    let expected = [ActionKind::Source, ActionKind::Build, ActionKind::Deploy];

    let layout: Vec<Option<ActionKind>> = pipeline
        .stages
        .iter()
        .map(|stage| {
            let first = stage.actions.first().map(|a| a.kind());
            if stage.actions.iter().all(|a| Some(a.kind()) == first) {
                first
            } else {
                None
            }
        })
        .collect();

    let matches = layout.len() == expected.len()
        && layout.iter().zip(expected).all(|(got, want)| *got == Some(want));
    if !matches {
        findings.push(
            "pipeline-stage-order",
            Severity::Error,
            &pipeline.name,
            format!(
                "expected exactly three stages Source, Build, Deploy; found [{}]",
                pipeline.stage_names().join(", ")
            ),
        );
    }

    if let Err(e) = pipeline.check_artifacts() {
        findings.push("artifact-contract", Severity::Error, &pipeline.name, e.to_string());
    }

    for build in pipeline.build_actions() {
        if build.project != stack.build.id {
            findings.push(
                "build-project-reference",
                Severity::Error,
                &build.name,
                format!(
                    "runs project '{}' but the stack declares '{}'",
                    build.project, stack.build.id
                ),
            );
        }
    }
}

fn check_build_output(stack: &SiteStack, findings: &mut Findings) {
    let project = &stack.build;
    if !project.output_matches_toolchain() {
        findings.push(
            "build-output-mismatch",
            Severity::Error,
            project.id.as_str(),
            format!(
                "artifact base directory '{}' does not match toolchain output '{}'; the deploy stage would upload the wrong content",
                project.spec.artifacts.base_directory,
                project.toolchain.output_path()
            ),
        );
    }
}

fn check_bucket_access(stack: &SiteStack, findings: &mut Findings) {
    let bucket = &stack.bucket;
    let identity = stack
        .distribution
        .as_ref()
        .and_then(|d| d.origin.identity.as_ref());
    let policy = bucket.effective_policy(identity);
    let subject = bucket.id.as_str();

    match bucket.access {
        BucketAccess::PublicRead => {
            let restricted = bucket
                .extra_statements
                .iter()
                .any(|s| s.grants_read() && !s.principal.is_any());
            if restricted || identity.is_some() {
                findings.push(
                    "contradictory-bucket-access",
                    Severity::Error,
                    subject,
                    "bucket is public-read but a policy also restricts reads to a single principal; choose one access strategy",
                );
            }
            if !bucket.serves_website() && stack.distribution.is_none() {
                findings.push(
                    "public-read-without-website",
                    Severity::Warning,
                    subject,
                    "public bucket has no index document and no distribution; only direct object URLs will work",
                );
            }
        }
        BucketAccess::PrivateWithIdentity => {
            if policy.iter().any(|s| s.grants_read() && s.principal.is_any()) {
                findings.push(
                    "identity-gating-defeated",
                    Severity::Error,
                    subject,
                    "bucket is meant to be readable only through the access identity, but its policy grants s3:GetObject to any principal",
                );
            }
            match &stack.distribution {
                None => findings.push(
                    "private-bucket-without-identity",
                    Severity::Error,
                    subject,
                    "private bucket has no distribution in front of it; site content is unreachable",
                ),
                Some(dist) if dist.origin.identity.is_none() => findings.push(
                    "private-bucket-without-identity",
                    Severity::Error,
                    dist.id.as_str(),
                    "distribution reads a private bucket without an origin access identity",
                ),
                Some(_) => {}
            }
        }
    }

    if bucket.removal == RemovalPolicy::Retain {
        findings.push(
            "retained-bucket",
            Severity::Info,
            subject,
            "bucket is retained on teardown and will be orphaned from the stack",
        );
    }
}

fn check_distribution(stack: &SiteStack, findings: &mut Findings) {
    for deploy in stack.pipeline.deploy_actions() {
        if deploy.bucket != stack.bucket.id {
            findings.push(
                "distribution-origin-mismatch",
                Severity::Error,
                &deploy.name,
                format!(
                    "deploys to '{}' but the stack's bucket is '{}'",
                    deploy.bucket, stack.bucket.id
                ),
            );
        }
    }

    let Some(dist) = &stack.distribution else {
        return;
    };
    let subject = dist.id.as_str();

    for deploy in stack.pipeline.deploy_actions() {
        if deploy.bucket != dist.origin.bucket {
            findings.push(
                "distribution-origin-mismatch",
                Severity::Error,
                subject,
                format!(
                    "origin bucket '{}' differs from deploy target '{}'",
                    dist.origin.bucket, deploy.bucket
                ),
            );
        }
    }

    for rule in &dist.error_responses {
        let has_path = rule
            .response_page_path
            .as_deref()
            .is_some_and(|p| p.starts_with('/'));
        if rule.http_status == 403 && (!has_path || rule.response_http_status != Some(200)) {
            findings.push(
                "error-response-mapping",
                Severity::Error,
                subject,
                "403 responses must map to a replacement page served with status 200",
            );
        } else if rule.response_http_status.is_some() && !has_path {
            findings.push(
                "error-response-mapping",
                Severity::Error,
                subject,
                format!(
                    "error response for {} sets a status but no replacement page",
                    rule.http_status
                ),
            );
        }
    }

    if dist.viewer_protocol == ViewerProtocolPolicy::AllowAll {
        findings.push(
            "viewer-protocol-allow-all",
            Severity::Warning,
            subject,
            "viewers may connect over unencrypted HTTP; confirm this with stakeholders",
        );
    }
}
