//! Built-in revisions of the site stack.
//!
//! Each revision is the same Source → Build → Deploy pipeline with a
//! different bucket access configuration.

use serde::{Deserialize, Serialize};

use crate::build::{BuildImage, BuildProject, Runtime, RuntimeLanguage, Toolchain};
use crate::distribution::{Distribution, Origin, OriginAccessIdentity};
use crate::pipeline::Pipeline;
use crate::secret::SecretRef;
use crate::source::GitHubSource;
use crate::stack::SiteStack;
use crate::storage::{Bucket, BucketAccess, PolicyStatement, Principal, RemovalPolicy};
use crate::{Error, LogicalId, Result};

pub const STACK_NAME: &str = "InfraStack";
pub const REPO_OWNER: &str = "mactunechy";
pub const REPO_NAME: &str = "cdk-s3-static-site-hosting";
pub const REPO_BRANCH: &str = "master";
pub const TOKEN_SECRET: &str = "github_token2";
pub const NODE_VERSION: &str = "20";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Revision {
    /// Private bucket read by the distribution through an access identity.
    PrivateWithIdentity,
    /// Public-read bucket served from its website endpoint, no distribution.
    PublicWebsite,
    /// Identity-gated distribution whose bucket policy also grants reads to
    /// any principal. Kept to reproduce existing deployments; fails validation.
    LegacyAnyPrincipal,
}

impl Revision {
    pub const ALL: [Revision; 3] = [
        Revision::PrivateWithIdentity,
        Revision::PublicWebsite,
        Revision::LegacyAnyPrincipal,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Revision::PrivateWithIdentity => "private-with-identity",
            Revision::PublicWebsite => "public-website",
            Revision::LegacyAnyPrincipal => "legacy-any-principal",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            Revision::PrivateWithIdentity => {
                "private bucket, origin access identity, distribution with 403 -> /error.html"
            }
            Revision::PublicWebsite => "public-read website bucket, no distribution, bucket retained",
            Revision::LegacyAnyPrincipal => {
                "identity-gated distribution plus any-principal bucket policy (inconsistent)"
            }
        }
    }

    pub fn stack(&self) -> Result<SiteStack> {
        let bucket_id = match self {
            // Historical logical id; renaming it would replace the bucket.
            Revision::LegacyAnyPrincipal => LogicalId::new("ViteStiteBucket")?,
            _ => LogicalId::new("ViteSiteBucket")?,
        };

        let runtime = match self {
            Revision::LegacyAnyPrincipal => Runtime::new(RuntimeLanguage::NodeJs, "18")?,
            _ => Runtime::new(RuntimeLanguage::NodeJs, NODE_VERSION)?,
        };
        let build = BuildProject::new(
            LogicalId::new("ViteSiteBuildProject")?,
            Toolchain::default(),
            runtime,
        )
        .with_image(BuildImage::AmazonLinux2_5);

        let (bucket, distribution) = match self {
            Revision::PrivateWithIdentity => {
                let bucket = Bucket::new(bucket_id, BucketAccess::PrivateWithIdentity)
                    .with_removal(RemovalPolicy::Destroy);
                let distribution = site_distribution(&bucket)?;
                (bucket, Some(distribution))
            }
            Revision::PublicWebsite => (Bucket::new(bucket_id, BucketAccess::PublicRead), None),
            Revision::LegacyAnyPrincipal => {
                let mut bucket = Bucket::new(bucket_id, BucketAccess::PrivateWithIdentity)
                    .with_removal(RemovalPolicy::Destroy);
                bucket.add_to_resource_policy(PolicyStatement::allow_get_object(Principal::Any));
                let distribution = site_distribution(&bucket)?;
                (bucket, Some(distribution))
            }
        };

        let pipeline = site_pipeline(&build, &bucket)?;
        SiteStack::new(STACK_NAME, build, bucket, distribution, pipeline)
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Revision::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown revision: {}", s)))
    }
}

fn site_distribution(bucket: &Bucket) -> Result<Distribution> {
    let identity = OriginAccessIdentity::new(LogicalId::new("OriginAccessControl")?, "Vite site");
    Distribution::new(
        LogicalId::new("ViteSiteDistribution")?,
        Origin {
            bucket: bucket.id.clone(),
            identity: Some(identity),
        },
    )
    .soft_error_page(403, "/error.html")
}

fn site_pipeline(build: &BuildProject, bucket: &Bucket) -> Result<Pipeline> {
    let source = GitHubSource::new(
        REPO_OWNER,
        REPO_NAME,
        REPO_BRANCH,
        SecretRef::secrets_manager(TOKEN_SECRET)?,
    )?;
    Ok(Pipeline::source_build_deploy(
        LogicalId::new("ViteSitePipeline")?,
        "ViteSitePipeline",
        source,
        build,
        bucket,
    )?
    .with_cross_account_keys(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_revisions_build() {
        for revision in Revision::ALL {
            let stack = revision.stack().unwrap();
            assert_eq!(stack.pipeline.stage_names(), vec!["Source", "Build", "Deploy"]);
            assert!(stack.build.output_matches_toolchain());
            assert!(!stack.pipeline.cross_account_keys);
        }
    }

    #[test]
    fn test_parse_revision_names() {
        for revision in Revision::ALL {
            assert_eq!(revision.name().parse::<Revision>().unwrap(), revision);
        }
        assert!("public".parse::<Revision>().is_err());
    }

    #[test]
    fn test_legacy_keeps_historical_bucket_id() {
        let stack = Revision::LegacyAnyPrincipal.stack().unwrap();
        assert_eq!(stack.bucket.id.as_str(), "ViteStiteBucket");
        let dist = stack.distribution.unwrap();
        assert_eq!(dist.origin.bucket, stack.bucket.id);
    }

    #[test]
    fn test_removal_policies() {
        assert_eq!(
            Revision::PrivateWithIdentity.stack().unwrap().bucket.removal,
            RemovalPolicy::Destroy
        );
        assert_eq!(
            Revision::PublicWebsite.stack().unwrap().bucket.removal,
            RemovalPolicy::Retain
        );
    }
}
