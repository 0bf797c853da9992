//! Object storage bucket and its access policy.

use serde::{Deserialize, Serialize};

use crate::distribution::OriginAccessIdentity;
use crate::{Error, LogicalId, Result};

/// How the bucket's objects are made readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BucketAccess {
    /// Public access blocked; reads granted only to a distribution identity.
    PrivateWithIdentity,
    /// Public access blocks disabled; anyone may read objects.
    PublicRead,
}

impl std::fmt::Display for BucketAccess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketAccess::PrivateWithIdentity => write!(f, "private-with-identity"),
            BucketAccess::PublicRead => write!(f, "public-read"),
        }
    }
}

impl std::str::FromStr for BucketAccess {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private-with-identity" => Ok(BucketAccess::PrivateWithIdentity),
            "public-read" => Ok(BucketAccess::PublicRead),
            other => Err(Error::InvalidInput(format!("unknown bucket access: {}", other))),
        }
    }
}

/// What happens to a resource when its stack is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    /// Leave the resource in the account, detached from the stack.
    #[default]
    Retain,
}

impl RemovalPolicy {
    /// Value of the template's `DeletionPolicy` attribute.
    pub fn deletion_policy(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

impl std::str::FromStr for RemovalPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "destroy" => Ok(RemovalPolicy::Destroy),
            "retain" => Ok(RemovalPolicy::Retain),
            other => Err(Error::InvalidInput(format!("unknown removal policy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

/// Who a statement applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Principal {
    /// `*`: every caller, authenticated or not.
    Any,
    /// A distribution's origin access identity declared in the same stack.
    OriginAccessIdentity(LogicalId),
    /// A service principal such as `cloudfront.amazonaws.com`.
    Service(String),
    /// An account id or role ARN.
    Aws(String),
}

impl Principal {
    pub fn is_any(&self) -> bool {
        matches!(self, Principal::Any)
    }
}

/// Which part of the bucket a statement covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyResource {
    /// `arn:...:bucket/*`
    #[default]
    Objects,
    /// `arn:...:bucket`
    Bucket,
}

/// One statement of the bucket's resource policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub principal: Principal,
    pub resource: PolicyResource,
}

impl PolicyStatement {
    /// Allow `s3:GetObject` on every object for `principal`.
    pub fn allow_get_object(principal: Principal) -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: vec!["s3:GetObject".to_string()],
            principal,
            resource: PolicyResource::Objects,
        }
    }

    /// Whether this statement lets its principal read object contents.
    pub fn grants_read(&self) -> bool {
        self.effect == Effect::Allow
            && self.resource == PolicyResource::Objects
            && self
                .actions
                .iter()
                .any(|a| a == "s3:GetObject" || a == "s3:Get*" || a == "s3:*" || a == "*")
    }
}

/// Public access block flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicAccessBlock {
    pub block_public_acls: bool,
    pub block_public_policy: bool,
    pub ignore_public_acls: bool,
    pub restrict_public_buckets: bool,
}

impl PublicAccessBlock {
    pub const BLOCK_ALL: Self = Self {
        block_public_acls: true,
        block_public_policy: true,
        ignore_public_acls: true,
        restrict_public_buckets: true,
    };

    pub const NONE: Self = Self {
        block_public_acls: false,
        block_public_policy: false,
        ignore_public_acls: false,
        restrict_public_buckets: false,
    };

    pub fn blocks_public_reads(&self) -> bool {
        self.block_public_policy || self.restrict_public_buckets
    }
}

/// Destination bucket for the deployed site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: LogicalId,
    /// Website index document; also enables the website endpoint.
    pub index_document: Option<String>,
    pub error_document: Option<String>,
    pub access: BucketAccess,
    pub removal: RemovalPolicy,
    /// Statements added on top of the ones implied by `access`.
    pub extra_statements: Vec<PolicyStatement>,
}

impl Bucket {
    pub fn new(id: LogicalId, access: BucketAccess) -> Self {
        Self {
            id,
            index_document: Some("index.html".to_string()),
            error_document: None,
            access,
            removal: RemovalPolicy::default(),
            extra_statements: Vec::new(),
        }
    }

    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }

    pub fn add_to_resource_policy(&mut self, statement: PolicyStatement) -> &mut Self {
        self.extra_statements.push(statement);
        self
    }

    pub fn public_access_block(&self) -> PublicAccessBlock {
        match self.access {
            BucketAccess::PrivateWithIdentity => PublicAccessBlock::BLOCK_ALL,
            BucketAccess::PublicRead => PublicAccessBlock::NONE,
        }
    }

    pub fn serves_website(&self) -> bool {
        self.index_document.is_some()
    }

    /// Statements implied by the access mode followed by the extra ones.
    ///
    /// `identity` is the access identity of the distribution in front of
    /// this bucket, if any.
    pub fn effective_policy(
        &self,
        identity: Option<&OriginAccessIdentity>,
    ) -> Vec<PolicyStatement> {
        let mut statements = Vec::new();
        match (self.access, identity) {
            (BucketAccess::PublicRead, _) => {
                statements.push(PolicyStatement::allow_get_object(Principal::Any));
            }
            (BucketAccess::PrivateWithIdentity, Some(oai)) => {
                statements.push(PolicyStatement::allow_get_object(
                    Principal::OriginAccessIdentity(oai.id.clone()),
                ));
            }
            (BucketAccess::PrivateWithIdentity, None) => {}
        }
        statements.extend(self.extra_statements.iter().cloned());
        statements
    }
}
