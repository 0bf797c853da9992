//! Which paths reach the site's objects once the stack is applied.

use serde::Serialize;

use crate::stack::SiteStack;
use crate::storage::{BucketAccess, Principal};

/// Reachable paths to the bucket's objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Exposure {
    /// The bucket's website endpoint serves the index document.
    pub website_endpoint: bool,
    /// Objects can be fetched anonymously by their bucket URL.
    pub direct_object_urls: bool,
    /// The distribution can read and serve the objects.
    pub distribution: bool,
}

impl Exposure {
    /// Content is reachable only through the distribution.
    pub fn distribution_only(&self) -> bool {
        self.distribution && !self.website_endpoint && !self.direct_object_urls
    }

    pub fn is_unreachable(&self) -> bool {
        !self.distribution && !self.website_endpoint && !self.direct_object_urls
    }
}

impl std::fmt::Display for Exposure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths = Vec::new();
        if self.website_endpoint {
            paths.push("website endpoint");
        }
        if self.direct_object_urls {
            paths.push("direct object URLs");
        }
        if self.distribution {
            paths.push("distribution");
        }
        if paths.is_empty() {
            write!(f, "unreachable")
        } else {
            write!(f, "{}", paths.join(", "))
        }
    }
}

pub fn reachability(stack: &SiteStack) -> Exposure {
    let bucket = &stack.bucket;
    let identity = stack
        .distribution
        .as_ref()
        .filter(|d| d.origin.bucket == bucket.id)
        .and_then(|d| d.origin.identity.as_ref());
    let policy = bucket.effective_policy(identity);

    // The access block overrides any anonymous grant in the policy.
    let anonymous_read = policy.iter().any(|s| s.grants_read() && s.principal.is_any());
    let direct_object_urls = anonymous_read && !bucket.public_access_block().blocks_public_reads();
    let website_endpoint = direct_object_urls
        && bucket.serves_website()
        && bucket.access == BucketAccess::PublicRead;

    let distribution = match &stack.distribution {
        Some(dist) if dist.origin.bucket == bucket.id => match &dist.origin.identity {
            Some(oai) => policy.iter().any(|s| {
                s.grants_read() && s.principal == Principal::OriginAccessIdentity(oai.id.clone())
            }),
            None => direct_object_urls,
        },
        _ => false,
    };

    Exposure {
        website_endpoint,
        direct_object_urls,
        distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revisions::Revision;

    #[test]
    fn test_public_website_reachable_directly() {
        let exposure = reachability(&Revision::PublicWebsite.stack().unwrap());
        assert!(exposure.website_endpoint);
        assert!(exposure.direct_object_urls);
        assert!(!exposure.distribution);
    }

    #[test]
    fn test_private_bucket_only_through_distribution() {
        let exposure = reachability(&Revision::PrivateWithIdentity.stack().unwrap());
        assert!(exposure.distribution_only());
        assert_eq!(exposure.to_string(), "distribution");
    }

    #[test]
    fn test_private_bucket_without_distribution_is_unreachable() {
        let mut stack = Revision::PrivateWithIdentity.stack().unwrap();
        stack.distribution = None;
        assert!(reachability(&stack).is_unreachable());
    }

    #[test]
    fn test_legacy_any_principal_blocked_by_access_block() {
        let exposure = reachability(&Revision::LegacyAnyPrincipal.stack().unwrap());
        assert!(!exposure.direct_object_urls);
        assert!(exposure.distribution);
    }
}
