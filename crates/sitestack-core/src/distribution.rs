//! Content-delivery distribution in front of the bucket.

use serde::{Deserialize, Serialize};

use crate::{Error, LogicalId, Result};

/// Principal letting the distribution read a private bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginAccessIdentity {
    pub id: LogicalId,
    pub comment: String,
}

impl OriginAccessIdentity {
    pub fn new(id: LogicalId, comment: impl Into<String>) -> Self {
        Self {
            id,
            comment: comment.into(),
        }
    }
}

/// Which viewer connections are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerProtocolPolicy {
    /// HTTP and HTTPS.
    #[default]
    AllowAll,
    RedirectToHttps,
    HttpsOnly,
}

impl ViewerProtocolPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerProtocolPolicy::AllowAll => "allow-all",
            ViewerProtocolPolicy::RedirectToHttps => "redirect-to-https",
            ViewerProtocolPolicy::HttpsOnly => "https-only",
        }
    }
}

impl std::str::FromStr for ViewerProtocolPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "allow-all" => Ok(ViewerProtocolPolicy::AllowAll),
            "redirect-to-https" => Ok(ViewerProtocolPolicy::RedirectToHttps),
            "https-only" => Ok(ViewerProtocolPolicy::HttpsOnly),
            other => Err(Error::InvalidInput(format!(
                "unknown viewer protocol policy: {}",
                other
            ))),
        }
    }
}

/// HTTP methods forwarded by the default behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedMethods {
    GetHead,
    #[default]
    GetHeadOptions,
    All,
}

impl AllowedMethods {
    pub fn methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions => &["GET", "HEAD", "OPTIONS"],
            AllowedMethods::All => &["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"],
        }
    }

    /// Methods whose responses are cached.
    pub fn cached_methods(&self) -> &'static [&'static str] {
        match self {
            AllowedMethods::GetHead => &["GET", "HEAD"],
            AllowedMethods::GetHeadOptions | AllowedMethods::All => &["GET", "HEAD", "OPTIONS"],
        }
    }
}

impl std::str::FromStr for AllowedMethods {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "get-head" => Ok(AllowedMethods::GetHead),
            "get-head-options" => Ok(AllowedMethods::GetHeadOptions),
            "all" => Ok(AllowedMethods::All),
            other => Err(Error::InvalidInput(format!("unknown allowed methods: {}", other))),
        }
    }
}

/// Edge locations the distribution is served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceClass {
    PriceClass100,
    PriceClass200,
    #[default]
    PriceClassAll,
}

impl PriceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceClass::PriceClass100 => "PriceClass_100",
            PriceClass::PriceClass200 => "PriceClass_200",
            PriceClass::PriceClassAll => "PriceClass_All",
        }
    }
}

impl std::str::FromStr for PriceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "100" => Ok(PriceClass::PriceClass100),
            "200" => Ok(PriceClass::PriceClass200),
            "all" => Ok(PriceClass::PriceClassAll),
            other => Err(Error::InvalidInput(format!("unknown price class: {}", other))),
        }
    }
}

/// Rewrite rule for an error status returned by the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status returned by the origin.
    pub http_status: u16,
    /// Page served instead, e.g. `/error.html`.
    pub response_page_path: Option<String>,
    /// Status returned to the viewer.
    pub response_http_status: Option<u16>,
    /// How long the error response is cached.
    pub ttl_seconds: Option<u32>,
}

/// Where the distribution fetches content from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    pub bucket: LogicalId,
    pub identity: Option<OriginAccessIdentity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: LogicalId,
    pub origin: Origin,
    pub viewer_protocol: ViewerProtocolPolicy,
    pub allowed_methods: AllowedMethods,
    pub error_responses: Vec<ErrorResponse>,
    pub default_root_object: Option<String>,
    pub price_class: PriceClass,
}

impl Distribution {
    pub fn new(id: LogicalId, origin: Origin) -> Self {
        Self {
            id,
            origin,
            viewer_protocol: ViewerProtocolPolicy::default(),
            allowed_methods: AllowedMethods::default(),
            error_responses: Vec::new(),
            default_root_object: None,
            price_class: PriceClass::default(),
        }
    }

    /// Serve `page` with 200 whenever the origin answers `status`.
    pub fn soft_error_page(mut self, status: u16, page: impl Into<String>) -> Result<Self> {
        let page = page.into();
        if !(400..=599).contains(&status) {
            return Err(Error::InvalidInput(format!(
                "error response status must be 4xx or 5xx, got {}",
                status
            )));
        }
        if !page.starts_with('/') {
            return Err(Error::InvalidInput(format!(
                "error page path must start with '/', got '{}'",
                page
            )));
        }
        self.error_responses.push(ErrorResponse {
            http_status: status,
            response_page_path: Some(page),
            response_http_status: Some(200),
            ttl_seconds: None,
        });
        Ok(self)
    }

    pub fn error_response(&self, status: u16) -> Option<&ErrorResponse> {
        self.error_responses.iter().find(|r| r.http_status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution() -> Distribution {
        let bucket = LogicalId::new("ViteSiteBucket").unwrap();
        let oai = OriginAccessIdentity::new(LogicalId::new("OriginAccessControl").unwrap(), "Vite site");
        Distribution::new(
            LogicalId::new("ViteSiteDistribution").unwrap(),
            Origin {
                bucket,
                identity: Some(oai),
            },
        )
    }

    #[test]
    fn test_defaults() {
        let d = distribution();
        assert_eq!(d.viewer_protocol, ViewerProtocolPolicy::AllowAll);
        assert_eq!(d.allowed_methods.methods(), &["GET", "HEAD", "OPTIONS"]);
        assert!(d.error_responses.is_empty());
    }

    #[test]
    fn test_soft_error_page() {
        let d = distribution().soft_error_page(403, "/error.html").unwrap();
        let rule = d.error_response(403).unwrap();
        assert_eq!(rule.response_page_path.as_deref(), Some("/error.html"));
        assert_eq!(rule.response_http_status, Some(200));
        assert!(d.error_response(404).is_none());
    }

    #[test]
    fn test_soft_error_page_rejects_bad_input() {
        assert!(distribution().soft_error_page(200, "/error.html").is_err());
        assert!(distribution().soft_error_page(403, "error.html").is_err());
    }

    #[test]
    fn test_parse_policies() {
        assert_eq!(
            "redirect-to-https".parse::<ViewerProtocolPolicy>().unwrap(),
            ViewerProtocolPolicy::RedirectToHttps
        );
        assert!("https".parse::<ViewerProtocolPolicy>().is_err());
        assert_eq!("all".parse::<AllowedMethods>().unwrap(), AllowedMethods::All);
    }
}
