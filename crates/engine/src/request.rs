//! Request descriptors for rate-limit decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subscription tier of the calling identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Entry tier with the strictest ceilings.
    Free,
    /// Paid tier.
    Premium,
    /// Contract tier with the widest ceilings.
    Enterprise,
    /// Bypasses rate limiting entirely.
    Unlimited,
}

impl Tier {
    /// Parse a tier name, coercing anything unrecognized to `free`.
    pub fn parse_lossy(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Tier::Free)
    }

    /// Parse a known tier name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Tier::Free),
            "premium" => Some(Tier::Premium),
            "enterprise" => Some(Tier::Enterprise),
            "unlimited" => Some(Tier::Unlimited),
            _ => None,
        }
    }

    /// The canonical lowercase name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
            Tier::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information about one request to be admitted or denied.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// Opaque caller identity.
    pub identity: String,
    /// Endpoint the caller is hitting.
    pub endpoint: String,
    /// Subscription tier selecting the policy row.
    pub tier: Tier,
    /// Region selecting a policy multiplier.
    pub region: String,
    /// Tokens this request consumes when admitted.
    pub cost: u32,
}

impl CheckRequest {
    /// Create a new builder for a check request.
    pub fn builder() -> CheckRequestBuilder {
        CheckRequestBuilder::default()
    }
}

/// Builder for check requests. Unset fields take the same defaults as the
/// HTTP header mapping: an anonymous free-tier caller from the US paying one
/// token.
#[derive(Debug, Default)]
pub struct CheckRequestBuilder {
    identity: Option<String>,
    endpoint: Option<String>,
    tier: Option<Tier>,
    region: Option<String>,
    cost: Option<u32>,
}

impl CheckRequestBuilder {
    /// Set the caller identity.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Set the endpoint being hit.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the subscription tier.
    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Set the region.
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the token cost of the request. Zero is coerced to one.
    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Build the check request.
    pub fn build(self) -> CheckRequest {
        CheckRequest {
            identity: self.identity.unwrap_or_else(|| "anonymous".to_string()),
            endpoint: self.endpoint.unwrap_or_default(),
            tier: self.tier.unwrap_or(Tier::Free),
            region: self.region.unwrap_or_else(|| "US".to_string()),
            cost: self.cost.unwrap_or(1).max(1),
        }
    }
}
