//! Caller Tiers and Endpoint Classes
//!
//! The two axes of the quota table: who is calling and what kind of
//! endpoint they are calling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RateLimitError;

/// Caller classification, ordered from least to most generous quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserTier {
    /// No authenticated user
    Anonymous,
    /// Logged-in user without extra privileges
    Authenticated,
    /// User holding the premium marker
    Premium,
    /// Staff or superuser
    Staff,
}

impl UserTier {
    /// All tiers in ascending order
    pub const ALL: [UserTier; 4] = [
        UserTier::Anonymous,
        UserTier::Authenticated,
        UserTier::Premium,
        UserTier::Staff,
    ];

    /// Lowercase name used in config files, logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Anonymous => "anonymous",
            UserTier::Authenticated => "authenticated",
            UserTier::Premium => "premium",
            UserTier::Staff => "staff",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for UserTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserTier {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anonymous" => Ok(UserTier::Anonymous),
            "authenticated" => Ok(UserTier::Authenticated),
            "premium" => Ok(UserTier::Premium),
            "staff" => Ok(UserTier::Staff),
            other => Err(RateLimitError::InvalidConfig(format!(
                "unknown user tier '{}'",
                other
            ))),
        }
    }
}

/// Coarse request category selecting the quota row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    Default,
    Api,
    Search,
    View,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::Default,
        EndpointClass::Api,
        EndpointClass::Search,
        EndpointClass::View,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Default => "default",
            EndpointClass::Api => "api",
            EndpointClass::Search => "search",
            EndpointClass::View => "view",
        }
    }

    /// Classify a request path the way the global middleware does.
    ///
    /// `view` is never inferred from a path; it is only applied by the
    /// per-route layer.
    pub fn from_path(path: &str) -> Self {
        if path.starts_with("/api/") {
            EndpointClass::Api
        } else if path.split('/').any(|segment| segment == "search") {
            EndpointClass::Search
        } else {
            EndpointClass::Default
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointClass {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(EndpointClass::Default),
            "api" => Ok(EndpointClass::Api),
            "search" => Ok(EndpointClass::Search),
            "view" => Ok(EndpointClass::View),
            other => Err(RateLimitError::InvalidConfig(format!(
                "unknown endpoint class '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(UserTier::Anonymous < UserTier::Authenticated);
        assert!(UserTier::Authenticated < UserTier::Premium);
        assert!(UserTier::Premium < UserTier::Staff);

        let mut sorted = UserTier::ALL;
        sorted.sort();
        assert_eq!(sorted, UserTier::ALL);
    }

    #[test]
    fn test_tier_parse_and_display() {
        for tier in UserTier::ALL {
            assert_eq!(tier.to_string().parse::<UserTier>().unwrap(), tier);
        }
        assert_eq!(" Staff ".parse::<UserTier>().unwrap(), UserTier::Staff);
        assert!("admin".parse::<UserTier>().is_err());
    }

    #[test]
    fn test_endpoint_class_parse() {
        for class in EndpointClass::ALL {
            assert_eq!(class.as_str().parse::<EndpointClass>().unwrap(), class);
        }
        assert!("apis".parse::<EndpointClass>().is_err());
    }

    #[test]
    fn test_endpoint_class_from_path() {
        assert_eq!(EndpointClass::from_path("/api/tools/"), EndpointClass::Api);
        assert_eq!(EndpointClass::from_path("/search/"), EndpointClass::Search);
        assert_eq!(
            EndpointClass::from_path("/tools/search"),
            EndpointClass::Search
        );
        assert_eq!(
            EndpointClass::from_path("/tools/searchable/"),
            EndpointClass::Default
        );
        assert_eq!(EndpointClass::from_path("/"), EndpointClass::Default);
        assert_eq!(EndpointClass::from_path("/apiary/"), EndpointClass::Default);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&UserTier::Premium).unwrap();
        assert_eq!(json, "\"premium\"");
        let class: EndpointClass = serde_json::from_str("\"search\"").unwrap();
        assert_eq!(class, EndpointClass::Search);
    }
}
