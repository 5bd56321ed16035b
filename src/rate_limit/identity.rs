//! Caller identity and tier resolution

use serde::{Deserialize, Serialize};

use super::tier::UserTier;

/// Identifier shared by every caller with no resolvable user or address
pub const UNKNOWN_IDENTIFIER: &str = "ip:unknown";

/// What the limiter needs to know about the user behind a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDescriptor {
    pub id: String,
    pub is_authenticated: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub is_premium: bool,
}

impl UserDescriptor {
    /// Logged-in user with no extra attributes
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_authenticated: true,
            ..Self::default()
        }
    }

    pub fn premium(id: impl Into<String>) -> Self {
        Self {
            is_premium: true,
            ..Self::authenticated(id)
        }
    }

    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            is_staff: true,
            ..Self::authenticated(id)
        }
    }
}

/// Identity inputs extracted from one inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Resolved user, if an auth layer ran
    pub user: Option<UserDescriptor>,

    /// Raw `X-Forwarded-For` header value
    pub forwarded_for: Option<String>,

    /// Direct peer address
    pub remote_addr: Option<String>,
}

impl RequestDescriptor {
    pub fn anonymous(remote_addr: impl Into<String>) -> Self {
        Self {
            remote_addr: Some(remote_addr.into()),
            ..Self::default()
        }
    }

    pub fn for_user(user: UserDescriptor) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn with_forwarded_for(mut self, header: impl Into<String>) -> Self {
        self.forwarded_for = Some(header.into());
        self
    }

    /// The user, only if authenticated
    pub fn authenticated_user(&self) -> Option<&UserDescriptor> {
        self.user.as_ref().filter(|u| u.is_authenticated)
    }
}

/// Classify a user. Staff wins over premium, premium over authenticated.
pub fn get_user_type(user: Option<&UserDescriptor>) -> UserTier {
    match user {
        Some(u) if u.is_authenticated => {
            if u.is_staff || u.is_superuser {
                UserTier::Staff
            } else if u.is_premium {
                UserTier::Premium
            } else {
                UserTier::Authenticated
            }
        }
        _ => UserTier::Anonymous,
    }
}

/// Partition key for a request: `user:<id>` or `ip:<address>`
pub fn get_identifier(request: &RequestDescriptor, trust_forwarded_for: bool) -> String {
    if let Some(user) = request.authenticated_user() {
        return format!("user:{}", user.id);
    }

    let forwarded = request
        .forwarded_for
        .as_deref()
        .filter(|_| trust_forwarded_for)
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    let direct = request
        .remote_addr
        .as_deref()
        .map(str::trim)
        .filter(|ip| !ip.is_empty());

    match forwarded.or(direct) {
        Some(ip) => format!("ip:{}", ip),
        None => UNKNOWN_IDENTIFIER.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_precedence() {
        assert_eq!(get_user_type(None), UserTier::Anonymous);
        assert_eq!(
            get_user_type(Some(&UserDescriptor::authenticated("1"))),
            UserTier::Authenticated
        );
        assert_eq!(
            get_user_type(Some(&UserDescriptor::premium("1"))),
            UserTier::Premium
        );

        let mut both = UserDescriptor::premium("1");
        both.is_staff = true;
        assert_eq!(get_user_type(Some(&both)), UserTier::Staff);

        let mut superuser = UserDescriptor::authenticated("1");
        superuser.is_superuser = true;
        assert_eq!(get_user_type(Some(&superuser)), UserTier::Staff);
    }

    #[test]
    fn test_unauthenticated_flags_ignored() {
        let user = UserDescriptor {
            id: "7".to_string(),
            is_authenticated: false,
            is_staff: true,
            is_superuser: false,
            is_premium: true,
        };
        assert_eq!(get_user_type(Some(&user)), UserTier::Anonymous);

        let request = RequestDescriptor {
            user: Some(user),
            remote_addr: Some("10.0.0.9".to_string()),
            ..RequestDescriptor::default()
        };
        assert_eq!(get_identifier(&request, true), "ip:10.0.0.9");
    }

    #[test]
    fn test_identifier_for_user() {
        let request = RequestDescriptor::for_user(UserDescriptor::authenticated("42"))
            .with_forwarded_for("1.2.3.4");
        assert_eq!(get_identifier(&request, true), "user:42");
    }

    #[test]
    fn test_identifier_prefers_first_forwarded_entry() {
        let request = RequestDescriptor::anonymous("10.0.0.1")
            .with_forwarded_for(" 203.0.113.7 , 10.0.0.2");
        assert_eq!(get_identifier(&request, true), "ip:203.0.113.7");
        assert_eq!(get_identifier(&request, false), "ip:10.0.0.1");
    }

    #[test]
    fn test_identifier_empty_forwarded_falls_back() {
        let request = RequestDescriptor::anonymous("10.0.0.1").with_forwarded_for("  ");
        assert_eq!(get_identifier(&request, true), "ip:10.0.0.1");
    }

    #[test]
    fn test_identifier_unknown() {
        assert_eq!(
            get_identifier(&RequestDescriptor::default(), true),
            UNKNOWN_IDENTIFIER
        );
        assert_eq!(
            get_identifier(&RequestDescriptor::anonymous(""), true),
            "ip:unknown"
        );
    }
}
