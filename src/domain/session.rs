//! Session snapshot and route decision types

use serde::{Deserialize, Deserializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Parent,
    Kid,
}

impl Role {
    /// Parse a role claim; anything other than exactly `parent` or `kid` is unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "parent" => Some(Role::Parent),
            "kid" => Some(Role::Kid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Kid => "kid",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized or non-string role claims deserialize to `None`
fn deserialize_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(|v| v.as_str()).and_then(Role::parse))
}

/// Read-only view of the authentication collaborator's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default, deserialize_with = "deserialize_role")]
    pub role: Option<Role>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { is_authenticated: false, role: None }
    }

    pub fn authenticated(role: Option<Role>) -> Self {
        Self { is_authenticated: true, role }
    }

    pub fn parent() -> Self {
        Self::authenticated(Some(Role::Parent))
    }

    pub fn kid() -> Self {
        Self::authenticated(Some(Role::Kid))
    }
}

/// Why a navigation was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    AlreadyAuthenticated,
    InvalidRole,
    WrongNamespace,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::AlreadyAuthenticated => "already_authenticated",
            DenyReason::InvalidRole => "invalid_role",
            DenyReason::WrongNamespace => "wrong_namespace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub reason: DenyReason,
    /// Originally requested path, so sign-in can send the user back
    pub callback: Option<String>,
}

impl Redirect {
    /// Full redirect target with the callback encoded as `?{param}=...`
    pub fn location(&self, param: &str) -> String {
        match &self.callback {
            Some(callback) => {
                let sep = if self.to.contains('?') { '&' } else { '?' };
                format!("{}{}{}={}", self.to, sep, param, urlencoding::encode(callback))
            }
            None => self.to.clone(),
        }
    }
}

/// Outcome of one navigation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(Redirect),
}

impl RouteDecision {
    pub(crate) fn redirect(to: &str, reason: DenyReason) -> Self {
        RouteDecision::Redirect(Redirect { to: to.to_string(), reason, callback: None })
    }

    pub fn allows(&self) -> bool {
        matches!(self, RouteDecision::Allow)
    }

    pub fn redirect_to(&self) -> Option<&str> {
        match self {
            RouteDecision::Allow => None,
            RouteDecision::Redirect(r) => Some(&r.to),
        }
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            RouteDecision::Allow => None,
            RouteDecision::Redirect(r) => Some(r.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("parent"), Some(Role::Parent));
        assert_eq!(Role::parse("kid"), Some(Role::Kid));
        assert_eq!(Role::parse("KID"), None);
        assert_eq!(Role::parse(" kid "), None);
        assert_eq!(Role::parse("Parent"), None);
        assert_eq!(Role::parse("admin"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn test_session_from_json() {
        let session: Session =
            serde_json::from_str(r#"{"isAuthenticated":true,"role":"kid"}"#).unwrap();
        assert_eq!(session, Session::kid());

        let corrupt: Session =
            serde_json::from_str(r#"{"isAuthenticated":true,"role":"superuser"}"#).unwrap();
        assert_eq!(corrupt, Session::authenticated(None));

        let cased: Session =
            serde_json::from_str(r#"{"isAuthenticated":true,"role":"Parent"}"#).unwrap();
        assert_eq!(cased.role, None);

        let numeric: Session = serde_json::from_str(r#"{"isAuthenticated":true,"role":7}"#).unwrap();
        assert_eq!(numeric.role, None);

        let empty: Session = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Session::anonymous());
    }

    #[test]
    fn test_redirect_location() {
        let redirect = Redirect {
            to: "/auth/signin".to_string(),
            reason: DenyReason::Unauthenticated,
            callback: Some("/dashboard/kids/goals?tab=open".to_string()),
        };
        assert_eq!(
            redirect.location("callbackUrl"),
            "/auth/signin?callbackUrl=%2Fdashboard%2Fkids%2Fgoals%3Ftab%3Dopen"
        );

        let plain = Redirect { callback: None, ..redirect };
        assert_eq!(plain.location("callbackUrl"), "/auth/signin");
    }

    #[test]
    fn test_decision_accessors() {
        assert!(RouteDecision::Allow.allows());
        assert_eq!(RouteDecision::Allow.redirect_to(), None);

        let denied = RouteDecision::redirect("/dashboard/kids", DenyReason::WrongNamespace);
        assert!(!denied.allows());
        assert_eq!(denied.redirect_to(), Some("/dashboard/kids"));
        assert_eq!(denied.reason(), Some(DenyReason::WrongNamespace));
    }
}
