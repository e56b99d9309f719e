//! Role-partitioned route access decisions
//!
//! `decide` is a pure function of the session, the requested path and the
//! static route table. Checks run in a fixed order: authentication, then
//! role validity, then namespace. The first failing check names the
//! redirect.

use crate::domain::session::{DenyReason, Redirect, Role, RouteDecision, Session};
use crate::infra::config::Config;
use std::borrow::Cow;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct RouteTable {
    pub sign_in_path: String,
    /// Reachable without a session
    pub public_paths: HashSet<String>,
    /// Sign-in and sign-up pages; authenticated users are sent home
    pub auth_only_paths: HashSet<String>,
    pub kid_prefix: String,
    pub parent_prefix: String,
    pub kid_home: String,
    pub parent_home: String,
    /// Query parameter carrying the originally requested path
    pub callback_param: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RouteTable {
    pub fn from_config(config: &Config) -> Self {
        let normalize_all =
            |paths: &[String]| -> HashSet<String> { paths.iter().map(|p| normalize_path(p)).collect() };
        Self {
            sign_in_path: config.sign_in_path().to_string(),
            public_paths: normalize_all(config.public_paths()),
            auth_only_paths: normalize_all(config.auth_only_paths()),
            kid_prefix: normalize_path(config.kid_prefix()),
            parent_prefix: normalize_path(config.parent_prefix()),
            kid_home: config.kid_home().to_string(),
            parent_home: config.parent_home().to_string(),
            callback_param: config.callback_param().to_string(),
        }
    }

    pub fn role_home(&self, role: Role) -> &str {
        match role {
            Role::Parent => &self.parent_home,
            Role::Kid => &self.kid_home,
        }
    }

    fn prefix_for(&self, role: Role) -> &str {
        match role {
            Role::Parent => &self.parent_prefix,
            Role::Kid => &self.kid_prefix,
        }
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(&normalize_path(path))
    }

    pub fn is_auth_only(&self, path: &str) -> bool {
        self.auth_only_paths.contains(&normalize_path(path))
    }
}

const SEPARATORS: [char; 2] = ['/', '\\'];

/// Canonical form used for every table lookup and prefix test
///
/// Drops query and fragment, treats `\` as `/`, collapses empty segments,
/// resolves `.` and `..` (including percent-encoded forms) and never climbs
/// above the root. A segment that decodes to something containing a
/// separator is split again, so `..%2F` resolves like `../`.
pub fn normalize_path(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let mut segments: Vec<Cow<'_, str>> = Vec::new();

    for segment in path[..end].split(SEPARATORS) {
        let decoded = urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment));
        if decoded.contains(SEPARATORS) {
            for piece in decoded.split(SEPARATORS) {
                push_segment(&mut segments, Cow::Owned(piece.to_string()), piece);
            }
        } else {
            push_segment(&mut segments, Cow::Borrowed(segment), &decoded);
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }
    let mut normalized = String::with_capacity(end + 1);
    for segment in segments {
        normalized.push('/');
        normalized.push_str(&segment);
    }
    normalized
}

fn push_segment<'a>(segments: &mut Vec<Cow<'a, str>>, segment: Cow<'a, str>, decoded: &str) {
    match decoded {
        "" | "." => {}
        ".." => {
            segments.pop();
        }
        _ => segments.push(segment),
    }
}

/// Segment-aware prefix test: `/a/b` matches `/a/b` and `/a/b/c`, not `/a/bc`
pub fn in_namespace(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    routes: RouteTable,
}

impl AccessGate {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn decide(&self, session: &Session, path: &str) -> RouteDecision {
        let routes = &self.routes;
        let normalized = normalize_path(path);
        let public = routes.public_paths.contains(&normalized);
        let auth_only = routes.auth_only_paths.contains(&normalized);

        if !session.is_authenticated {
            if public {
                return RouteDecision::Allow;
            }
            return RouteDecision::Redirect(Redirect {
                to: routes.sign_in_path.clone(),
                reason: DenyReason::Unauthenticated,
                callback: Some(path.to_string()),
            });
        }

        let Some(role) = session.role else {
            // Fail closed; the sign-in page itself stays reachable so the redirect settles
            if auth_only {
                return RouteDecision::Allow;
            }
            return RouteDecision::redirect(&routes.sign_in_path, DenyReason::InvalidRole);
        };

        if auth_only {
            return RouteDecision::redirect(routes.role_home(role), DenyReason::AlreadyAuthenticated);
        }

        if public || in_namespace(&normalized, routes.prefix_for(role)) {
            return RouteDecision::Allow;
        }

        RouteDecision::redirect(routes.role_home(role), DenyReason::WrongNamespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/dashboard/kids/"), "/dashboard/kids");
        assert_eq!(normalize_path("/dashboard/kids?tab=goals"), "/dashboard/kids");
        assert_eq!(normalize_path("/dashboard/kids#top"), "/dashboard/kids");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/?ref=pwa"), "/");
        assert_eq!(normalize_path("dashboard/kids"), "/dashboard/kids");
    }

    #[test]
    fn test_normalize_path_resolves_dot_segments() {
        assert_eq!(normalize_path("/dashboard/kids/../parents/wallet"), "/dashboard/parents/wallet");
        assert_eq!(normalize_path("/dashboard/kids/./goals"), "/dashboard/kids/goals");
        assert_eq!(normalize_path("/dashboard//kids///chores"), "/dashboard/kids/chores");
        assert_eq!(normalize_path("/dashboard/kids/%2e%2e/parents"), "/dashboard/parents");
        assert_eq!(normalize_path("/../../etc"), "/etc");
        assert_eq!(normalize_path("/dashboard/.."), "/");
        assert_eq!(normalize_path("/dashboard/kids/..?tab=1"), "/dashboard");
    }

    #[test]
    fn test_normalize_path_backslash_and_encoded_separators() {
        assert_eq!(normalize_path("/dashboard/kids/..\\parents/wallet"), "/dashboard/parents/wallet");
        assert_eq!(normalize_path("\\dashboard\\kids\\goals"), "/dashboard/kids/goals");
        assert_eq!(normalize_path("/dashboard/kids/..%2Fparents"), "/dashboard/parents");
        assert_eq!(normalize_path("/dashboard/kids/%2e%2e%5cparents"), "/dashboard/parents");
        assert_eq!(normalize_path("/dashboard/kids/goals%2Fweekly"), "/dashboard/kids/goals/weekly");
    }

    #[test]
    fn test_in_namespace_is_segment_aware() {
        assert!(in_namespace("/dashboard/kids", "/dashboard/kids"));
        assert!(in_namespace("/dashboard/kids/goals", "/dashboard/kids"));
        assert!(!in_namespace("/dashboard/kidsfoo", "/dashboard/kids"));
        assert!(!in_namespace("/dashboard", "/dashboard/kids"));
        assert!(in_namespace("/anything", "/"));
    }

    #[test]
    fn test_default_routes() {
        let routes = RouteTable::default();
        assert!(routes.is_public("/"));
        assert!(routes.is_public("/auth/signin?error=expired"));
        assert!(routes.is_auth_only("/auth/signup/"));
        assert!(!routes.is_public("/dashboard/kids"));
        assert_eq!(routes.role_home(Role::Kid), "/dashboard/kids");
        assert_eq!(routes.role_home(Role::Parent), "/dashboard/parents");
    }

    #[test]
    fn test_unauthenticated_carries_callback() {
        let gate = AccessGate::default();
        let decision = gate.decide(&Session::anonymous(), "/dashboard/parents/wallet?kid=1");
        let RouteDecision::Redirect(redirect) = decision else {
            panic!("expected redirect");
        };
        assert_eq!(redirect.to, "/auth/signin");
        assert_eq!(redirect.reason, DenyReason::Unauthenticated);
        assert_eq!(redirect.callback.as_deref(), Some("/dashboard/parents/wallet?kid=1"));
    }

    #[test]
    fn test_invalid_role_on_sign_in_does_not_loop() {
        let gate = AccessGate::default();
        let corrupt = Session::authenticated(None);
        assert_eq!(gate.decide(&corrupt, "/auth/signin"), RouteDecision::Allow);
        assert_eq!(
            gate.decide(&corrupt, "/dashboard/parents").reason(),
            Some(DenyReason::InvalidRole)
        );
    }
}
