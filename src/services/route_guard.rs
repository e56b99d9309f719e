//! Navigation guard: reads the session, asks the gate, performs the redirect

use crate::domain::session::{RouteDecision, Session};
use crate::services::access_gate::AccessGate;
use tracing::{debug, info};

/// Synchronous accessor for the current session snapshot
pub trait SessionSource: Send + Sync {
    fn current(&self) -> Session;
}

impl SessionSource for Session {
    fn current(&self) -> Session {
        *self
    }
}

/// Session source backed by a swappable snapshot
#[derive(Debug, Default)]
pub struct StaticSession {
    session: parking_lot::RwLock<Session>,
}

impl StaticSession {
    pub fn new(session: Session) -> Self {
        Self { session: parking_lot::RwLock::new(session) }
    }

    /// Replace the snapshot, e.g. after sign-in or sign-out
    pub fn set(&self, session: Session) {
        *self.session.write() = session;
    }
}

impl SessionSource for StaticSession {
    fn current(&self) -> Session {
        *self.session.read()
    }
}

/// Executes the redirect chosen by the gate
pub trait Navigator: Send + Sync {
    fn redirect(&self, location: &str);
}

pub struct RouteGuard<S, N> {
    gate: AccessGate,
    session: S,
    navigator: N,
}

impl<S: SessionSource, N: Navigator> RouteGuard<S, N> {
    pub fn new(gate: AccessGate, session: S, navigator: N) -> Self {
        Self { gate, session, navigator }
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Check one navigation, redirecting when it is not allowed
    pub fn guard(&self, path: &str) -> RouteDecision {
        let session = self.session.current();
        let decision = self.gate.decide(&session, path);

        match &decision {
            RouteDecision::Allow => {
                debug!(path = %path, "route_allowed");
            }
            RouteDecision::Redirect(redirect) => {
                let location = redirect.location(&self.gate.routes().callback_param);
                info!(
                    path = %path,
                    role = ?session.role,
                    authenticated = %session.is_authenticated,
                    reason = %redirect.reason.as_str(),
                    location = %location,
                    "route_redirected"
                );
                self.navigator.redirect(&location);
            }
        }

        decision
    }
}
