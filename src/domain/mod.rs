//! Domain models - wire envelopes and session types
//!
//! - `envelope` - `EventEnvelope`, `EventType`, typed payloads
//! - `session` - `Session`, `Role`, `RouteDecision`

pub mod envelope;
pub mod session;

pub use envelope::{EventEnvelope, EventType, EventTypeRegistry, TypedPayload};
pub use session::{DenyReason, Redirect, Role, RouteDecision, Session};
