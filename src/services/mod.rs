//! Services - event distribution and access control
//!
//! - `event_bus` - Reconnecting pub/sub over the event stream
//! - `subscribers` - Subscriber registry and subscription handles
//! - `access_gate` - Pure route access decisions
//! - `route_guard` - Applies gate decisions through a navigator

pub mod access_gate;
pub mod event_bus;
pub mod route_guard;
pub mod subscribers;

pub use access_gate::{AccessGate, RouteTable};
pub use event_bus::{BusOptions, ConnectionState, Delivery, DropReason, EventBus};
pub use route_guard::{Navigator, RouteGuard, SessionSource, StaticSession};
pub use subscribers::{Subscription, SubscriptionId};
