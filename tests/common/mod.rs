//! Common test utilities for event bus integration tests.

pub mod fake_transport;

pub use fake_transport::{FakePeer, FakeTransport};
