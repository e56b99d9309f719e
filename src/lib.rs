//! famfin-core library
//!
//! Real-time event bus and role-based access gate for the family-finance
//! client. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
