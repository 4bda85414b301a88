//! Chart gatekeeper service
//!
//! Exposes the router and configuration so integration tests can drive the
//! API without binding a socket.

pub mod api;
pub mod config;
