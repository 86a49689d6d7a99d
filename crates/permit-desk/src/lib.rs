//! Permit (alvará) tracking for an accounting firm's client portfolio.
//!
//! The crate exposes the permit status engine and lifecycle workflow, client and
//! fee bookkeeping, and the HTTP routers the API service mounts.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
