//! Configuration types.
//!
//! - `connection`: pool sizing, timeouts and session mode for live engines
//! - `audit`: which rules run and with which level/parameter overrides

pub mod audit;
pub mod connection;

pub use audit::{AuditConfig, RuleOverride};
pub use connection::ConnectionConfig;
