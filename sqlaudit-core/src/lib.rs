//! Core library of sqlaudit, a SQL governance engine.
//!
//! Given a database instance, a batch of SQL statements and a rule set, the
//! engine parses and classifies each statement, runs every selected rule
//! check against it and reports leveled findings, optionally with a
//! generated rollback statement.
//!
//! # Architecture
//! - `driver`: the engine contract and the process-wide driver registry
//! - `adapters`: built-in MySQL and SQLite drivers
//! - `inspector`: the per-session audit pipeline, schema context and rules
//! - `parser`: SQL splitting, parsing and fingerprinting
//!
//! # Security Guarantees
//! - Connection URLs are never logged unredacted
//! - Audits only read from the engine; `exec`/`tx` are explicit and disabled
//!   for read-only configurations

pub mod adapters;
pub mod config;
pub mod driver;
pub mod error;
pub mod inspector;
pub mod logging;
pub mod models;
pub mod parser;

// Re-export commonly used types
pub use adapters::register_builtin_drivers;
pub use config::{AuditConfig, ConnectionConfig, RuleOverride};
pub use driver::{Driver, all_drivers, all_rules, new_driver, register};
pub use error::{Result, SqlAuditError};
pub use inspector::{
    AuditResult, AuditStatus, CheckRegistry, Finding, Inspector, RollbackSql, SchemaContext,
    SchemaSource, StatementReport,
};
pub use models::{
    DRIVER_TYPE_MYSQL, DRIVER_TYPE_SQLITE, ExecResult, Instance, Rule, RuleLevel, StatementKind,
};
pub use parser::{SqlDialect, StatementNode, parse, parse_one};
