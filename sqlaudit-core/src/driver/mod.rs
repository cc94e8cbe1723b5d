//! Engine driver contract.
//!
//! A [`Driver`] is one audit session against one database instance. Drivers
//! are created through the process-wide [`registry`], which maps engine-type
//! names to constructors.
//!
//! # Object Safety
//! The trait is object-safe; sessions are handed out as `Box<dyn Driver>`.

pub mod registry;

use crate::Result;
use crate::inspector::{RollbackSql, StatementReport};
use crate::models::{ExecResult, Rule};
use crate::parser::StatementNode;
use async_trait::async_trait;

pub use registry::{Constructor, all_drivers, all_rules, new_driver, register, session_span};

/// Uniform operations every engine supports.
///
/// Dropping a returned future cancels the operation. Live-engine calls are
/// additionally bounded by the instance's query timeout.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Releases the connection pool. Calling it again has no effect.
    async fn close(&mut self);

    /// Checks that the engine answers. No retries.
    ///
    /// # Errors
    /// Returns a connection error if the engine is unreachable.
    async fn ping(&self) -> Result<()>;

    /// Executes a single statement against the live engine.
    ///
    /// # Errors
    /// Returns an execution error, or a configuration error for read-only
    /// sessions.
    async fn exec(&self, query: &str) -> Result<ExecResult>;

    /// Executes statements in one transaction; either all succeed or none
    /// take effect.
    ///
    /// # Errors
    /// Returns the first failure after rolling the transaction back.
    async fn tx(&self, queries: &[String]) -> Result<Vec<ExecResult>>;

    /// Every schema the engine reports, system schemas included.
    ///
    /// # Errors
    /// Propagates live lookup failures.
    async fn schemas(&self) -> Result<Vec<String>>;

    /// Splits and parses SQL text in the engine's dialect.
    ///
    /// # Errors
    /// Returns a parse error carrying the offending fragment.
    async fn parse(&self, sql_text: &str) -> Result<Vec<StatementNode>>;

    /// Audits one statement; schema effects persist for the session.
    ///
    /// # Errors
    /// See [`Inspector::audit`](crate::inspector::Inspector::audit).
    async fn audit(&mut self, rules: &[Rule], sql: &str) -> Result<StatementReport>;

    /// Best-effort rollback for one statement.
    ///
    /// # Errors
    /// Only when `sql` cannot be parsed into exactly one statement.
    async fn gen_rollback_sql(&mut self, sql: &str) -> Result<RollbackSql>;
}
