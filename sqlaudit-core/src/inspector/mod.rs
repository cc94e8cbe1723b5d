//! Statement inspection: the per-session audit pipeline.
//!
//! Each statement goes through parse, classify, check, accumulate and
//! context update. The [`Inspector`] owns the session's [`SchemaContext`],
//! so statements later in a batch see the effects of earlier ones.
//!
//! # Module Structure
//! - `context`: cumulative schema state and the live introspection seam
//! - `rules`: rule catalog and per-engine check registry
//! - `checks`: the rule check functions
//! - `result`: findings and leveled aggregation
//! - `rollback`: rollback statement generation

mod checks;
pub mod context;
pub mod result;
pub mod rollback;
pub mod rules;

use crate::Result;
use crate::error::SqlAuditError;
use crate::models::{Rule, RuleLevel, StatementKind};
use crate::parser::{SqlDialect, Statement, StatementNode, parse_one};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

pub use context::{SchemaContext, SchemaSource};
pub use result::{AuditResult, Finding};
pub use rollback::RollbackSql;
pub use rules::{CheckFn, CheckRegistry, RuleHandler, RuleInput};

/// Processing state of a statement's report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Done,
}

/// Audit outcome of one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementReport {
    pub text: String,
    pub fingerprint: String,
    pub kind: StatementKind,
    pub level: RuleLevel,
    /// Tagged findings, one per line
    pub message: String,
    pub status: AuditStatus,
    pub findings: Vec<Finding>,
}

impl StatementReport {
    fn new(node: &StatementNode, result: AuditResult) -> Self {
        Self {
            text: node.text.clone(),
            fingerprint: node.fingerprint.clone(),
            kind: node.kind,
            level: result.level(),
            message: result.message(),
            status: AuditStatus::Done,
            findings: result.findings().to_vec(),
        }
    }
}

/// Audits statements against a rule set within one session.
///
/// # Example
/// ```rust,ignore
/// let mut inspector = Inspector::new(source, CheckRegistry::mysql(), SqlDialect::MySql, Some("app".into()));
/// let report = inspector.audit(&rules, "CREATE TABLE t1 (id INT)").await?;
/// println!("[{}] {}", report.level, report.message);
/// ```
pub struct Inspector {
    source: Arc<dyn SchemaSource>,
    registry: Arc<CheckRegistry>,
    dialect: SqlDialect,
    context: SchemaContext,
    locked_kind: Option<StatementKind>,
}

impl std::fmt::Debug for Inspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inspector")
            .field("dialect", &self.dialect)
            .field("rules", &self.registry.len())
            .field("current_schema", &self.context.current_schema())
            .field("locked_kind", &self.locked_kind)
            .finish_non_exhaustive()
    }
}

impl Inspector {
    pub fn new(
        source: Arc<dyn SchemaSource>,
        registry: Arc<CheckRegistry>,
        dialect: SqlDialect,
        current_schema: Option<String>,
    ) -> Self {
        Self {
            source,
            registry,
            dialect,
            context: SchemaContext::new(dialect, current_schema),
            locked_kind: None,
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn context(&self) -> &SchemaContext {
        &self.context
    }

    /// Audits one statement and folds its effect into the session context.
    ///
    /// # Errors
    /// - Parse errors, or [`SqlAuditError::NodesCountExceedOne`] when `sql`
    ///   holds more than one statement
    /// - [`SqlAuditError::StatementConflict`] when DDL and DML are mixed
    /// - Live lookup failures while preparing the context
    /// - [`SqlAuditError::Check`] when a rule check fails to run
    pub async fn audit(&mut self, rules: &[Rule], sql: &str) -> Result<StatementReport> {
        let node = parse_one(self.dialect, sql)?;
        self.audit_node(rules, &node).await
    }

    /// Audits statements in order; the first error discards every report.
    ///
    /// # Errors
    /// Same as [`Inspector::audit`].
    pub async fn audit_batch(
        &mut self,
        rules: &[Rule],
        statements: &[String],
    ) -> Result<Vec<StatementReport>> {
        let mut reports = Vec::with_capacity(statements.len());
        for sql in statements {
            reports.push(self.audit(rules, sql).await?);
        }
        Ok(reports)
    }

    async fn audit_node(&mut self, rules: &[Rule], node: &StatementNode) -> Result<StatementReport> {
        self.lock_kind(node.kind)?;

        if self.registry.needs_context(rules) || mutates_context(&node.stmt) {
            self.context.prepare(node, self.source.as_ref()).await?;
        }

        let mut result = AuditResult::new();
        for rule in rules {
            let Some(handler) = self.registry.get(&rule.name) else {
                debug!(rule = %rule.name, "No check registered for rule, skipping");
                continue;
            };
            let input = RuleInput {
                rule,
                node,
                context: &self.context,
            };
            let mut partial = AuditResult::new();
            (handler.func)(&input, &mut partial)
                .map_err(|e| SqlAuditError::check_failed(&rule.name, e))?;
            result.extend(partial);
        }

        self.context.apply(node);

        let report = StatementReport::new(node, result);
        debug!(
            fingerprint = %report.fingerprint,
            kind = %report.kind,
            level = %report.level,
            findings = report.findings.len(),
            "Audited statement"
        );
        Ok(report)
    }

    fn lock_kind(&mut self, kind: StatementKind) -> Result<()> {
        if !matches!(kind, StatementKind::Ddl | StatementKind::Dml) {
            return Ok(());
        }
        match self.locked_kind {
            None => {
                self.locked_kind = Some(kind);
                Ok(())
            }
            Some(locked) if locked == kind => Ok(()),
            Some(locked) => Err(SqlAuditError::StatementConflict {
                locked: locked.to_string(),
                current: kind.to_string(),
            }),
        }
    }

    /// Rollback for `sql` against the current session context.
    ///
    /// The context is loaded as needed but never updated, so call this
    /// before auditing the same statement.
    ///
    /// # Errors
    /// Only when `sql` does not parse to exactly one statement; every other
    /// failure is reported in the rollback message.
    pub async fn gen_rollback_sql(&mut self, sql: &str) -> Result<RollbackSql> {
        let node = parse_one(self.dialect, sql)?;
        if let Err(e) = self.context.prepare(&node, self.source.as_ref()).await {
            warn!(error = %e, "Schema lookup failed while generating rollback");
            return Ok(RollbackSql::unsupported(format!(
                "schema lookup failed: {}",
                e
            )));
        }
        Ok(rollback::generate(&node.stmt, &self.context)
            .unwrap_or_else(|e| RollbackSql::unsupported(e.to_string())))
    }
}

/// Whether auditing the statement changes the session context.
fn mutates_context(stmt: &Statement) -> bool {
    matches!(stmt, Statement::Use(_)) || stmt.kind() == StatementKind::Ddl
}
