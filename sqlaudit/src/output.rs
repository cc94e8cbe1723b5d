//! Report rendering for audit runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlaudit_core::{RollbackSql, RuleLevel, StatementReport};

/// Audit outcome of one statement, with its rollback when requested.
#[derive(Debug, Clone, Serialize)]
pub struct StatementOutcome {
    #[serde(flatten)]
    pub report: StatementReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackSql>,
}

/// Everything one `audit` invocation produced.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub instance: String,
    pub engine: String,
    pub schema: Option<String>,
    /// Highest level over all statements
    pub level: RuleLevel,
    pub statements: Vec<StatementOutcome>,
}

impl BatchReport {
    pub fn new(
        instance: String,
        engine: String,
        schema: Option<String>,
        statements: Vec<StatementOutcome>,
    ) -> Self {
        let level = statements
            .iter()
            .map(|outcome| outcome.report.level)
            .max()
            .unwrap_or_default();
        Self {
            generated_at: Utc::now(),
            instance,
            engine,
            schema,
            level,
            statements,
        }
    }

    /// Number of findings over all statements.
    pub fn finding_count(&self) -> usize {
        self.statements
            .iter()
            .map(|outcome| outcome.report.findings.len())
            .sum()
    }
}

/// Human-readable rendering, one block per statement.
pub fn render_text(batch: &BatchReport) -> String {
    let mut out = String::new();
    for (index, outcome) in batch.statements.iter().enumerate() {
        let report = &outcome.report;
        out.push_str(&format!(
            "#{} [{}] {}\n",
            index.saturating_add(1),
            report.level,
            report.text
        ));
        for line in report.message.lines() {
            out.push_str(&format!("    {}\n", line));
        }
        if let Some(rollback) = &outcome.rollback {
            for line in rollback.sql.lines() {
                out.push_str(&format!("    rollback: {}\n", line));
            }
            if !rollback.message.is_empty() {
                out.push_str(&format!("    rollback unavailable: {}\n", rollback.message));
            }
        }
    }
    out.push_str(&format!(
        "{} statement(s), {} finding(s), level {}\n",
        batch.statements.len(),
        batch.finding_count(),
        batch.level
    ));
    out
}

/// Pretty-printed JSON rendering.
///
/// # Errors
/// Returns an error if the report cannot be serialized.
pub fn render_json(batch: &BatchReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(batch)
}
