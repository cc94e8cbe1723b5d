//! Findings accumulated while auditing one statement.

use crate::models::RuleLevel;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub level: RuleLevel,
    pub message: String,
}

/// Ordered findings of one statement (or of one check while it runs).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResult {
    findings: Vec<Finding>,
}

fn level_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"^\[(error|warn|notice|normal|osc)\]").expect("Invalid level tag pattern")
    })
}

impl AuditResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finding; empty messages are ignored.
    pub fn add(&mut self, level: RuleLevel, message: impl Into<String>) {
        let message = message.into();
        if message.is_empty() {
            return;
        }
        self.findings.push(Finding { level, message });
    }

    /// Appends another result's findings in order.
    pub fn extend(&mut self, other: Self) {
        self.findings.extend(other.findings);
    }

    /// Highest severity recorded, `Normal` when empty.
    pub fn level(&self) -> RuleLevel {
        self.findings
            .iter()
            .map(|finding| finding.level)
            .max()
            .unwrap_or(RuleLevel::Normal)
    }

    /// Findings joined by newlines, each prefixed with `[level]` unless the
    /// message already starts with a level tag.
    /// Tags are matched in lowercase only: `[Error]x` is tagged again.
    pub fn message(&self) -> String {
        self.findings
            .iter()
            .map(|finding| {
                if level_tag().is_match(&finding.message) {
                    finding.message.clone()
                } else {
                    format!("[{}]{}", finding.level, finding.message)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }
}
