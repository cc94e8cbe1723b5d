//! Rule selection for an audit run.
//!
//! Loaded from JSON:
//!
//! ```json
//! {
//!   "rules": ["ddl_check_primary_key_exist", "ddl_check_index_count"],
//!   "disabled": [],
//!   "overrides": {
//!     "ddl_check_index_count": { "level": "warn", "value": "8" }
//!   }
//! }
//! ```

use crate::error::SqlAuditError;
use crate::models::{Rule, RuleLevel};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Per-rule adjustments applied on top of the catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleOverride {
    pub level: Option<RuleLevel>,
    pub value: Option<String>,
}

/// Which rules an audit runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Rules to run, in order; empty selects the whole catalog
    pub rules: Vec<String>,
    /// Rules removed from the selection
    pub disabled: Vec<String>,
    /// Level and parameter overrides keyed by rule name
    pub overrides: BTreeMap<String, RuleOverride>,
}

impl AuditConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    /// Returns a serialization error for malformed JSON.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|source| SqlAuditError::Serialization {
            context: "invalid audit configuration".to_string(),
            source,
        })
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be read, or a serialization
    /// error if it is not a valid configuration document.
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SqlAuditError::Io {
            context: format!("failed to read audit configuration {}", path.display()),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks that every rule name mentioned exists in `catalog`.
    ///
    /// # Errors
    /// Returns a configuration error naming the first unknown rule.
    pub fn validate(&self, catalog: &[Rule]) -> crate::Result<()> {
        let known: HashSet<&str> = catalog.iter().map(|rule| rule.name.as_str()).collect();
        let mentioned = self
            .rules
            .iter()
            .chain(self.disabled.iter())
            .chain(self.overrides.keys());
        for name in mentioned {
            if !known.contains(name.as_str()) {
                return Err(SqlAuditError::configuration(format!(
                    "unknown rule '{}'",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Resolves the rules to run against `catalog`.
    ///
    /// Explicit `rules` keep their configured order; otherwise catalog order
    /// is used. Each name appears at most once.
    pub fn select_rules(&self, catalog: &[Rule]) -> Vec<Rule> {
        let disabled: HashSet<&str> = self.disabled.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();

        let candidates: Vec<&Rule> = if self.rules.is_empty() {
            catalog.iter().collect()
        } else {
            self.rules
                .iter()
                .filter_map(|name| catalog.iter().find(|rule| &rule.name == name))
                .collect()
        };

        candidates
            .into_iter()
            .filter(|rule| !disabled.contains(rule.name.as_str()))
            .filter(|rule| seen.insert(rule.name.clone()))
            .map(|rule| self.apply_override(rule.clone()))
            .collect()
    }

    fn apply_override(&self, mut rule: Rule) -> Rule {
        if let Some(adjust) = self.overrides.get(&rule.name) {
            if let Some(level) = adjust.level {
                rule.level = level;
            }
            if let Some(value) = &adjust.value {
                rule.value.clone_from(value);
            }
        }
        rule
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn catalog() -> Vec<Rule> {
        vec![
            Rule::new("a", "first", RuleLevel::Error, "ddl"),
            Rule::new("b", "second", RuleLevel::Notice, "ddl").with_value("5"),
            Rule::new("c", "third", RuleLevel::Warn, "dml"),
        ]
    }

    #[test]
    fn test_empty_config_selects_catalog() {
        let selected = AuditConfig::default().select_rules(&catalog());
        let names: Vec<_> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn test_explicit_rules_keep_order_and_overrides_apply() {
        let config = AuditConfig::from_json(
            r#"{"rules": ["c", "b", "c"], "overrides": {"b": {"level": "error", "value": "9"}}}"#,
        )
        .unwrap();
        config.validate(&catalog()).unwrap();

        let selected = config.select_rules(&catalog());
        let names: Vec<_> = selected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["c", "b"]);
        assert_eq!(selected[1].level, RuleLevel::Error);
        assert_eq!(selected[1].value, "9");
    }

    #[test]
    fn test_disabled_rules_are_removed() {
        let config = AuditConfig {
            disabled: vec!["a".to_string()],
            ..Default::default()
        };
        let selected = config.select_rules(&catalog());
        assert!(selected.iter().all(|r| r.name != "a"));
    }

    #[test]
    fn test_validate_rejects_unknown_rule() {
        let config = AuditConfig::from_json(r#"{"disabled": ["nope"]}"#).unwrap();
        let err = config.validate(&catalog()).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rules": ["a"]}}"#).unwrap();

        let config = AuditConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rules, ["a"]);

        assert!(AuditConfig::from_file("/nonexistent/audit.json").is_err());
    }
}
