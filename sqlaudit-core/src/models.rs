//! Core data models shared by drivers, the inspector and the CLI.
//!
//! Everything that crosses the driver boundary lives here: the database
//! instance description, rule metadata and severity levels, statement
//! classification and execution results.

use crate::config::ConnectionConfig;
use crate::error::{SqlAuditError, redact_database_url};
use serde::{Deserialize, Serialize};

/// Engine-type name of the built-in MySQL driver.
pub const DRIVER_TYPE_MYSQL: &str = "mysql";
/// Engine-type name of the built-in SQLite driver.
pub const DRIVER_TYPE_SQLITE: &str = "sqlite";

/// Severity of a rule finding, ordered `Normal < Notice < Warn < Error`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RuleLevel {
    #[default]
    Normal,
    Notice,
    Warn,
    Error,
}

impl RuleLevel {
    /// Wire tag of the level as used in messages and configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleLevel::Normal => "normal",
            RuleLevel::Notice => "notice",
            RuleLevel::Warn => "warn",
            RuleLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for RuleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleLevel {
    type Err = SqlAuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(RuleLevel::Normal),
            "notice" => Ok(RuleLevel::Notice),
            "warn" | "warning" => Ok(RuleLevel::Warn),
            "error" => Ok(RuleLevel::Error),
            other => Err(SqlAuditError::configuration(format!(
                "unknown rule level '{}'",
                other
            ))),
        }
    }
}

/// Metadata of one audit rule.
///
/// `name` is the rule's identity: it keys the check registry and selects the
/// rule in configuration. `value` carries an optional rule parameter such as
/// a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub desc: String,
    pub level: RuleLevel,
    pub category: String,
    #[serde(default)]
    pub value: String,
}

impl Rule {
    /// Creates a rule without a parameter value.
    pub fn new(
        name: impl Into<String>,
        desc: impl Into<String>,
        level: RuleLevel,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            level,
            category: category.into(),
            value: String::new(),
        }
    }

    /// Builder method to set the rule parameter.
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Builder method to override the level.
    pub fn with_level(mut self, level: RuleLevel) -> Self {
        self.level = level;
        self
    }

    /// Interprets `value` as a numeric threshold, falling back to `default`
    /// when the value is empty or not a number.
    pub fn threshold(&self, default: usize) -> usize {
        self.value.trim().parse().unwrap_or(default)
    }
}

/// Coarse classification of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatementKind {
    Ddl,
    Dml,
    Dcl,
    Other,
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementKind::Ddl => write!(f, "DDL"),
            StatementKind::Dml => write!(f, "DML"),
            StatementKind::Dcl => write!(f, "DCL"),
            StatementKind::Other => write!(f, "OTHER"),
        }
    }
}

/// Outcome of executing a statement against the live engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Connection parameters of one database instance.
///
/// The connection URL may carry credentials, so it is private and never part
/// of `Debug` output; use [`Instance::redacted_url`] for logging.
#[derive(Clone)]
pub struct Instance {
    /// Human-readable instance name used in logs and reports
    pub name: String,
    /// Engine-type name a driver is registered under
    pub engine_type: String,
    /// Schema to audit against when the caller does not name one
    pub default_schema: Option<String>,
    /// Pool and timeout settings
    pub config: ConnectionConfig,
    connection_url: String,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("engine_type", &self.engine_type)
            .field("url", &self.redacted_url())
            .field("default_schema", &self.default_schema)
            .field("config", &self.config)
            .finish()
    }
}

impl Instance {
    /// Creates an instance for an explicit engine type.
    pub fn new(engine_type: impl Into<String>, connection_url: impl Into<String>) -> Self {
        let engine_type = engine_type.into();
        Self {
            name: engine_type.clone(),
            engine_type,
            default_schema: None,
            config: ConnectionConfig::default(),
            connection_url: connection_url.into(),
        }
    }

    /// Creates an instance, deriving the engine type from the URL scheme.
    ///
    /// # Errors
    /// Returns a configuration error if the URL format is not recognized.
    pub fn from_url(connection_url: &str) -> crate::Result<Self> {
        let engine_type = detect_engine_type(connection_url)?;
        Ok(Self::new(engine_type, connection_url))
    }

    /// Builder method to set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set the default schema.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = Some(schema.into());
        self
    }

    /// Builder method to replace the connection configuration.
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Raw connection URL, for drivers only.
    pub fn connection_url(&self) -> &str {
        &self.connection_url
    }

    /// Connection URL with the password masked.
    pub fn redacted_url(&self) -> String {
        redact_database_url(&self.connection_url)
    }
}

/// Detects the engine type from a connection string.
///
/// # Errors
/// Returns a configuration error for unrecognized formats.
pub fn detect_engine_type(connection_string: &str) -> crate::Result<&'static str> {
    if connection_string.starts_with("mysql://") {
        Ok(DRIVER_TYPE_MYSQL)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DRIVER_TYPE_SQLITE)
    } else {
        Err(SqlAuditError::configuration(
            "Unrecognized database connection string format",
        ))
    }
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
