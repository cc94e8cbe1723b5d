//! SQLite connection handling and live schema lookups.
//!
//! SQLite schemas are the attached databases (`main`, `temp` and anything
//! ATTACHed). An in-memory database lives only as long as its connection,
//! so in-memory pools hold exactly one connection that never expires.

use crate::Result;
use crate::adapters::with_timeout;
use crate::config::ConnectionConfig;
use crate::error::SqlAuditError;
use crate::inspector::SchemaSource;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Schema unqualified names resolve against.
pub const DEFAULT_SCHEMA: &str = "main";

/// Validates SQLite connection string format.
///
/// # Errors
/// Returns a configuration error for strings that name no SQLite database.
pub fn validate_sqlite_connection_string(connection_string: &str) -> Result<()> {
    let looks_like_sqlite = connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3");
    if !looks_like_sqlite {
        return Err(SqlAuditError::configuration(
            "Connection string must be a sqlite: URL, :memory: or a database file path",
        ));
    }
    Ok(())
}

/// Whether the connection string names an in-memory database.
pub fn is_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Normalizes connection string to SQLite URL format.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }
    format!("sqlite://{}", connection_string)
}

/// Opens a SQLite pool.
///
/// # Errors
/// Returns a configuration error for malformed strings and a connection
/// error if the database cannot be opened.
pub(crate) async fn create_sqlite_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<SqlitePool> {
    validate_sqlite_connection_string(connection_string)?;

    let normalized = normalize_connection_string(connection_string);
    let mut options = SqliteConnectOptions::from_str(&normalized).map_err(|e| {
        SqlAuditError::configuration(format!("Invalid SQLite connection string: {}", e))
    })?;
    if config.read_only {
        options = options.read_only(true);
    }

    let pool_options = if is_memory(connection_string) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
    };

    pool_options
        .acquire_timeout(config.connect_timeout)
        .connect_with(options)
        .await
        .map_err(SqlAuditError::connection_failed)
}

fn quote_schema(schema: &str) -> String {
    format!("\"{}\"", schema.replace('"', "\"\""))
}

/// Live schema lookups over a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteSource {
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }
}

#[async_trait]
impl SchemaSource for SqliteSource {
    async fn schemas(&self) -> Result<Vec<String>> {
        with_timeout("database list", self.query_timeout, async {
            sqlx::query_scalar::<_, String>("SELECT name FROM pragma_database_list ORDER BY seq")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqlAuditError::execution_failed("Failed to list schemas", e))
        })
        .await
    }

    async fn tables(&self, schema: &str) -> Result<Vec<String>> {
        let query = format!(
            "SELECT name FROM {}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            quote_schema(schema)
        );
        with_timeout("table lookup", self.query_timeout, async {
            sqlx::query_scalar::<_, String>(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    SqlAuditError::execution_failed(
                        format!("Failed to list tables of schema {}", schema),
                        e,
                    )
                })
        })
        .await
    }

    async fn create_table_sql(&self, schema: &str, table: &str) -> Result<Option<String>> {
        let query = format!(
            "SELECT sql FROM {}.sqlite_master WHERE type = 'table' AND name = ?",
            quote_schema(schema)
        );
        with_timeout("definition lookup", self.query_timeout, async {
            let sql: Option<Option<String>> = sqlx::query_scalar(&query)
                .bind(table)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    SqlAuditError::execution_failed(
                        format!("Failed to read definition of {}.{}", schema, table),
                        e,
                    )
                })?;
            Ok(sql.flatten())
        })
        .await
    }
}
