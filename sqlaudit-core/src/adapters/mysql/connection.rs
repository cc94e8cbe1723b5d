//! MySQL connection pool and live schema lookups.
//!
//! The pool connects lazily: creating a session never touches the network,
//! the first query does.

use crate::Result;
use crate::adapters::with_timeout;
use crate::config::ConnectionConfig;
use crate::error::{SqlAuditError, redact_database_url};
use crate::inspector::SchemaSource;
use crate::parser::ast::{TableName, quote_ident};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row};
use std::time::Duration;
use url::Url;

/// Validates MySQL connection string format.
///
/// # Errors
/// Returns a configuration error if the URL is malformed, uses another
/// scheme or names no host.
pub fn validate_mysql_connection_string(connection_string: &str) -> Result<()> {
    let url = Url::parse(connection_string).map_err(|e| {
        SqlAuditError::configuration(format!("Invalid MySQL connection string format: {}", e))
    })?;

    if url.scheme() != "mysql" {
        return Err(SqlAuditError::configuration(
            "Connection string must use mysql:// scheme",
        ));
    }

    if url.host_str().is_none() {
        return Err(SqlAuditError::configuration(
            "Connection string must specify a host",
        ));
    }

    Ok(())
}

/// Database named in the URL path, if any.
pub fn database_from_url(connection_string: &str) -> Option<String> {
    let url = Url::parse(connection_string).ok()?;
    let database = url.path().trim_start_matches('/');
    (!database.is_empty()).then(|| database.to_string())
}

/// Creates a lazily connecting MySQL pool.
///
/// Every connection gets the query timeout as `max_execution_time` and, for
/// read-only configurations, a read-only session.
pub(crate) fn create_mysql_connection_pool(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<MySqlPool> {
    use sqlx::Executor;

    validate_mysql_connection_string(connection_string)?;

    let query_timeout_ms = config.query_timeout.as_millis();
    let read_only = config.read_only;

    sqlx::mysql::MySqlPoolOptions::new()
        .max_connections(config.max_connections.min(100))
        .min_connections(config.min_idle_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                conn.execute(format!("SET max_execution_time = {}", query_timeout_ms).as_str())
                    .await?;
                if read_only {
                    conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                }
                Ok(())
            })
        })
        .connect_lazy(connection_string)
        .map_err(|e| {
            SqlAuditError::execution_failed(
                format!(
                    "Failed to create MySQL connection pool to {}",
                    redact_database_url(connection_string)
                ),
                e,
            )
        })
}

/// Live schema lookups over a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlSource {
    pool: MySqlPool,
    query_timeout: Duration,
}

impl MySqlSource {
    pub fn new(pool: MySqlPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }
}

#[async_trait]
impl SchemaSource for MySqlSource {
    async fn schemas(&self) -> Result<Vec<String>> {
        with_timeout("SHOW DATABASES", self.query_timeout, async {
            sqlx::query_scalar::<_, String>("SHOW DATABASES")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| SqlAuditError::execution_failed("Failed to list schemas", e))
        })
        .await
    }

    async fn tables(&self, schema: &str) -> Result<Vec<String>> {
        with_timeout("table lookup", self.query_timeout, async {
            sqlx::query_scalar::<_, String>(
                "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'",
            )
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SqlAuditError::execution_failed(
                    format!("Failed to list tables of schema {}", quote_ident(schema)),
                    e,
                )
            })
        })
        .await
    }

    async fn create_table_sql(&self, schema: &str, table: &str) -> Result<Option<String>> {
        let query = format!("SHOW CREATE TABLE {}", TableName::qualified(schema, table));
        with_timeout("SHOW CREATE TABLE", self.query_timeout, async {
            let row = sqlx::query(&query)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    SqlAuditError::execution_failed(
                        format!("Failed to read definition of {}.{}", schema, table),
                        e,
                    )
                })?;
            row.map(|row| row.try_get::<String, _>(1))
                .transpose()
                .map_err(|e| {
                    SqlAuditError::execution_failed(
                        format!("Unexpected SHOW CREATE TABLE result for {}.{}", schema, table),
                        e,
                    )
                })
        })
        .await
    }
}
