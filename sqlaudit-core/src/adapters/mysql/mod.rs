//! MySQL driver.
//!
//! # Module Structure
//! - `connection`: pool creation and live schema lookups
//!
//! Audits use the full MySQL rule catalog. Unqualified table names resolve
//! against the session schema: the one passed to `new_driver`, else the
//! instance default, else the database in the connection URL.

pub mod connection;

use crate::Result;
use crate::adapters::with_timeout;
use crate::config::ConnectionConfig;
use crate::driver::{self, Driver};
use crate::error::SqlAuditError;
use crate::inspector::{CheckRegistry, Inspector, RollbackSql, SchemaSource, StatementReport};
use crate::models::{DRIVER_TYPE_MYSQL, ExecResult, Instance, Rule};
use crate::parser::{self, SqlDialect, StatementNode};
use async_trait::async_trait;
use sqlx::{Executor, MySqlPool};
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info};

pub use connection::{MySqlSource, database_from_url, validate_mysql_connection_string};

/// Registers the MySQL driver and its rule catalog.
pub(crate) fn register() {
    driver::register(
        DRIVER_TYPE_MYSQL,
        |log, instance, schema| async move {
            MySqlDriver::open(&log, &instance, schema)
                .map(|driver| Box::new(driver) as Box<dyn Driver>)
        },
        CheckRegistry::mysql().rules(),
    );
}

/// One audit session against a MySQL instance.
pub struct MySqlDriver {
    pool: MySqlPool,
    source: Arc<MySqlSource>,
    config: ConnectionConfig,
    inspector: Inspector,
    span: Span,
    closed: bool,
}

impl std::fmt::Debug for MySqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlDriver")
            .field("config", &self.config)
            .field("pool_size", &self.pool.size())
            .field("inspector", &self.inspector)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl MySqlDriver {
    /// Opens a session. No connection is made until the first live call.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid URL or configuration.
    pub fn open(log: &Span, instance: &Instance, schema: Option<String>) -> Result<Self> {
        instance.config.validate()?;
        let pool = connection::create_mysql_connection_pool(
            instance.connection_url(),
            &instance.config,
        )?;

        let schema = schema
            .or_else(|| instance.default_schema.clone())
            .or_else(|| database_from_url(instance.connection_url()));
        let span = driver::session_span(log, DRIVER_TYPE_MYSQL);
        span.in_scope(|| {
            info!(
                url = %instance.redacted_url(),
                schema = schema.as_deref().unwrap_or_default(),
                "Opened MySQL session"
            );
        });

        let source = Arc::new(MySqlSource::new(pool.clone(), instance.config.query_timeout));
        Ok(Self {
            pool,
            source: Arc::clone(&source),
            config: instance.config.clone(),
            inspector: Inspector::new(source, CheckRegistry::mysql(), SqlDialect::MySql, schema),
            span,
            closed: false,
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(SqlAuditError::configuration(
                "session is read-only, statements cannot be executed",
            ));
        }
        Ok(())
    }
}

fn exec_result(result: &sqlx::mysql::MySqlQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: i64::try_from(result.last_insert_id())
            .ok()
            .filter(|id| *id != 0),
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool.close().await;
        self.closed = true;
        self.span.in_scope(|| debug!("Closed MySQL session"));
    }

    async fn ping(&self) -> Result<()> {
        with_timeout("ping", self.config.query_timeout, async {
            let value: i64 = sqlx::query_scalar("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map_err(SqlAuditError::connection_failed)?;
            if value != 1 {
                return Err(SqlAuditError::configuration(
                    "Basic connectivity test failed: unexpected result",
                ));
            }
            Ok(())
        })
        .instrument(self.span.clone())
        .await
    }

    async fn exec(&self, query: &str) -> Result<ExecResult> {
        self.ensure_writable()?;
        with_timeout("exec", self.config.query_timeout, async {
            let result = self
                .pool
                .execute(query)
                .await
                .map_err(|e| SqlAuditError::execution_failed("Failed to execute statement", e))?;
            Ok(exec_result(&result))
        })
        .instrument(self.span.clone())
        .await
    }

    async fn tx(&self, queries: &[String]) -> Result<Vec<ExecResult>> {
        self.ensure_writable()?;
        with_timeout("transaction", self.config.query_timeout, async {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(SqlAuditError::connection_failed)?;
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                // Dropping `tx` on error rolls it back
                let result = (&mut *tx).execute(query.as_str()).await.map_err(|e| {
                    SqlAuditError::execution_failed("Transaction statement failed", e)
                })?;
                results.push(exec_result(&result));
            }
            tx.commit()
                .await
                .map_err(|e| SqlAuditError::execution_failed("Failed to commit transaction", e))?;
            Ok(results)
        })
        .instrument(self.span.clone())
        .await
    }

    async fn schemas(&self) -> Result<Vec<String>> {
        self.source.schemas().instrument(self.span.clone()).await
    }

    async fn parse(&self, sql_text: &str) -> Result<Vec<StatementNode>> {
        parser::parse(SqlDialect::MySql, sql_text)
    }

    async fn audit(&mut self, rules: &[Rule], sql: &str) -> Result<StatementReport> {
        let span = self.span.clone();
        self.inspector.audit(rules, sql).instrument(span).await
    }

    async fn gen_rollback_sql(&mut self, sql: &str) -> Result<RollbackSql> {
        let span = self.span.clone();
        self.inspector.gen_rollback_sql(sql).instrument(span).await
    }
}
