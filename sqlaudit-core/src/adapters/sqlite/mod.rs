//! SQLite driver.
//!
//! # Module Structure
//! - `connection`: pool creation and live schema lookups
//!
//! Audits use the engine-neutral subset of the rule catalog; unqualified
//! names resolve against `main` unless another schema is requested.

pub mod connection;

use crate::Result;
use crate::adapters::with_timeout;
use crate::config::ConnectionConfig;
use crate::driver::{self, Driver};
use crate::error::SqlAuditError;
use crate::inspector::{CheckRegistry, Inspector, RollbackSql, SchemaSource, StatementReport};
use crate::models::{DRIVER_TYPE_SQLITE, ExecResult, Instance, Rule};
use crate::parser::{self, SqlDialect, StatementNode};
use async_trait::async_trait;
use sqlx::{Executor, SqlitePool};
use std::sync::Arc;
use tracing::{Instrument, Span, debug, info};

pub use connection::{DEFAULT_SCHEMA, SqliteSource, validate_sqlite_connection_string};

/// Registers the SQLite driver and its rule catalog.
pub(crate) fn register() {
    driver::register(
        DRIVER_TYPE_SQLITE,
        |log, instance, schema| async move {
            SqliteDriver::open(&log, &instance, schema)
                .await
                .map(|driver| Box::new(driver) as Box<dyn Driver>)
        },
        CheckRegistry::sqlite().rules(),
    );
}

/// One audit session against a SQLite database.
pub struct SqliteDriver {
    pool: SqlitePool,
    source: Arc<SqliteSource>,
    config: ConnectionConfig,
    inspector: Inspector,
    span: Span,
    closed: bool,
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("config", &self.config)
            .field("inspector", &self.inspector)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SqliteDriver {
    /// Opens the database and starts a session.
    ///
    /// # Errors
    /// Returns a configuration error for invalid input and a connection
    /// error if the database cannot be opened.
    pub async fn open(log: &Span, instance: &Instance, schema: Option<String>) -> Result<Self> {
        instance.config.validate()?;
        let span = driver::session_span(log, DRIVER_TYPE_SQLITE);
        let pool = connection::create_sqlite_connection_pool(
            instance.connection_url(),
            &instance.config,
        )
        .instrument(span.clone())
        .await?;

        let schema = schema
            .or_else(|| instance.default_schema.clone())
            .unwrap_or_else(|| DEFAULT_SCHEMA.to_string());
        span.in_scope(|| info!(schema = %schema, "Opened SQLite session"));

        let source = Arc::new(SqliteSource::new(pool.clone(), instance.config.query_timeout));
        Ok(Self {
            pool,
            source: Arc::clone(&source),
            config: instance.config.clone(),
            inspector: Inspector::new(
                source,
                CheckRegistry::sqlite(),
                SqlDialect::Sqlite,
                Some(schema),
            ),
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

fn exec_result(result: &sqlx::sqlite::SqliteQueryResult) -> ExecResult {
    ExecResult {
        rows_affected: result.rows_affected(),
        last_insert_id: Some(result.last_insert_rowid()).filter(|id| *id != 0),
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool.close().await;
        self.closed = true;
        self.span.in_scope(|| debug!("Closed SQLite session"));
    }

    async fn ping(&self) -> Result<()> {
        with_timeout("ping", self.config.query_timeout, async {
            sqlx::query_scalar::<_, i32>("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map(|_| ())
                .map_err(SqlAuditError::connection_failed)
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
        parser::parse(SqlDialect::Sqlite, sql_text)
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
