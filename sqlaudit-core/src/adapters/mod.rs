//! Built-in engine drivers.
//!
//! # Module Structure
//! - `mysql`: MySQL driver over a lazily connected `sqlx` pool
//! - `sqlite`: SQLite driver over a file or in-memory database
//!
//! Each engine is behind its cargo feature of the same name.

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use crate::Result;
use crate::error::SqlAuditError;
use std::future::Future;
use std::sync::Once;
use std::time::Duration;

/// Registers every driver compiled into this build. Safe to call more than
/// once; only the first call registers.
pub fn register_builtin_drivers() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        #[cfg(feature = "mysql")]
        mysql::register();
        #[cfg(feature = "sqlite")]
        sqlite::register();
    });
}

/// Runs a live-engine call, failing with [`SqlAuditError::Timeout`] once
/// `after` has elapsed.
pub(crate) async fn with_timeout<T, F>(operation: &str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(SqlAuditError::timeout(operation, after)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_elapses() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        };
        let result = with_timeout("schema lookup", Duration::from_secs(1), slow).await;
        assert!(matches!(result, Err(SqlAuditError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let result = with_timeout("ping", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.ok(), Some(7));
    }
}
