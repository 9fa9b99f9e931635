use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use crate::config::SafetyConfig;
use crate::context::RuntimeContext;
use crate::db::executor::{BoundedExecutor, ExecutorError};
use crate::models::ValidationResult;
use crate::safety::SqlGate;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("{0}")]
    Input(String),
    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ExecutorError> for ValidateError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Unavailable(db_err) => ValidateError::DatabaseUnavailable(db_err.to_string()),
            ExecutorError::Worker(join_err) => {
                error!("Database worker task failed: {}", join_err);
                ValidateError::Internal(join_err.to_string())
            }
        }
    }
}

/// Gate, then dry-run, then bounded execution.
pub struct Validator {
    gate: SqlGate,
    executor: BoundedExecutor,
}

impl Validator {
    pub fn new(safety: &SafetyConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            gate: SqlGate::new(safety)?,
            executor: BoundedExecutor::default(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_executor(safety: &SafetyConfig, executor: BoundedExecutor) -> Result<Self, regex::Error> {
        Ok(Self {
            gate: SqlGate::new(safety)?,
            executor,
        })
    }

    pub async fn validate(
        &self,
        context: &RuntimeContext,
        sql: &str,
        execute: bool,
    ) -> Result<ValidationResult, ValidateError> {
        if sql.trim().is_empty() {
            return Err(ValidateError::Input("SQL is required".to_string()));
        }

        let query = match self.gate.check(sql) {
            Ok(query) => query,
            Err(rejection) => {
                info!("Rejected query: {}", rejection);
                return Ok(ValidationResult::rejected(rejection.to_string()));
            }
        };

        let pool = context
            .pool
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| ValidateError::DatabaseUnavailable("no database connection is configured".to_string()))?;

        info!("Validating query (execute: {}): {}", execute, query.sql);
        Ok(self.executor.run(pool, &query, execute).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::db_pool::ConnectionPool;
    use crate::db::executor::testing::{Behavior, DownPool, FakePool};
    use crate::models::{ErrorKind, SchemaMap};
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(&SafetyConfig::default()).unwrap()
    }

    fn context_with(pool: Arc<dyn ConnectionPool>) -> RuntimeContext {
        RuntimeContext::new(SchemaMap::default(), Some(pool))
    }

    fn rows() -> Behavior {
        Behavior::Rows(vec![json!({"id": 1}).as_object().unwrap().clone()])
    }

    #[tokio::test]
    async fn test_write_statements_never_reach_the_database() {
        for sql in [
            "DROP TABLE users",
            "SELECT * FROM t; DELETE FROM t",
            "SELECT * FROM t WHERE 1=1 OR truncate",
            "select id from t -- fine\n; insert into t values (1)",
            "SELECT * FROM t WHERE x = 1 UPDATE t SET a = 1",
        ] {
            let pool = FakePool::new(rows());
            let result = validator()
                .validate(&context_with(pool.clone()), sql, true)
                .await
                .unwrap();

            assert!(!result.is_valid, "{}", sql);
            assert!(!result.syntax_valid);
            assert_eq!(result.error_kind, Some(ErrorKind::InvalidQuery));
            assert_eq!(pool.acquired(), 0, "{}", sql);
        }
    }

    #[tokio::test]
    async fn test_executes_normalized_statement() {
        let pool = FakePool::new(rows());
        let result = validator()
            .validate(&context_with(pool.clone()), "SELECT id FROM orders;", true)
            .await
            .unwrap();

        assert!(result.is_valid);
        assert!(result.limited);
        assert_eq!(result.sql.as_deref(), Some("SELECT id FROM orders LIMIT 50"));
        assert_eq!(result.row_count, Some(1));
        assert!(result.rows.is_some());
        assert_eq!(
            pool.explained.lock().unwrap().as_slice(),
            ["SELECT id FROM orders LIMIT 50"]
        );
        assert_eq!(pool.released(), 1);
    }

    #[tokio::test]
    async fn test_rows_only_returned_when_executing() {
        let pool = FakePool::new(rows());
        let result = validator()
            .validate(&context_with(pool), "SELECT id FROM orders LIMIT 10", false)
            .await
            .unwrap();

        assert!(result.is_valid);
        assert!(!result.limited);
        assert!(result.rows.is_none());
        assert_eq!(result.row_count, Some(1));
    }

    #[tokio::test]
    async fn test_missing_pool_is_database_unavailable() {
        let err = validator()
            .validate(&RuntimeContext::default(), "SELECT 1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::DatabaseUnavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_pool_still_rejects_unsafe_sql() {
        let result = validator()
            .validate(&RuntimeContext::default(), "DROP TABLE t", false)
            .await
            .unwrap();
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidQuery));
    }

    #[tokio::test]
    async fn test_acquire_failure_is_database_unavailable() {
        let err = validator()
            .validate(&context_with(Arc::new(DownPool)), "SELECT 1", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::DatabaseUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_sql_is_input_error() {
        let err = validator()
            .validate(&RuntimeContext::default(), "  \n ", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidateError::Input(_)));
    }

    #[tokio::test]
    async fn test_timeout_verdict_uses_fixed_message() {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let pool = FakePool::new(Behavior::Hang(Arc::new(std::sync::Mutex::new(rx))));
        let validator = Validator::with_executor(
            &SafetyConfig::default(),
            BoundedExecutor::with_timeout(std::time::Duration::from_millis(50)),
        )
        .unwrap();

        let result = validator
            .validate(&context_with(pool.clone()), "SELECT * FROM big", false)
            .await
            .unwrap();

        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        assert_eq!(result.error_message.as_deref(), Some("Query timeout (30s)"));
        assert!(result.syntax_valid);

        drop(tx);
        while pool.released() == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(pool.released(), 1);
    }

    #[tokio::test]
    async fn test_host_files_are_never_returned() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret.csv");
        std::fs::write(&secret, "user,password\nroot,hunter2\n").unwrap();
        let pool: Arc<dyn ConnectionPool> =
            Arc::new(crate::db::db_pool::build_pool(":memory:", 1).unwrap());

        let sql = format!("SELECT * FROM '{}'", secret.display());
        let result = validator()
            .validate(&context_with(pool), &sql, true)
            .await
            .unwrap();

        assert!(!result.is_valid);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidQuery));
        assert!(result.rows.is_none());
        assert!(!serde_json::to_string(&result).unwrap().contains("hunter2"));
    }
}
