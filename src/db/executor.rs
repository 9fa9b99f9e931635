use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

use crate::db::db_pool::{ConnectionPool, DbError, QueryConnection};
use crate::models::{ErrorKind, ValidationResult};
use crate::safety::SanitizedQuery;

pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const QUERY_TIMEOUT_MESSAGE: &str = "Query timeout (30s)";

const SYNTAX_HINT: &str = "Please check your SQL syntax";
const EXECUTION_HINT: &str = "Please check that the table and column names exist";

/// Failures that happen before either stage could run.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("database unavailable: {0}")]
    Unavailable(DbError),
    #[error("database worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Dry-runs and then executes a gated statement on one pooled connection.
///
/// The connection is owned by whichever blocking task is currently using it
/// and goes back to the pool when that task drops it, so every path returns
/// it exactly once. On timeout the query is abandoned, not cancelled: DuckDB
/// finishes it on the worker thread and only then is the connection released.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    timeout: Duration,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self {
            timeout: QUERY_TIMEOUT,
        }
    }
}

impl BoundedExecutor {
    #[cfg(test)]
    pub(crate) fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn run(
        &self,
        pool: Arc<dyn ConnectionPool>,
        query: &SanitizedQuery,
        include_rows: bool,
    ) -> Result<ValidationResult, ExecutorError> {
        let started = Instant::now();
        let base = ValidationResult {
            sql: Some(query.sql.clone()),
            limited: query.limited,
            ..ValidationResult::default()
        };

        // Stage A: acquire and dry-run. The connection comes back only on success.
        let sql = query.sql.clone();
        let dry_run = tokio::task::spawn_blocking(
            move || -> Result<Result<Box<dyn QueryConnection>, DbError>, DbError> {
                let mut conn = pool.acquire()?;
                Ok(conn.explain(&sql).map(|_| conn))
            },
        )
        .await?;

        let mut conn = match dry_run {
            Err(acquire_err) => return Err(ExecutorError::Unavailable(acquire_err)),
            Ok(Err(syntax_err)) => {
                info!("Dry-run rejected query: {}", syntax_err);
                return Ok(ValidationResult {
                    syntax_valid: false,
                    execution_time_ms: elapsed_ms(started),
                    error_kind: Some(ErrorKind::Syntax),
                    error_message: Some(format!("SQL syntax error: {}", syntax_err.message)),
                    error_code: syntax_err.code,
                    hint: Some(SYNTAX_HINT.to_string()),
                    ..base
                });
            }
            Ok(Ok(conn)) => conn,
        };
        debug!("Dry-run passed for: {}", query.sql);

        // Stage B: real execution raced against the deadline.
        let sql = query.sql.clone();
        let execution = tokio::task::spawn_blocking(move || conn.fetch(&sql));

        match tokio::time::timeout(self.timeout, execution).await {
            Err(_elapsed) => {
                warn!(
                    "Query exceeded {:?} and was abandoned: {}",
                    self.timeout, query.sql
                );
                Ok(ValidationResult {
                    syntax_valid: true,
                    execution_time_ms: elapsed_ms(started),
                    error_kind: Some(ErrorKind::Timeout),
                    error_message: Some(QUERY_TIMEOUT_MESSAGE.to_string()),
                    hint: Some("Try narrowing the query with filters or a smaller LIMIT".to_string()),
                    ..base
                })
            }
            Ok(joined) => match joined? {
                Err(exec_err) => {
                    info!("Query failed during execution: {}", exec_err);
                    Ok(ValidationResult {
                        syntax_valid: true,
                        execution_time_ms: elapsed_ms(started),
                        error_kind: Some(ErrorKind::Execution),
                        error_message: Some(format!("Query execution failed: {}", exec_err.message)),
                        error_code: exec_err.code,
                        hint: Some(EXECUTION_HINT.to_string()),
                        ..base
                    })
                }
                Ok(rows) => {
                    let row_count = rows.len();
                    let execution_time_ms = elapsed_ms(started);
                    info!(
                        "Query validated: {} rows in {}ms (limited: {})",
                        row_count, execution_time_ms, query.limited
                    );
                    Ok(ValidationResult {
                        is_valid: true,
                        syntax_valid: true,
                        rows: include_rows.then_some(rows),
                        row_count: Some(row_count),
                        execution_time_ms,
                        ..base
                    })
                }
            },
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
