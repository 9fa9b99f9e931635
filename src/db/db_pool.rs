use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use duckdb::{AccessMode, Config, Connection};
use r2d2::{ManageConnection, Pool, PooledConnection};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::Row;

/// A database failure as reported by the backend.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DbError {
    /// Backend error code, when the driver exposes one
    pub code: Option<String>,
    pub message: String,
}

impl DbError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        match err {
            duckdb::Error::DuckDBFailure(ffi_err, message) => Self {
                code: Some(format!("{:?}", ffi_err.code)),
                message: message.unwrap_or_else(|| ffi_err.to_string()),
            },
            other => Self::new(other.to_string()),
        }
    }
}

impl From<r2d2::Error> for DbError {
    fn from(err: r2d2::Error) -> Self {
        Self::new(format!("Failed to acquire a database connection: {}", err))
    }
}

impl From<arrow::error::ArrowError> for DbError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::new(format!("Failed to convert result rows: {}", err))
    }
}

/// One checked-out connection. Dropping it hands it back to its pool.
pub trait QueryConnection: Send {
    /// Dry-run: `EXPLAIN <sql>`.
    fn explain(&mut self, sql: &str) -> Result<(), DbError>;

    fn fetch(&mut self, sql: &str) -> Result<Vec<Row>, DbError>;
}

pub trait ConnectionPool: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn QueryConnection>, DbError>;
}

/// Hands out connections to one shared database instance.
///
/// Every checkout is a clone of the root connection, so `:memory:` pools see
/// a single database no matter their size. File databases open read-only and
/// no connection may touch the host filesystem or network.
pub struct DuckDBConnectionManager {
    connection_string: String,
    root: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(connection_string: String) -> Result<Self, duckdb::Error> {
        let config = Config::default().enable_external_access(false)?;
        let root = if connection_string == ":memory:" {
            // DuckDB refuses read-only in-memory databases
            Connection::open_in_memory_with_flags(config)?
        } else {
            Connection::open_with_flags(
                &connection_string,
                config.access_mode(AccessMode::ReadOnly)?,
            )?
        };

        Ok(Self {
            connection_string,
            root: Mutex::new(root),
        })
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let root = self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        root.try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

pub type DuckDBPool = Pool<DuckDBConnectionManager>;

pub fn build_pool(connection_string: &str, max_size: u32) -> Result<DuckDBPool, DbError> {
    let manager = DuckDBConnectionManager::new(connection_string.to_string())?;
    debug!(
        "Opened database {} with external access disabled",
        manager.connection_string()
    );

    Ok(Pool::builder()
        .max_size(max_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?)
}

impl ConnectionPool for DuckDBPool {
    fn acquire(&self) -> Result<Box<dyn QueryConnection>, DbError> {
        Ok(Box::new(self.get()?))
    }
}

impl QueryConnection for PooledConnection<DuckDBConnectionManager> {
    fn explain(&mut self, sql: &str) -> Result<(), DbError> {
        let mut stmt = self.prepare(&format!("EXPLAIN {}", sql))?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
        Ok(())
    }

    fn fetch(&mut self, sql: &str) -> Result<Vec<Row>, DbError> {
        let mut stmt = self.prepare(sql)?;
        let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
        debug!("Query returned {} record batches", batches.len());
        batches_to_rows(&batches)
    }
}

/// Converts Arrow record batches into JSON records, keeping NULL columns.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, DbError> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;

    let buffer = writer.into_inner();
    serde_json::from_slice(&buffer)
        .map_err(|e| DbError::new(format!("Failed to decode result rows: {}", e)))
}
