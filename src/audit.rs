use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::models::GenerationSource;

#[derive(Debug, Error)]
#[error("audit log unavailable: {0}")]
pub struct AuditError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    NoPatternMatch,
    ValueExtractionFailure,
}

/// One terminal generation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub sql: Option<String>,
    pub status: AuditStatus,
    pub source: Option<GenerationSource>,
    pub confidence: Option<f64>,
    pub latency_ms: u64,
}

/// Sink for generation audit records. Callers treat failures as non-fatal.
pub trait AuditLog: Send + Sync {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

/// Emits each entry as a structured event on the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        info!(
            target: "audit",
            timestamp = %entry.timestamp.to_rfc3339(),
            prompt = %entry.prompt,
            sql = entry.sql.as_deref().unwrap_or(""),
            status = ?entry.status,
            source = ?entry.source,
            confidence = entry.confidence.unwrap_or(0.0),
            latency_ms = entry.latency_ms,
            "generation finished"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryAuditLog {
        pub entries: Mutex<Vec<AuditEntry>>,
    }

    impl AuditLog for MemoryAuditLog {
        fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    pub struct BrokenAuditLog;

    impl AuditLog for BrokenAuditLog {
        fn record(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError("disk full".to_string()))
        }
    }
}
