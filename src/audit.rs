// 📝 Audit Recorder - one summary row per batch
//
// Append-only: an entry is built from a finalized BatchResult, written
// once, and never read back or updated by the loader.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::LoaderConfig;
use crate::gateway::{StorageError, StorageGateway};
use crate::loader::BatchResult;

pub const PIPELINE_VERSION: &str = "ETL_Pipeline_v1.0";
pub const OPERATION_UPSERT: &str = "UPSERT";

/// Errors kept in the audit summary. The full list lives in the BatchResult.
pub const ERROR_SUMMARY_LIMIT: usize = 5;

/// Width of the `error_message` column.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 1000;

// ============================================================================
// AUDIT ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub batch_id: Uuid,
    pub operation_type: String,
    pub records_processed: i64,
    pub records_successful: i64,
    pub records_failed: i64,
    pub processing_start: DateTime<Utc>,
    pub processing_end: DateTime<Utc>,
    pub duration_seconds: i64,
    pub error_message: Option<String>,
    pub pipeline_version: String,
}

/// Column list matching `AuditEntry::from_row`.
pub const AUDIT_COLUMNS: &str = "batch_id, operation_type, records_processed, records_successful, \
     records_failed, processing_start, processing_end, duration_seconds, error_message, pipeline_version";

impl AuditEntry {
    pub fn success_rate(&self) -> f64 {
        if self.records_processed == 0 {
            return 0.0;
        }
        self.records_successful as f64 / self.records_processed as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        let id = self.batch_id.to_string();
        format!(
            "Batch: {}... | {} records | {:.1}% success | {}s",
            &id[..8],
            self.records_processed,
            self.success_rate(),
            self.duration_seconds
        )
    }

    pub(crate) fn start_text(&self) -> String {
        self.processing_start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub(crate) fn end_text(&self) -> String {
        self.processing_end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let batch_id: String = row.get(0)?;
        let start: String = row.get(5)?;
        let end: String = row.get(6)?;

        Ok(AuditEntry {
            batch_id: Uuid::parse_str(&batch_id).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
            })?,
            operation_type: row.get(1)?,
            records_processed: row.get(2)?,
            records_successful: row.get(3)?,
            records_failed: row.get(4)?,
            processing_start: parse_timestamp(5, &start)?,
            processing_end: parse_timestamp(6, &end)?,
            duration_seconds: row.get(7)?,
            error_message: row.get(8)?,
            pipeline_version: row.get(9)?,
        })
    }
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// First `limit` errors joined with "; ", clipped to the column width.
/// `None` when there is nothing to report.
pub fn summarize_errors(errors: &[String], limit: usize) -> Option<String> {
    if errors.is_empty() || limit == 0 {
        return None;
    }

    let joined = errors
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");

    if joined.chars().count() > ERROR_MESSAGE_MAX_CHARS {
        Some(joined.chars().take(ERROR_MESSAGE_MAX_CHARS).collect())
    } else {
        Some(joined)
    }
}

// ============================================================================
// AUDIT RECORDER
// ============================================================================

pub struct AuditRecorder {
    operation_type: String,
    pipeline_version: String,
    error_summary_limit: usize,
}

impl AuditRecorder {
    pub fn new(config: &LoaderConfig) -> Self {
        AuditRecorder {
            operation_type: config.operation_type.clone(),
            pipeline_version: config.pipeline_version.clone(),
            error_summary_limit: config.error_summary_limit,
        }
    }

    /// Build the audit row for a finalized batch.
    pub fn build_entry(&self, result: &BatchResult) -> AuditEntry {
        let end = result.finished_at.unwrap_or(result.started_at);

        AuditEntry {
            batch_id: result.batch_id,
            operation_type: self.operation_type.clone(),
            records_processed: result.total_records as i64,
            records_successful: result.successful_records() as i64,
            records_failed: result.failed_records as i64,
            processing_start: result.started_at,
            processing_end: end,
            duration_seconds: (end - result.started_at).num_seconds(),
            error_message: summarize_errors(&result.errors, self.error_summary_limit),
            pipeline_version: self.pipeline_version.clone(),
        }
    }

    /// Persist the audit row for `result`.
    pub fn record<G: StorageGateway + ?Sized>(
        &self,
        gateway: &mut G,
        result: &BatchResult,
    ) -> Result<AuditEntry, StorageError> {
        let entry = self.build_entry(result);
        gateway.insert_audit_entry(&entry)?;
        tracing::debug!(batch_id = %entry.batch_id, "audit entry written");
        Ok(entry)
    }
}
