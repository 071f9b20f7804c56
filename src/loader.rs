// 🚚 Batch Loader - reconcile a batch of customers into the warehouse
//
// Flow per batch:
//   1. fresh batch_id, start time, zeroed counters
//   2. BEGIN, then reconcile every record in input order. A failing
//      record is counted and logged; the batch keeps going.
//   3. one COMMIT for everything staged
//   4. stamp end time + duration
//   5. best-effort audit row
//
// Durability is all-or-nothing across the batch. When the trailing COMMIT
// fails, `successful_inserts`/`successful_updates` still show what was
// staged, but `committed` is false and none of it is in the warehouse.
// The same holds when the store rolls the transaction back on its own
// mid-batch (disk full, I/O error): the loader stops writing at that
// record instead of letting the remainder autocommit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::AuditRecorder;
use crate::config::LoaderConfig;
use crate::customer::{CustomerRecord, DisplayIdentity};
use crate::gateway::{SqliteGateway, StorageError, StorageGateway};
use crate::reconciler::{reconcile, RecordError, WriteKind};

// ============================================================================
// BATCH RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub total_records: usize,
    pub successful_inserts: usize,
    pub successful_updates: usize,
    pub failed_records: usize,

    /// One entry per failed record in failure order, plus at most one
    /// trailing "Critical loading error" entry.
    ///
    /// `errors.len()` can be smaller than `failed_records`: when the batch
    /// transaction cannot be opened, or the store drops it mid-batch, every
    /// record not attempted counts as failed but shares the single critical
    /// entry. A failed commit adds the critical entry without changing any
    /// counter.
    pub errors: Vec<String>,

    /// Non-fatal problems (audit write failures).
    pub warnings: Vec<String>,

    /// False when the batch transaction could not be opened, was lost
    /// mid-batch, or could not be committed. Insert/update counters then
    /// describe staged work, none of which is durable.
    pub committed: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Seconds from start to end of record processing + commit
    pub processing_time: f64,
}

impl BatchResult {
    pub(crate) fn start(total_records: usize) -> Self {
        BatchResult {
            batch_id: Uuid::new_v4(),
            total_records,
            successful_inserts: 0,
            successful_updates: 0,
            failed_records: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            committed: false,
            started_at: Utc::now(),
            finished_at: None,
            processing_time: 0.0,
        }
    }

    pub fn successful_records(&self) -> usize {
        self.successful_inserts + self.successful_updates
    }

    /// Committed with no per-record failures.
    pub fn is_success(&self) -> bool {
        self.committed && self.failed_records == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch {}: {} records, {} inserted, {} updated, {} failed, {:.2}s{}",
            self.batch_id,
            self.total_records,
            self.successful_inserts,
            self.successful_updates,
            self.failed_records,
            self.processing_time,
            if self.committed { "" } else { " (NOT COMMITTED)" }
        )
    }

    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Applied(WriteKind::Insert) => self.successful_inserts += 1,
            RecordOutcome::Applied(WriteKind::Update) => self.successful_updates += 1,
            RecordOutcome::Failed(message) => {
                self.failed_records += 1;
                self.errors.push(message);
            }
        }
    }

    fn finish(&mut self, clock: Instant) {
        self.finished_at = Some(Utc::now());
        self.processing_time = clock.elapsed().as_secs_f64();
    }
}

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
enum RecordOutcome {
    Applied(WriteKind),
    Failed(String),
}

fn describe_failure(position: usize, err: &RecordError) -> String {
    match err.customer_id() {
        Some(id) => format!("Customer {}: {}", id, err),
        None => format!("Customer {} (record #{}): {}", DisplayIdentity(None), position + 1, err),
    }
}

// ============================================================================
// BATCH LOADER
// ============================================================================

pub struct BatchLoader<G: StorageGateway> {
    gateway: G,
    recorder: AuditRecorder,
}

impl<G: StorageGateway> BatchLoader<G> {
    pub fn new(gateway: G, config: &LoaderConfig) -> Self {
        BatchLoader {
            gateway,
            recorder: AuditRecorder::new(config),
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Reconcile `records` as one batch. Always returns a finalized result.
    pub fn load_batch(&mut self, records: &[CustomerRecord]) -> BatchResult {
        let clock = Instant::now();
        let mut result = BatchResult::start(records.len());

        info!(
            batch_id = %result.batch_id,
            records = records.len(),
            "starting batch load"
        );

        match self.gateway.begin() {
            Ok(()) => {
                let mut lost_at = None;
                for (position, record) in records.iter().enumerate() {
                    let outcome = self.reconcile_one(position, record);
                    let failed = matches!(outcome, RecordOutcome::Failed(_));
                    result.record(outcome);

                    // Writes after this point would autocommit one by one
                    if failed && !self.gateway.in_transaction() {
                        lost_at = Some(position);
                        break;
                    }
                }

                match lost_at {
                    Some(position) => Self::abandon(&mut result, position),
                    None => self.commit(&mut result),
                }
            }
            Err(e) => {
                // Nothing can be staged without a transaction
                error!(batch_id = %result.batch_id, error = %e, "could not open batch transaction");
                result.failed_records = records.len();
                result.errors.push(format!("Critical loading error: {}", e));
            }
        }

        result.finish(clock);

        if let Err(e) = self.recorder.record(&mut self.gateway, &result) {
            warn!(batch_id = %result.batch_id, error = %e, "audit write failed");
            result.warnings.push(format!("Audit write failed: {}", e));
        }

        info!(
            batch_id = %result.batch_id,
            inserted = result.successful_inserts,
            updated = result.successful_updates,
            failed = result.failed_records,
            committed = result.committed,
            seconds = result.processing_time,
            "batch load finished"
        );

        result
    }

    fn reconcile_one(&mut self, position: usize, record: &CustomerRecord) -> RecordOutcome {
        match reconcile(&mut self.gateway, record) {
            Ok(kind) => {
                debug!(customer_id = ?record.identity(), op = %kind, "customer reconciled");
                RecordOutcome::Applied(kind)
            }
            Err(e) => {
                let message = describe_failure(position, &e);
                warn!(position, "{}", message);
                RecordOutcome::Failed(message)
            }
        }
    }

    /// The store rolled the batch transaction back while reconciling the
    /// record at `position`. Nothing staged so far survives and the rest of
    /// the batch is not attempted.
    fn abandon(result: &mut BatchResult, position: usize) {
        let remaining = result.total_records - position - 1;
        error!(
            batch_id = %result.batch_id,
            position,
            remaining,
            "batch transaction lost; no writes are durable"
        );
        result.failed_records += remaining;
        result.errors.push(format!(
            "Critical loading error: batch transaction rolled back by the store at record #{}; {} remaining records not attempted",
            position + 1,
            remaining
        ));
    }

    fn commit(&mut self, result: &mut BatchResult) {
        match self.gateway.commit() {
            Ok(()) => result.committed = true,
            Err(e) => {
                error!(batch_id = %result.batch_id, error = %e, "batch commit failed; no writes are durable");
                result.errors.push(format!("Critical loading error: {}", e));
                if let Err(rollback_err) = self.gateway.rollback() {
                    warn!(error = %rollback_err, "rollback after failed commit also failed");
                }
            }
        }
    }
}

/// Open a warehouse session from `config`, load one batch, close the session.
///
/// Fails only when the session itself cannot be opened; every other
/// problem is reported inside the returned `BatchResult`.
pub fn run_batch(
    config: &LoaderConfig,
    records: &[CustomerRecord],
) -> Result<BatchResult, StorageError> {
    let gateway = SqliteGateway::open(&config.database_path)?;
    let mut loader = BatchLoader::new(gateway, config);
    Ok(loader.load_batch(records))
}

// ============================================================================
// TESTS
// ============================================================================
