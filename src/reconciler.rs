// ⚖️ Record Reconciler - insert or update, decided by identity
//
// One record in, exactly one write out:
//   identity exists  → UPDATE every mutable field, keyed by customer_id
//   identity absent  → INSERT identity + every mutable field
//
// Failures are not caught here. They come back as `RecordError` carrying
// the identity and the underlying cause so the loader can attribute them.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::customer::CustomerRecord;
use crate::gateway::{StorageError, StorageGateway};

// ============================================================================
// WRITE OPERATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteKind {
    Insert,
    Update,
}

impl WriteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteKind::Insert => "insert",
            WriteKind::Update => "update",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single write a record reconciles to.
#[derive(Debug, Clone, Copy)]
pub struct WriteOp<'a> {
    pub kind: WriteKind,
    pub customer_id: i64,
    pub record: &'a CustomerRecord,
}

impl<'a> WriteOp<'a> {
    /// Pick the write for a record given whether its identity already exists.
    pub fn plan(customer_id: i64, record: &'a CustomerRecord, exists: bool) -> Self {
        let kind = if exists {
            WriteKind::Update
        } else {
            WriteKind::Insert
        };
        WriteOp {
            kind,
            customer_id,
            record,
        }
    }

    pub fn apply<G: StorageGateway + ?Sized>(&self, gateway: &mut G) -> Result<(), StorageError> {
        match self.kind {
            WriteKind::Insert => gateway.insert(self.customer_id, self.record),
            WriteKind::Update => gateway.update(self.customer_id, self.record),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Step at which a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExistenceCheck,
    Write(WriteKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::ExistenceCheck => f.write_str("existence check"),
            Stage::Write(kind) => write!(f, "{}", kind),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("missing required customer_id")]
    MissingIdentity,

    #[error("{stage} failed: {source}")]
    Storage {
        customer_id: i64,
        stage: Stage,
        #[source]
        source: StorageError,
    },
}

impl RecordError {
    pub fn customer_id(&self) -> Option<i64> {
        match self {
            RecordError::MissingIdentity => None,
            RecordError::Storage { customer_id, .. } => Some(*customer_id),
        }
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

/// Decide and apply the write for one record.
///
/// The write is a single statement, so it either lands in the batch
/// transaction or it doesn't; there is no partially applied record.
pub fn reconcile<G: StorageGateway + ?Sized>(
    gateway: &mut G,
    record: &CustomerRecord,
) -> Result<WriteKind, RecordError> {
    let customer_id = record.identity().ok_or(RecordError::MissingIdentity)?;

    let exists = gateway
        .exists(customer_id)
        .map_err(|source| RecordError::Storage {
            customer_id,
            stage: Stage::ExistenceCheck,
            source,
        })?;

    let op = WriteOp::plan(customer_id, record, exists);

    op.apply(gateway).map_err(|source| RecordError::Storage {
        customer_id,
        stage: Stage::Write(op.kind),
        source,
    })?;

    Ok(op.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SqliteGateway;

    fn customer(id: i64) -> CustomerRecord {
        CustomerRecord::new(id, "Katherine", "Johnson", "kj@example.com")
    }

    #[test]
    fn test_plan_branches_on_existence() {
        let record = customer(1);

        assert_eq!(WriteOp::plan(1, &record, false).kind, WriteKind::Insert);
        assert_eq!(WriteOp::plan(1, &record, true).kind, WriteKind::Update);
    }

    #[test]
    fn test_absent_identity_is_inserted() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();

        let kind = reconcile(&mut gateway, &customer(1)).unwrap();

        assert_eq!(kind, WriteKind::Insert);
        assert_eq!(gateway.count_customers().unwrap(), 1);
    }

    #[test]
    fn test_existing_identity_is_updated() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        reconcile(&mut gateway, &customer(1)).unwrap();

        let mut changed = customer(1);
        changed.status = Some("Inactive".to_string());
        let kind = reconcile(&mut gateway, &changed).unwrap();

        assert_eq!(kind, WriteKind::Update);
        assert_eq!(gateway.count_customers().unwrap(), 1);
        let stored = gateway.get_customer(1).unwrap().unwrap();
        assert_eq!(stored.status.as_deref(), Some("Inactive"));
    }

    #[test]
    fn test_missing_identity_never_touches_storage() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let mut record = customer(1);
        record.customer_id = None;

        let err = reconcile(&mut gateway, &record).unwrap_err();

        assert!(matches!(err, RecordError::MissingIdentity));
        assert_eq!(err.customer_id(), None);
        assert_eq!(gateway.count_customers().unwrap(), 0);
    }

    #[test]
    fn test_write_failure_carries_identity_and_cause() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let mut record = customer(3);
        record.first_name = None;

        let err = reconcile(&mut gateway, &record).unwrap_err();

        assert_eq!(err.customer_id(), Some(3));
        match &err {
            RecordError::Storage { stage, source, .. } => {
                assert_eq!(*stage, Stage::Write(WriteKind::Insert));
                assert!(matches!(source, StorageError::Constraint(_)));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().starts_with("insert failed: constraint violation"));
    }
}
