// 🗄️ Storage Gateway - the loader's only door into the warehouse
//
// The loader talks to storage exclusively through `StorageGateway`.
// `SqliteGateway` is the shipped implementation: one connection, one
// explicit transaction per batch, audit row written after COMMIT in
// autocommit mode so it never rides on the batch's durability.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::{AuditEntry, AUDIT_COLUMNS};
use crate::customer::{CustomerRecord, MUTABLE_COLUMNS};
use crate::schema::setup_warehouse;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage session could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A row violated a table constraint (NOT NULL, PRIMARY KEY, ...).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other statement failure.
    #[error("query failed: {0}")]
    Query(String),

    /// BEGIN / COMMIT / ROLLBACK failed.
    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Constraint(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        }
    }
}

// ============================================================================
// GATEWAY TRAIT
// ============================================================================

/// Parameterized operations the loader needs from a relational store.
///
/// Implementations must give read-your-writes inside the transaction
/// opened by `begin`: an `exists` after an `insert` in the same batch sees
/// the pending row. Access is serial; one gateway serves one batch at a time.
pub trait StorageGateway {
    /// Open the single logical transaction for a batch.
    fn begin(&mut self) -> Result<(), StorageError>;

    fn exists(&mut self, customer_id: i64) -> Result<bool, StorageError>;

    fn insert(&mut self, customer_id: i64, record: &CustomerRecord) -> Result<(), StorageError>;

    fn update(&mut self, customer_id: i64, record: &CustomerRecord) -> Result<(), StorageError>;

    /// Make every staged write of the batch durable at once.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Discard staged writes. Used only after a failed commit.
    fn rollback(&mut self) -> Result<(), StorageError>;

    /// Whether the batch transaction is still open. Some failures (disk
    /// full, I/O error, out of memory) make the store roll it back on its
    /// own; writes issued after that would land outside the batch.
    fn in_transaction(&self) -> bool;

    /// Append one audit row, outside the batch transaction.
    fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StorageError>;
}

// ============================================================================
// SQLITE GATEWAY
// ============================================================================

pub struct SqliteGateway {
    conn: Connection,
    insert_sql: String,
    update_sql: String,
}

impl SqliteGateway {
    /// Open (or create) a warehouse file and make sure the tables exist.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Connection(format!("{}: {}", path.display(), e)))?;

        // WAL for crash recovery on file-backed warehouses
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        setup_warehouse(&conn).map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(SqliteGateway {
            conn,
            insert_sql: build_insert_sql(),
            update_sql: build_update_sql(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn get_customer(&self, customer_id: i64) -> Result<Option<CustomerRecord>, StorageError> {
        let sql = format!(
            "SELECT customer_id, {} FROM customer_enriched WHERE customer_id = ?1",
            MUTABLE_COLUMNS.join(", ")
        );

        let record = self
            .conn
            .query_row(&sql, [customer_id], CustomerRecord::from_row)
            .optional()?;

        Ok(record)
    }

    pub fn count_customers(&self) -> Result<i64, StorageError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM customer_enriched", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn audit_entry(&self, batch_id: Uuid) -> Result<Option<AuditEntry>, StorageError> {
        let sql = format!(
            "SELECT {} FROM enrichment_audit WHERE batch_id = ?1",
            AUDIT_COLUMNS
        );

        let entry = self
            .conn
            .query_row(&sql, [batch_id.to_string()], AuditEntry::from_row)
            .optional()?;

        Ok(entry)
    }
}

fn build_insert_sql() -> String {
    let placeholders = (1..=MUTABLE_COLUMNS.len() + 1)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO customer_enriched (customer_id, {}) VALUES ({})",
        MUTABLE_COLUMNS.join(", "),
        placeholders
    )
}

fn build_update_sql() -> String {
    let assignments = MUTABLE_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE customer_enriched SET {}, modified_date = CURRENT_TIMESTAMP WHERE customer_id = ?{}",
        assignments,
        MUTABLE_COLUMNS.len() + 1
    )
}

impl StorageGateway for SqliteGateway {
    fn begin(&mut self) -> Result<(), StorageError> {
        self.conn
            .execute_batch("BEGIN")
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }

    fn exists(&mut self, customer_id: i64) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM customer_enriched WHERE customer_id = ?1",
            params![customer_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn insert(&mut self, customer_id: i64, record: &CustomerRecord) -> Result<(), StorageError> {
        let payload = record.payload();
        let values = std::iter::once(&customer_id as &dyn rusqlite::ToSql).chain(payload);

        self.conn.execute(&self.insert_sql, params_from_iter(values))?;
        Ok(())
    }

    fn update(&mut self, customer_id: i64, record: &CustomerRecord) -> Result<(), StorageError> {
        let payload = record.payload();
        let values = payload
            .into_iter()
            .chain(std::iter::once(&customer_id as &dyn rusqlite::ToSql));

        let changed = self.conn.execute(&self.update_sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(StorageError::Query(format!(
                "no row for customer_id {}",
                customer_id
            )));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if self.conn.is_autocommit() {
            return Ok(());
        }
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(|e| StorageError::Transaction(e.to_string()))
    }

    fn insert_audit_entry(&mut self, entry: &AuditEntry) -> Result<(), StorageError> {
        self.conn.execute(
            &format!(
                "INSERT INTO enrichment_audit ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                AUDIT_COLUMNS
            ),
            params![
                entry.batch_id.to_string(),
                entry.operation_type,
                entry.records_processed,
                entry.records_successful,
                entry.records_failed,
                entry.start_text(),
                entry.end_text(),
                entry.duration_seconds,
                entry.error_message,
                entry.pipeline_version,
            ],
        )?;
        Ok(())
    }
}
