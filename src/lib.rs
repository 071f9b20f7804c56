// Customer Warehouse Loader - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod audit;      // Audit Recorder - one row per batch
pub mod config;     // Loader configuration
pub mod customer;   // Customer record + CSV ingestion
pub mod gateway;    // Storage Gateway trait + SQLite implementation
pub mod loader;     // Batch Loader - the core
pub mod reconciler; // Record Reconciler - insert vs update
pub mod report;     // Post-load completeness + audit trail
pub mod schema;     // Warehouse DDL

// Re-export commonly used types
pub use audit::{
    summarize_errors, AuditEntry, AuditRecorder,
    ERROR_SUMMARY_LIMIT, OPERATION_UPSERT, PIPELINE_VERSION,
};
pub use config::LoaderConfig;
pub use customer::{load_csv, CustomerRecord};
pub use gateway::{SqliteGateway, StorageError, StorageGateway};
pub use loader::{run_batch, BatchLoader, BatchResult};
pub use reconciler::{reconcile, RecordError, WriteKind, WriteOp};
pub use report::{completeness, recent_batches, CompletenessReport};
pub use schema::setup_warehouse;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install a `tracing` subscriber honoring `RUST_LOG` (default `info`).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
