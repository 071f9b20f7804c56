// 🏗️ Warehouse Schema - customer_enriched + enrichment_audit
//
// Tables are created idempotently (IF NOT EXISTS). The loader never
// alters schema; it only reads and writes rows.

use rusqlite::Connection;

pub fn setup_warehouse(conn: &Connection) -> rusqlite::Result<()> {
    // ==========================================================================
    // Main customer table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS customer_enriched (
            customer_id INTEGER PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT NOT NULL,
            phone TEXT,
            postcode TEXT,
            -- Geographic enrichment
            region TEXT,
            country TEXT,
            district TEXT,
            longitude REAL,
            latitude REAL,
            geo_enriched INTEGER DEFAULT 0,
            -- Business enrichment
            company TEXT,
            company_size TEXT,
            industry TEXT,
            annual_revenue TEXT,
            is_business INTEGER DEFAULT 0,
            -- Risk assessment
            calculated_risk TEXT,
            risk_score_numeric INTEGER,
            risk_factors TEXT,
            status TEXT,
            -- ETL metadata
            processed_date TEXT DEFAULT CURRENT_TIMESTAMP,
            data_source TEXT,
            enrichment_status TEXT,
            -- Store-managed audit fields
            created_date TEXT DEFAULT CURRENT_TIMESTAMP,
            modified_date TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Audit table (append-only, one row per batch)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrichment_audit (
            audit_id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL,
            operation_type TEXT NOT NULL,
            records_processed INTEGER NOT NULL,
            records_successful INTEGER NOT NULL,
            records_failed INTEGER NOT NULL,
            processing_start TEXT NOT NULL,
            processing_end TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            error_message TEXT,
            pipeline_version TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customer_enriched_region ON customer_enriched(region)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customer_enriched_risk ON customer_enriched(calculated_risk)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customer_enriched_business ON customer_enriched(is_business)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_customer_enriched_status ON customer_enriched(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrichment_audit_batch ON enrichment_audit(batch_id)",
        [],
    )?;

    Ok(())
}
