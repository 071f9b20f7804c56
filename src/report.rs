// 📊 Post-load reporting - completeness metrics + recent batches

use anyhow::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEntry, AUDIT_COLUMNS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub total_records: i64,
    pub complete_names: i64,
    pub complete_emails: i64,
    pub geo_enriched_count: i64,
    pub business_customers: i64,
}

impl CompletenessReport {
    fn ratio(&self, value: i64) -> f64 {
        if self.total_records == 0 {
            0.0
        } else {
            value as f64 / self.total_records as f64
        }
    }

    pub fn name_ratio(&self) -> f64 {
        self.ratio(self.complete_names)
    }

    pub fn email_ratio(&self) -> f64 {
        self.ratio(self.complete_emails)
    }

    pub fn geo_ratio(&self) -> f64 {
        self.ratio(self.geo_enriched_count)
    }

    pub fn business_ratio(&self) -> f64 {
        self.ratio(self.business_customers)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} customers: {:.1}% names, {:.1}% emails, {:.1}% geo enriched, {:.1}% business",
            self.total_records,
            self.name_ratio() * 100.0,
            self.email_ratio() * 100.0,
            self.geo_ratio() * 100.0,
            self.business_ratio() * 100.0
        )
    }
}

pub fn completeness(conn: &Connection) -> Result<CompletenessReport> {
    let report = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN first_name IS NOT NULL AND first_name != '' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN email IS NOT NULL AND email != '' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN geo_enriched = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN is_business = 1 THEN 1 ELSE 0 END), 0)
         FROM customer_enriched",
        [],
        |row| {
            Ok(CompletenessReport {
                total_records: row.get(0)?,
                complete_names: row.get(1)?,
                complete_emails: row.get(2)?,
                geo_enriched_count: row.get(3)?,
                business_customers: row.get(4)?,
            })
        },
    )?;

    Ok(report)
}

/// Most recent audit rows first.
pub fn recent_batches(conn: &Connection, limit: usize) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM enrichment_audit ORDER BY processing_start DESC, audit_id DESC LIMIT ?1",
        AUDIT_COLUMNS
    ))?;

    let entries = stmt
        .query_map([limit as i64], AuditEntry::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}
