// End-to-end: CSV → batch load → warehouse + audit trail

use customer_warehouse::{
    completeness, load_csv, recent_batches, run_batch, LoaderConfig, SqliteGateway,
};
use std::io::Write;

const HEADER: &str = "customer_id,first_name,last_name,email,phone,postcode,region,country,district,longitude,latitude,geo_enriched,company,company_size,industry,annual_revenue,is_business,calculated_risk,risk_score_numeric,risk_factors,status,processed_date,data_source,enrichment_status";

fn write_csv(dir: &std::path::Path, name: &str, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    path
}

const ROW_1: &str = "1,Ada,Lovelace,ada@example.com,0123,EC1A 1BB,London,England,Islington,-0.1,51.5,true,,,,,false,Low,15,,Active,2026-10-01T10:00:00Z,crm_export,complete";
const ROW_2: &str = "2,Acme,Holdings,ops@acme.test,,M1 1AE,North West,England,Manchester,-2.2,53.4,true,Acme Ltd,51-200,Manufacturing,10M-50M,true,Medium,45,new_business,Active,2026-10-01T10:00:00Z,crm_export,complete";
const ROW_BAD: &str = ",Nameless,Person,nobody@example.com,,,,,,,,false,,,,,false,High,90,missing_id,Pending,2026-10-01T10:00:00Z,crm_export,partial";
const ROW_3: &str = "3,Alan,Turing,alan@example.com,,CB2 1TN,East,England,Cambridge,0.1,52.2,true,,,,,false,Low,10,,Active,2026-10-01T10:00:00Z,crm_export,complete";

#[test]
fn test_load_rerun_and_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoaderConfig::with_database(dir.path().join("warehouse.db"));

    // First run: empty warehouse, everything is inserted
    let csv = write_csv(dir.path(), "first.csv", &[ROW_1, ROW_2]);
    let records = load_csv(&csv).unwrap();
    let first = run_batch(&config, &records).unwrap();

    assert_eq!(first.successful_inserts, 2);
    assert_eq!(first.successful_updates, 0);
    assert_eq!(first.failed_records, 0);
    assert!(first.is_success());

    // Second run: same records, everything is updated
    let second = run_batch(&config, &records).unwrap();

    assert_eq!(second.successful_inserts, 0);
    assert_eq!(second.successful_updates, 2);
    assert_eq!(second.failed_records, 0);

    // Third run: one record without identity in the middle
    let csv = write_csv(dir.path(), "third.csv", &[ROW_1, ROW_BAD, ROW_3]);
    let records = load_csv(&csv).unwrap();
    let third = run_batch(&config, &records).unwrap();

    assert_eq!(third.total_records, 3);
    assert_eq!(third.successful_updates, 1);
    assert_eq!(third.successful_inserts, 1);
    assert_eq!(third.failed_records, 1);
    assert_eq!(third.errors.len(), 1);
    assert!(third.errors[0].contains("record #2"));
    assert!(third.committed);

    for result in [&first, &second, &third] {
        assert_eq!(
            result.successful_inserts + result.successful_updates + result.failed_records,
            result.total_records
        );
    }

    // Warehouse state
    let gateway = SqliteGateway::open(&config.database_path).unwrap();
    assert_eq!(gateway.count_customers().unwrap(), 3);

    let acme = gateway.get_customer(2).unwrap().unwrap();
    assert!(acme.is_business);
    assert_eq!(acme.company.as_deref(), Some("Acme Ltd"));
    assert_eq!(acme.risk_score_numeric, Some(45));

    // Audit trail: one row per batch, joined by batch_id
    let audit = gateway.audit_entry(third.batch_id).unwrap().unwrap();
    assert_eq!(audit.records_processed, 3);
    assert_eq!(audit.records_successful, 2);
    assert_eq!(audit.records_failed, 1);
    assert_eq!(audit.error_message.as_deref(), Some(third.errors[0].as_str()));

    let batches = recent_batches(gateway.connection(), 10).unwrap();
    assert_eq!(batches.len(), 3);

    let report = completeness(gateway.connection()).unwrap();
    assert_eq!(report.total_records, 3);
    assert_eq!(report.business_customers, 1);
    assert_eq!(report.geo_enriched_count, 3);
}

#[test]
fn test_modified_date_refreshed_on_update() {
    let dir = tempfile::tempdir().unwrap();
    let config = LoaderConfig::with_database(dir.path().join("warehouse.db"));
    let records = load_csv(&write_csv(dir.path(), "one.csv", &[ROW_1])).unwrap();

    run_batch(&config, &records).unwrap();

    // Age the row so the refresh is observable
    let gateway = SqliteGateway::open(&config.database_path).unwrap();
    gateway
        .connection()
        .execute(
            "UPDATE customer_enriched SET created_date = '2000-01-01 00:00:00', modified_date = '2000-01-01 00:00:00'",
            [],
        )
        .unwrap();
    drop(gateway);

    run_batch(&config, &records).unwrap();

    let gateway = SqliteGateway::open(&config.database_path).unwrap();
    let (created, modified): (String, String) = gateway
        .connection()
        .query_row(
            "SELECT created_date, modified_date FROM customer_enriched WHERE customer_id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();

    assert_eq!(created, "2000-01-01 00:00:00");
    assert_ne!(modified, "2000-01-01 00:00:00");
}
