// 👤 Customer Record - one customer's enriched state
//
// Identity = customer_id (sole key for existence in the warehouse)
// Everything else is mutable payload: contact, geo, business, risk,
// status, and provenance. The loader never mutates a record, it only
// stages it into an insert or update.

use anyhow::{Context, Result};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Enriched customer record, shaped like the `customer_enriched` table.
///
/// `customer_id`, `first_name`, `last_name` and `email` are required by the
/// table, but are optional here so a malformed upstream row can still be
/// represented and rejected per record instead of failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    // ========================================================================
    // IDENTITY
    // ========================================================================
    #[serde(default, deserialize_with = "lenient::optional_int")]
    pub customer_id: Option<i64>,

    // ========================================================================
    // CONTACT
    // ========================================================================
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,

    // ========================================================================
    // GEOGRAPHIC ENRICHMENT
    // ========================================================================
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub geo_enriched: bool,

    // ========================================================================
    // BUSINESS ENRICHMENT
    // ========================================================================
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub company_size: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub annual_revenue: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_business: bool,

    // ========================================================================
    // RISK ASSESSMENT
    // ========================================================================
    #[serde(default)]
    pub calculated_risk: Option<String>,
    #[serde(default, deserialize_with = "lenient::optional_int")]
    pub risk_score_numeric: Option<i64>,
    #[serde(default)]
    pub risk_factors: Option<String>,

    // ========================================================================
    // STATUS + PROVENANCE
    // ========================================================================
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub processed_date: Option<String>,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub enrichment_status: Option<String>,
}

impl CustomerRecord {
    /// Minimal record with identity and the contact fields the table requires.
    pub fn new(customer_id: i64, first_name: &str, last_name: &str, email: &str) -> Self {
        CustomerRecord {
            customer_id: Some(customer_id),
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            email: Some(email.to_string()),
            ..Default::default()
        }
    }

    pub fn identity(&self) -> Option<i64> {
        self.customer_id
    }

    /// Column values for every mutable field, in `MUTABLE_COLUMNS` order.
    pub(crate) fn payload(&self) -> [&dyn rusqlite::ToSql; 23] {
        [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.phone,
            &self.postcode,
            &self.region,
            &self.country,
            &self.district,
            &self.longitude,
            &self.latitude,
            &self.geo_enriched,
            &self.company,
            &self.company_size,
            &self.industry,
            &self.annual_revenue,
            &self.is_business,
            &self.calculated_risk,
            &self.risk_score_numeric,
            &self.risk_factors,
            &self.status,
            &self.processed_date,
            &self.data_source,
            &self.enrichment_status,
        ]
    }

    /// Read a record back from a `SELECT customer_id, <MUTABLE_COLUMNS>` row.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(CustomerRecord {
            customer_id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            postcode: row.get(5)?,
            region: row.get(6)?,
            country: row.get(7)?,
            district: row.get(8)?,
            longitude: row.get(9)?,
            latitude: row.get(10)?,
            geo_enriched: row.get::<_, Option<bool>>(11)?.unwrap_or(false),
            company: row.get(12)?,
            company_size: row.get(13)?,
            industry: row.get(14)?,
            annual_revenue: row.get(15)?,
            is_business: row.get::<_, Option<bool>>(16)?.unwrap_or(false),
            calculated_risk: row.get(17)?,
            risk_score_numeric: row.get(18)?,
            risk_factors: row.get(19)?,
            status: row.get(20)?,
            processed_date: row.get(21)?,
            data_source: row.get(22)?,
            enrichment_status: row.get(23)?,
        })
    }
}

/// Every column except identity and the store-managed timestamps.
pub const MUTABLE_COLUMNS: [&str; 23] = [
    "first_name",
    "last_name",
    "email",
    "phone",
    "postcode",
    "region",
    "country",
    "district",
    "longitude",
    "latitude",
    "geo_enriched",
    "company",
    "company_size",
    "industry",
    "annual_revenue",
    "is_business",
    "calculated_risk",
    "risk_score_numeric",
    "risk_factors",
    "status",
    "processed_date",
    "data_source",
    "enrichment_status",
];

// ============================================================================
// LENIENT FIELD PARSING
// Dataframe exports write flags as True/False or 1/0 and nullable integer
// columns as floats ("15.0"). Accept those alongside the plain forms.
// ============================================================================

mod lenient {
    use serde::de::{self, Deserializer, Unexpected, Visitor};
    use std::fmt;

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    pub fn optional_int<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        deserializer.deserialize_option(OptionalIntVisitor)
    }

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("true/false, True/False or 1/0")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(Unexpected::Signed(v), &self)),
            }
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<bool, E> {
            if v == 0.0 {
                Ok(false)
            } else if v == 1.0 {
                Ok(true)
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }

        fn visit_none<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }

    struct IntVisitor;

    impl<'de> Visitor<'de> for IntVisitor {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer or an integral float")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Option<i64>, E> {
            Ok(Some(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Option<i64>, E> {
            i64::try_from(v)
                .map(Some)
                .map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<Option<i64>, E> {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok(Some(v as i64))
            } else {
                Err(E::invalid_value(Unexpected::Float(v), &self))
            }
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Option<i64>, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(None);
            }
            if let Ok(n) = v.parse::<i64>() {
                return Ok(Some(n));
            }
            match v.parse::<f64>() {
                Ok(f) => self.visit_f64(f),
                Err(_) => Err(E::invalid_value(Unexpected::Str(v), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<i64>, E> {
            Ok(None)
        }
    }

    struct OptionalIntVisitor;

    impl<'de> Visitor<'de> for OptionalIntVisitor {
        type Value = Option<i64>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an optional integer")
        }

        fn visit_none<E: de::Error>(self) -> Result<Option<i64>, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<i64>, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Option<i64>, D::Error> {
            deserializer.deserialize_any(IntVisitor)
        }
    }
}

/// Identity as shown in logs and error messages.
pub struct DisplayIdentity(pub Option<i64>);

impl fmt::Display for DisplayIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "<missing id>"),
        }
    }
}

/// Read enriched customers from a CSV export with a header row.
pub fn load_csv(csv_path: &Path) -> Result<Vec<CustomerRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open CSV file {}", csv_path.display()))?;

    let mut records = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let record: CustomerRecord = result
            .with_context(|| format!("Failed to deserialize customer on data row {}", line + 1))?;
        records.push(record);
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_new_sets_required_fields() {
        let record = CustomerRecord::new(7, "Ada", "Lovelace", "ada@example.com");

        assert_eq!(record.identity(), Some(7));
        assert_eq!(record.email.as_deref(), Some("ada@example.com"));
        assert!(!record.geo_enriched);
        assert!(record.region.is_none());
    }

    #[test]
    fn test_payload_matches_column_count() {
        let record = CustomerRecord::new(1, "A", "B", "a@b.c");
        assert_eq!(record.payload().len(), MUTABLE_COLUMNS.len());
    }

    #[test]
    fn test_display_identity() {
        assert_eq!(DisplayIdentity(Some(42)).to_string(), "42");
        assert_eq!(DisplayIdentity(None).to_string(), "<missing id>");
    }

    #[test]
    fn test_load_csv_with_missing_identity() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "customer_id,first_name,last_name,email,region,longitude,latitude,geo_enriched,is_business,risk_score_numeric"
        )
        .unwrap();
        writeln!(file, "1,Ada,Lovelace,ada@example.com,London,-0.12,51.5,true,false,20").unwrap();
        writeln!(file, ",Alan,Turing,alan@example.com,,,,false,true,").unwrap();

        let records = load_csv(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].customer_id, Some(1));
        assert_eq!(records[0].region.as_deref(), Some("London"));
        assert_eq!(records[0].latitude, Some(51.5));
        assert!(records[0].geo_enriched);
        assert_eq!(records[0].risk_score_numeric, Some(20));
        assert_eq!(records[1].customer_id, None);
        assert!(records[1].is_business);
        assert!(records[1].region.is_none());
    }

    #[test]
    fn test_load_csv_accepts_dataframe_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,first_name,last_name,email,geo_enriched,is_business,risk_score_numeric").unwrap();
        writeln!(file, "1,Ada,Lovelace,ada@example.com,True,False,15.0").unwrap();
        writeln!(file, "2.0,Alan,Turing,alan@example.com,0,1,").unwrap();

        let records = load_csv(file.path()).unwrap();

        assert_eq!(records[0].customer_id, Some(1));
        assert!(records[0].geo_enriched);
        assert!(!records[0].is_business);
        assert_eq!(records[0].risk_score_numeric, Some(15));
        assert_eq!(records[1].customer_id, Some(2));
        assert!(!records[1].geo_enriched);
        assert!(records[1].is_business);
        assert_eq!(records[1].risk_score_numeric, None);
    }

    #[test]
    fn test_load_csv_rejects_fractional_score() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,first_name,last_name,email,risk_score_numeric").unwrap();
        writeln!(file, "1,Ada,Lovelace,ada@example.com,15.5").unwrap();

        assert!(load_csv(file.path()).is_err());
    }

    #[test]
    fn test_json_record_uses_native_types() {
        let record: CustomerRecord = serde_json::from_str(
            r#"{"customer_id": 9, "first_name": "Mary", "last_name": "Jackson",
                "email": "mj@example.com", "is_business": true, "risk_score_numeric": null}"#,
        )
        .unwrap();

        assert_eq!(record.customer_id, Some(9));
        assert!(record.is_business);
        assert!(!record.geo_enriched);
        assert_eq!(record.risk_score_numeric, None);
    }

    #[test]
    fn test_load_csv_rejects_malformed_row() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "customer_id,first_name,last_name,email").unwrap();
        writeln!(file, "not-a-number,Ada,Lovelace,ada@example.com").unwrap();

        let err = load_csv(file.path()).unwrap_err();
        assert!(err.to_string().contains("data row 1"));
    }
}
