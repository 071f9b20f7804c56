// ⚙️ Loader Configuration
//
// Passed explicitly into the loader. Callers own its lifecycle; there is
// no process-wide pipeline state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audit::{ERROR_SUMMARY_LIMIT, OPERATION_UPSERT, PIPELINE_VERSION};

/// Environment variable that overrides `database_path`.
pub const DATABASE_ENV: &str = "WAREHOUSE_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// SQLite warehouse file
    pub database_path: PathBuf,

    /// Tag written to every audit row
    pub pipeline_version: String,

    /// Operation kind recorded in the audit row
    pub operation_type: String,

    /// How many per-record errors make it into the audit summary
    pub error_summary_limit: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            database_path: PathBuf::from("warehouse.db"),
            pipeline_version: PIPELINE_VERSION.to_string(),
            operation_type: OPERATION_UPSERT.to_string(),
            error_summary_limit: ERROR_SUMMARY_LIMIT,
        }
    }
}

impl LoaderConfig {
    pub fn with_database(database_path: impl Into<PathBuf>) -> Self {
        LoaderConfig {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Load from a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: LoaderConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply `WAREHOUSE_DB` if it is set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_database_override(std::env::var(DATABASE_ENV).ok())
    }

    fn with_database_override(mut self, value: Option<String>) -> Self {
        if let Some(path) = value.filter(|p| !p.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();

        assert_eq!(config.pipeline_version, "ETL_Pipeline_v1.0");
        assert_eq!(config.operation_type, "UPSERT");
        assert_eq!(config.error_summary_limit, 5);
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/tmp/custom.db\"").unwrap();
        writeln!(file, "pipeline_version = \"ETL_Pipeline_v2.0\"").unwrap();

        let config = LoaderConfig::from_file(file.path()).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.pipeline_version, "ETL_Pipeline_v2.0");
        assert_eq!(config.error_summary_limit, 5);
    }

    #[test]
    fn test_from_file_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "error_summary_limit = \"five\"").unwrap();

        assert!(LoaderConfig::from_file(file.path()).is_err());
    }

    #[test]
    fn test_database_override() {
        let config = LoaderConfig::default().with_database_override(Some("other.db".to_string()));
        assert_eq!(config.database_path, PathBuf::from("other.db"));

        let config = LoaderConfig::default().with_database_override(Some("  ".to_string()));
        assert_eq!(config.database_path, PathBuf::from("warehouse.db"));
    }
}
