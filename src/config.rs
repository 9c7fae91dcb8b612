use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::graph::RetryPolicy;

/// Explicit path and retry configuration for one pipeline run.
///
/// Every stage receives this struct instead of reaching for shared path
/// constants, so each stage can be pointed at a scratch directory and run
/// on its own. Raw-file and table paths are derived from the two
/// directories by fixed role, never supplied positionally.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// The toll-data archive to stage.
    pub archive: PathBuf,
    /// Directory the archive is unpacked into; raw source files live here.
    pub staging_dir: PathBuf,
    /// Directory for intermediate and final tables.
    pub output_dir: PathBuf,
    /// Extra attempts for a failed stage.
    pub retries: u32,
    /// Pause between attempts, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive: PathBuf::from("data/tolldata.zip"),
            staging_dir: PathBuf::from("staging"),
            output_dir: PathBuf::from("staging/temp_data"),
            retries: 1,
            retry_delay_secs: 300,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file. Missing keys fall back to the
    /// defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: PipelineConfig = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            delay: Duration::from_secs(self.retry_delay_secs),
        }
    }

    // ── raw source files, as named inside the archive ────────────────

    pub fn vehicle_csv(&self) -> PathBuf {
        self.staging_dir.join("vehicle-data.csv")
    }

    pub fn tollplaza_tsv(&self) -> PathBuf {
        self.staging_dir.join("tollplaza-data.tsv")
    }

    pub fn payment_txt(&self) -> PathBuf {
        self.staging_dir.join("payment-data.txt")
    }

    // ── intermediate and final tables ────────────────────────────────

    pub fn vehicle_table(&self) -> PathBuf {
        self.output_dir.join("csv_data.csv")
    }

    pub fn tollplaza_table(&self) -> PathBuf {
        self.output_dir.join("tsv_data.csv")
    }

    pub fn payment_table(&self) -> PathBuf {
        self.output_dir.join("fixed_width_data.csv")
    }

    pub fn consolidated_table(&self) -> PathBuf {
        self.output_dir.join("extracted_data.csv")
    }

    pub fn final_table(&self) -> PathBuf {
        self.output_dir.join("transformed_data.csv")
    }
}
