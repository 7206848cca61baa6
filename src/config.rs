//! Run Configuration
//!
//! Loads the run configuration file and the sample table it points to, and
//! turns both into the [`ParameterSet`] patterns are filled against.
//!
//! # Example configuration
//!
//! ```yaml
//! samples: config/samples.tsv
//! sample_dir: work
//! aggregation_dir: results
//! reference_index: reference/GRCh38
//! max_threads: 16
//! ```

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::workflow::planner::default_max_threads;
use crate::workflow::ParameterSet;

/// Parameter names every built-in pattern root is filled from.
pub const SAMPLE_DIR: &str = "sample_dir";
pub const AGGREGATION_DIR: &str = "aggregation_dir";
pub const REFERENCE_INDEX: &str = "reference_index";
pub const REPORT_CONFIG: &str = "report_config";

fn default_reference_index() -> String {
    "reference/genome".to_string()
}

fn default_report_config() -> String {
    "config/multiqc_config.yaml".to_string()
}

/// Settings for one pipeline run.
///
/// Paths are opaque prefixes and are used verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Sample table (tab-separated, header row)
    pub samples: PathBuf,

    /// Per-sample working root
    pub sample_dir: String,

    /// Cross-sample output root
    pub aggregation_dir: String,

    #[serde(default = "default_reference_index")]
    pub reference_index: String,

    #[serde(default = "default_report_config")]
    pub report_config: String,

    /// Pipeline definition file; the built-in RNA-seq pipeline when absent
    #[serde(default)]
    pub definition: Option<PathBuf>,

    #[serde(default)]
    pub max_threads: Option<usize>,
}

impl PipelineConfig {
    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Definition(format!(
                "failed to read configuration '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;

        if config.sample_dir.trim().is_empty() || config.aggregation_dir.trim().is_empty() {
            return Err(PipelineError::Definition(
                "sample_dir and aggregation_dir must not be empty".to_string(),
            ));
        }
        if config.max_threads == Some(0) {
            return Err(PipelineError::Definition(
                "max_threads must be at least 1".to_string(),
            ));
        }

        debug!("Configuration: {:?}", config);
        Ok(config)
    }

    /// Reads the configured sample table.
    pub fn load_samples(&self) -> Result<Vec<String>> {
        load_sample_table(&self.samples)
    }

    /// Parameter set for `samples` with every configured root.
    pub fn parameters(&self, samples: &[String]) -> ParameterSet {
        ParameterSet::new(samples.iter().cloned())
            .with_root(SAMPLE_DIR, self.sample_dir.as_str())
            .with_root(AGGREGATION_DIR, self.aggregation_dir.as_str())
            .with_root(REFERENCE_INDEX, self.reference_index.as_str())
            .with_root(REPORT_CONFIG, self.report_config.as_str())
    }

    /// Slot limit for thread hints.
    pub fn max_threads(&self) -> usize {
        self.max_threads.unwrap_or_else(default_max_threads)
    }
}

/// Loads sample identifiers from a sample table file.
pub fn load_sample_table(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(|e| {
        PipelineError::Definition(format!(
            "failed to read sample table '{}': {}",
            path.display(),
            e
        ))
    })?;

    let samples = read_sample_table(file)?;
    info!("Loaded {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Reads sample identifiers from the first column of a tab-separated table.
///
/// The first row is a header. Comment lines (`#`) and blank identifiers
/// are skipped; repeated identifiers keep their first occurrence.
pub fn read_sample_table<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut samples: Vec<String> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let Some(id) = record.get(0).filter(|id| !id.is_empty()) else {
            continue;
        };

        if samples.iter().any(|s| s == id) {
            warn!("Duplicate sample '{}' in sample table, ignoring", id);
            continue;
        }
        samples.push(id.to_string());
    }

    if samples.is_empty() {
        return Err(PipelineError::Definition(
            "sample table contains no samples".to_string(),
        ));
    }

    Ok(samples)
}
