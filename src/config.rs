use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::bucketer::BucketerConfig;
use crate::models::Document;
use crate::models::field;
use crate::parser::{DEFAULT_IDENTITY_MARKERS, ExpansionMode};
use crate::sink::SinkKind;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    pub bucketing: BucketingConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Log files, or directories walked recursively. CLI paths replace these.
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    #[serde(default = "default_identity_markers")]
    pub identity_markers: Vec<String>,
    /// Metric names to keep; empty keeps all.
    #[serde(default)]
    pub metric_filter: Vec<String>,
    #[serde(default)]
    pub drop_non_positive: bool,
    /// `column`: one record per metric. `row`: one record per data row, with
    /// every column usable as a fact (`fact_fields = ["r/s", "w/s"]`).
    #[serde(default)]
    pub expansion: ExpansionMode,
    /// Constant attributes added to every record (e.g. `env = "prod"`).
    #[serde(default)]
    pub attributes: Document,
    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            identity_markers: default_identity_markers(),
            metric_filter: Vec::new(),
            drop_non_positive: false,
            expansion: ExpansionMode::Column,
            attributes: Document::new(),
            max_parallel_files: default_max_parallel_files(),
        }
    }
}

fn default_identity_markers() -> Vec<String> {
    DEFAULT_IDENTITY_MARKERS
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_max_parallel_files() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(4)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// One upsert per record against the bucket document.
    Point,
    /// Fold each bucket window in process, write one document per group.
    #[default]
    Batch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketingConfig {
    #[serde(default)]
    pub mode: AggregationMode,
    #[serde(flatten)]
    pub bucketer: BucketerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,
    /// SQLite database path, or JSON-lines output path ("-" for stdout).
    pub path: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush a partial batch after this many seconds.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    5
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let b = &self.bucketing.bucketer;
        anyhow::ensure!(
            b.resolution.is_finer_or_equal(b.bucket_level),
            "bucketing.resolution ({:?}) must be the same as or finer than bucketing.bucket_level ({:?})",
            b.resolution,
            b.bucket_level
        );
        anyhow::ensure!(
            !b.fact_fields.is_empty(),
            "bucketing.fact_fields must be non-empty"
        );
        anyhow::ensure!(
            b.dimension_fields.iter().all(|d| !d.is_empty()),
            "bucketing.dimension_fields must not contain empty names"
        );
        let reserved = b.reserved_field_names();
        if let Some(clash) = b
            .dimension_fields
            .iter()
            .find(|d| reserved.contains(&d.as_str()))
        {
            anyhow::bail!(
                "bucketing.dimension_fields: {clash:?} collides with an output field ({})",
                reserved.join(", ")
            );
        }
        anyhow::ensure!(
            self.input.expansion != ExpansionMode::Row
                || b.fact_fields.iter().any(|f| f != field::VALUE),
            "bucketing.fact_fields must name row columns when input.expansion = \"row\""
        );
        anyhow::ensure!(
            self.input.max_parallel_files > 0,
            "input.max_parallel_files must be > 0, got {}",
            self.input.max_parallel_files
        );
        anyhow::ensure!(!self.sink.path.is_empty(), "sink.path must be non-empty");
        anyhow::ensure!(
            self.sink.batch_size > 0,
            "sink.batch_size must be > 0, got {}",
            self.sink.batch_size
        );
        anyhow::ensure!(
            self.sink.flush_interval_secs > 0,
            "sink.flush_interval_secs must be > 0, got {}",
            self.sink.flush_interval_secs
        );
        Ok(())
    }
}
