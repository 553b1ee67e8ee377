// rust/tsad-data/src/config.rs

//! Configuration management for dataset loading and batching.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DataError, Result};
use crate::format::ArrayFormatKind;
use crate::loader::LoadOptions;
use crate::registry::{get_data_dim, DatasetRoots};

// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub storage: StorageConfig,
    pub data: DataConfig,
    pub loader: LoaderOptions,
    /// Entries override the default roots one family at a time.
    #[serde(deserialize_with = "roots_over_defaults")]
    pub roots: DatasetRoots,
}

fn roots_over_defaults<'de, D>(deserializer: D) -> std::result::Result<DatasetRoots, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = BTreeMap::<String, PathBuf>::deserialize(deserializer)?;
    let mut roots = DatasetRoots::default();
    for (family, root) in entries {
        roots.insert(family, root);
    }
    Ok(roots)
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path relative data roots are resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for buffered reads.
    pub buffer_size: usize,
    // Whether to memory-map large files.
    pub use_mmap: bool,
    // File size threshold (bytes) at or above which to use mmap.
    pub mmap_threshold: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

/// Which dataset to load and how to read its partition files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Dataset identifier, e.g. "SMD". Used to look up the feature
    /// dimensionality and the default data root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    /// Directory holding the partition files. Falls back to `[roots]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    /// Entities to load, in order. Empty means every entity found in the
    /// data root.
    pub entities: Vec<String>,
    /// Fraction of each train partition moved to the validation partition.
    pub valid_ratio: f64,
    /// Expected number of feature columns. Falls back to the registry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    pub train_suffix: String,
    pub test_suffix: String,
    pub test_label_suffix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_label_suffix: Option<String>,
    /// Replacement for NaN values in train, valid and test data.
    pub nan_value: f32,
    /// Also clamp infinities to the finite `f32` range.
    pub clamp_infinite: bool,
    /// Keep only the first `row_limit` rows of every partition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<usize>,
    pub format: ArrayFormatKind,
    /// Field delimiter for text files.
    pub delimiter: char,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: None,
            data_root: None,
            entities: Vec::new(),
            valid_ratio: 0.0,
            dim: None,
            train_suffix: "train.npy".to_string(),
            test_suffix: "test.npy".to_string(),
            test_label_suffix: "test_label.npy".to_string(),
            train_label_suffix: None,
            nan_value: 0.0,
            clamp_infinite: false,
            row_limit: None,
            format: ArrayFormatKind::Auto,
            delimiter: ',',
        }
    }
}

impl DataConfig {
    /// The expected feature dimensionality: the explicit `dim` if set,
    /// otherwise the registry value for `dataset`, otherwise `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dim` is unset and `dataset` names no known family.
    pub fn resolve_dim(&self) -> Result<Option<usize>> {
        match (self.dim, &self.dataset) {
            (Some(dim), _) => Ok(Some(dim)),
            (None, Some(dataset)) => get_data_dim(dataset).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// The directory to read from: the explicit `data_root` if set,
    /// otherwise the registered root for `dataset`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither is available.
    pub fn resolve_root(&self, roots: &DatasetRoots) -> Result<PathBuf> {
        if let Some(root) = &self.data_root {
            return Ok(root.clone());
        }

        let dataset = self.dataset.as_deref().ok_or_else(|| {
            DataError::config("data.data_root or data.dataset must be set")
        })?;

        roots
            .root_for(dataset)
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                DataError::config(format!("no data root registered for dataset '{dataset}'"))
            })
    }

    /// Builds the loader options described by this section.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimensionality cannot be resolved.
    pub fn load_options(&self) -> Result<LoadOptions> {
        Ok(LoadOptions {
            valid_ratio: self.valid_ratio,
            dim: self.resolve_dim()?,
            train_suffix: self.train_suffix.clone(),
            test_suffix: self.test_suffix.clone(),
            test_label_suffix: self.test_label_suffix.clone(),
            train_label_suffix: self.train_label_suffix.clone(),
            nan_value: self.nan_value,
            clamp_infinite: self.clamp_infinite,
            row_limit: self.row_limit,
        })
    }
}

/// Batch iterator options shared by the train, valid and test loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Trailing feature columns split off as the target segment.
    pub next_steps: usize,
    pub batch_size: usize,
    /// Shuffle train and valid loaders. Test loaders never shuffle.
    pub shuffle: bool,
    /// Worker threads assembling batches. Zero assembles them on the
    /// calling thread.
    pub num_workers: usize,
    /// Batches each worker may run ahead of the consumer.
    pub prefetch_batches: usize,
    /// Seed for reproducible shuffling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            next_steps: 0,
            batch_size: 32,
            shuffle: true,
            num_workers: 1,
            prefetch_batches: 2,
            seed: None,
        }
    }
}

impl LoaderOptions {
    /// Validates the option values.
    ///
    /// # Errors
    ///
    /// Returns an error if `batch_size` or `prefetch_batches` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DataError::config("loader.batch_size must be greater than 0"));
        }
        if self.prefetch_batches == 0 {
            return Err(DataError::config(
                "loader.prefetch_batches must be greater than 0",
            ));
        }
        Ok(())
    }
}

impl FromStr for PipelineConfig {
    type Err = DataError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| DataError::config_with_source("failed to parse TOML config", e))
    }
}

impl PipelineConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `TSAD_` and use underscores
    // to separate nested fields. For example:
    // - `TSAD_STORAGE_BASE_PATH` overrides `storage.base_path`
    // - `TSAD_DATA_ROOT` overrides `data.data_root`
    // - `TSAD_DATA_ENTITIES` overrides `data.entities` (comma-separated)
    // - `TSAD_LOADER_BATCH_SIZE` overrides `loader.batch_size`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Storage overrides
        if let Ok(val) = std::env::var("TSAD_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TSAD_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_STORAGE_MMAP_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.storage.mmap_threshold = v;
            }
        }

        // Data overrides
        if let Ok(val) = std::env::var("TSAD_DATA_DATASET") {
            self.data.dataset = Some(val);
        }
        if let Ok(val) = std::env::var("TSAD_DATA_ROOT") {
            self.data.data_root = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("TSAD_DATA_ENTITIES") {
            self.data.entities = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(val) = std::env::var("TSAD_DATA_VALID_RATIO") {
            if let Ok(v) = val.parse() {
                self.data.valid_ratio = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_DATA_DIM") {
            if let Ok(v) = val.parse() {
                self.data.dim = Some(v);
            }
        }
        if let Ok(val) = std::env::var("TSAD_DATA_NAN_VALUE") {
            if let Ok(v) = val.parse() {
                self.data.nan_value = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_DATA_ROW_LIMIT") {
            if let Ok(v) = val.parse() {
                self.data.row_limit = Some(v);
            }
        }
        if let Ok(val) = std::env::var("TSAD_DATA_FORMAT") {
            match val.to_lowercase().as_str() {
                "auto" => self.data.format = ArrayFormatKind::Auto,
                "npy" => self.data.format = ArrayFormatKind::Npy,
                "text" => self.data.format = ArrayFormatKind::Text,
                _ => {} // ignore invalid values
            }
        }

        // Loader overrides
        if let Ok(val) = std::env::var("TSAD_LOADER_NEXT_STEPS") {
            if let Ok(v) = val.parse() {
                self.loader.next_steps = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_LOADER_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                self.loader.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_LOADER_SHUFFLE") {
            if let Ok(v) = val.parse() {
                self.loader.shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_LOADER_NUM_WORKERS") {
            if let Ok(v) = val.parse() {
                self.loader.num_workers = v;
            }
        }
        if let Ok(val) = std::env::var("TSAD_LOADER_SEED") {
            if let Ok(v) = val.parse() {
                self.loader.seed = Some(v);
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Storage validation
        if self.storage.buffer_size == 0 {
            return Err(DataError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        // Data validation
        if !self.data.valid_ratio.is_finite()
            || self.data.valid_ratio < 0.0
            || self.data.valid_ratio >= 1.0
        {
            return Err(DataError::config("data.valid_ratio must be in [0, 1)"));
        }
        if self.data.dim == Some(0) {
            return Err(DataError::config("data.dim must be greater than 0"));
        }
        for (field, suffix) in [
            ("data.train_suffix", &self.data.train_suffix),
            ("data.test_suffix", &self.data.test_suffix),
            ("data.test_label_suffix", &self.data.test_label_suffix),
        ] {
            if suffix.is_empty() {
                return Err(DataError::config(format!("{field} must not be empty")));
            }
        }
        if !self.data.delimiter.is_ascii() {
            return Err(DataError::config("data.delimiter must be an ASCII character"));
        }

        // Loader validation
        self.loader.validate()?;

        Ok(())
    }
}
