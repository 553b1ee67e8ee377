// rust/tsad-data/src/loader.rs

//! Per-entity dataset loading.
//!
//! Each entity (one machine, one spacecraft channel) has its partitions
//! stored side by side as `{data_root}/{entity}_{suffix}`. Loading reads the
//! train, test and label partitions, carves a validation tail off the train
//! partition, and replaces missing values.
//!
//! # Example
//!
//! ```no_run
//! use tsad_data::loader::{load_dataset, LoadOptions};
//!
//! let options = LoadOptions::new(0.2, Some(38), "test_label.npy", "test.npy", "train.npy");
//! let data = load_dataset("./datasets/SMD", &["machine-1-1"], &options)?;
//!
//! let machine = data.get("machine-1-1").unwrap();
//! println!("train rows: {}", machine.train.nrows());
//! # Ok::<(), tsad_data::DataError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{s, Array, Array1, Array2, ArrayD, Dimension, Ix2};

use crate::error::{DataError, Result};
use crate::format::FormatSelector;
use crate::storage::{LocalStorage, StorageBackend};

/// Options controlling how each entity's partitions are read and prepared.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Fraction of train rows moved to the validation partition. Zero
    /// disables the split.
    pub valid_ratio: f64,
    /// Required number of feature columns, if any.
    pub dim: Option<usize>,
    pub train_suffix: String,
    pub test_suffix: String,
    pub test_label_suffix: String,
    pub train_label_suffix: Option<String>,
    /// Replacement for NaN in train, valid and test data.
    pub nan_value: f32,
    /// Clamp `±inf` to `f32::MAX`/`f32::MIN` while sanitizing.
    pub clamp_infinite: bool,
    /// Keep only the first `row_limit` rows of each partition.
    pub row_limit: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            valid_ratio: 0.0,
            dim: None,
            train_suffix: "train.npy".to_string(),
            test_suffix: "test.npy".to_string(),
            test_label_suffix: "test_label.npy".to_string(),
            train_label_suffix: None,
            nan_value: 0.0,
            clamp_infinite: false,
            row_limit: None,
        }
    }
}

impl LoadOptions {
    /// Creates options with the required fields; the rest take defaults.
    pub fn new(
        valid_ratio: f64,
        dim: Option<usize>,
        test_label_suffix: impl Into<String>,
        test_suffix: impl Into<String>,
        train_suffix: impl Into<String>,
    ) -> Self {
        Self {
            valid_ratio,
            dim,
            test_label_suffix: test_label_suffix.into(),
            test_suffix: test_suffix.into(),
            train_suffix: train_suffix.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_nan_value(mut self, nan_value: f32) -> Self {
        self.nan_value = nan_value;
        self
    }

    #[must_use]
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = Some(row_limit);
        self
    }

    #[must_use]
    pub fn with_train_label_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.train_label_suffix = Some(suffix.into());
        self
    }

    #[must_use]
    pub fn with_clamp_infinite(mut self, clamp: bool) -> Self {
        self.clamp_infinite = clamp;
        self
    }

    /// Validates the option values.
    ///
    /// # Errors
    ///
    /// Returns an error if `valid_ratio` is outside `[0, 1)`, `dim` is zero,
    /// or a required suffix is empty.
    pub fn validate(&self) -> Result<()> {
        if !self.valid_ratio.is_finite() || self.valid_ratio < 0.0 || self.valid_ratio >= 1.0 {
            return Err(DataError::config(format!(
                "valid_ratio must be in [0, 1), got {}",
                self.valid_ratio
            )));
        }
        if self.dim == Some(0) {
            return Err(DataError::config("dim must be greater than 0"));
        }
        if self.train_suffix.is_empty()
            || self.test_suffix.is_empty()
            || self.test_label_suffix.is_empty()
        {
            return Err(DataError::config("partition suffixes must not be empty"));
        }
        Ok(())
    }
}

/// All partitions of one entity.
///
/// Arrays are shared read-only; label arrays are row-aligned with their data
/// arrays.
#[derive(Debug, Clone)]
pub struct EntityData {
    pub name: String,
    pub train: Arc<Array2<f32>>,
    pub valid: Option<Arc<Array2<f32>>>,
    pub test: Arc<Array2<f32>>,
    pub test_label: Arc<Array1<f32>>,
    pub train_label: Option<Arc<Array1<f32>>>,
}

impl EntityData {
    /// Number of feature columns.
    pub fn dim(&self) -> usize {
        self.train.ncols()
    }
}

/// Loaded entities, in the order they were requested.
#[derive(Debug, Clone, Default)]
pub struct DatasetCollection {
    entities: Vec<EntityData>,
}

impl DatasetCollection {
    pub fn get(&self, name: &str) -> Option<&EntityData> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EntityData> {
        self.entities.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Total train rows across entities.
    pub fn train_rows(&self) -> usize {
        self.entities.iter().map(|e| e.train.nrows()).sum()
    }

    /// Total validation rows across entities.
    pub fn valid_rows(&self) -> usize {
        self.entities
            .iter()
            .filter_map(|e| e.valid.as_ref())
            .map(|v| v.nrows())
            .sum()
    }

    /// Total test rows across entities.
    pub fn test_rows(&self) -> usize {
        self.entities.iter().map(|e| e.test.nrows()).sum()
    }
}

impl IntoIterator for DatasetCollection {
    type Item = EntityData;
    type IntoIter = std::vec::IntoIter<EntityData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a DatasetCollection {
    type Item = &'a EntityData;
    type IntoIter = std::slice::Iter<'a, EntityData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}

/// Reads entity partitions through a storage backend.
pub struct DatasetLoader {
    storage: Arc<dyn StorageBackend>,
    formats: FormatSelector,
}

impl DatasetLoader {
    /// Creates a loader that picks the array format by file extension.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self::with_formats(storage, FormatSelector::default())
    }

    pub fn with_formats(storage: Arc<dyn StorageBackend>, formats: FormatSelector) -> Self {
        Self { storage, formats }
    }

    /// Loads every entity in `entities`, in order.
    ///
    /// # Errors
    ///
    /// Fails on the first entity whose files are missing, undecodable or of
    /// the wrong shape; nothing is returned for the entities loaded before
    /// it.
    pub fn load<S: AsRef<str>>(
        &self,
        data_root: &Path,
        entities: &[S],
        options: &LoadOptions,
    ) -> Result<DatasetCollection> {
        options.validate()?;
        tracing::info!("Loading data from {}", data_root.display());

        let mut loaded = Vec::with_capacity(entities.len());
        for name in entities {
            loaded.push(self.load_entity(data_root, name.as_ref(), options)?);
        }
        let collection = DatasetCollection { entities: loaded };

        tracing::info!("Loading {} entities done.", collection.len());
        tracing::info!(
            "Train/Valid/Test: {}/{}/{} lines.",
            collection.train_rows(),
            collection.valid_rows(),
            collection.test_rows()
        );

        Ok(collection)
    }

    /// Loads the partitions of a single entity.
    ///
    /// # Errors
    ///
    /// Returns an error if any required partition cannot be read or has the
    /// wrong shape.
    pub fn load_entity(
        &self,
        data_root: &Path,
        name: &str,
        options: &LoadOptions,
    ) -> Result<EntityData> {
        let train_path = partition_path(data_root, name, &options.train_suffix);
        let train = limit_rows(self.read_matrix(&train_path, options.dim)?, options.row_limit);

        let (mut train, mut valid) = split_validation(train, options.valid_ratio);
        sanitize(&mut train, options.nan_value, options.clamp_infinite);
        if let Some(valid) = valid.as_mut() {
            sanitize(valid, options.nan_value, options.clamp_infinite);
        }

        let test_path = partition_path(data_root, name, &options.test_suffix);
        let mut test = limit_rows(self.read_matrix(&test_path, options.dim)?, options.row_limit);
        sanitize(&mut test, options.nan_value, options.clamp_infinite);

        let label_path = partition_path(data_root, name, &options.test_label_suffix);
        let test_label = limit_labels(self.read_labels(&label_path)?, options.row_limit);

        let train_label = match &options.train_label_suffix {
            Some(suffix) => {
                let path = partition_path(data_root, name, suffix);
                Some(limit_labels(self.read_labels(&path)?, options.row_limit))
            }
            None => None,
        };

        tracing::debug!(
            "Entity {}: train {:?}, valid {:?}, test {:?}, test_label {}",
            name,
            train.dim(),
            valid.as_ref().map(|v| v.dim()),
            test.dim(),
            test_label.len()
        );

        Ok(EntityData {
            name: name.to_string(),
            train: Arc::new(train),
            valid: valid.map(Arc::new),
            test: Arc::new(test),
            test_label: Arc::new(test_label),
            train_label: train_label.map(Arc::new),
        })
    }

    /// Lists the entities in `data_root` that have a train partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    pub fn discover_entities(&self, data_root: &Path, train_suffix: &str) -> Result<Vec<String>> {
        discover_entities(self.storage.as_ref(), data_root, train_suffix)
    }

    fn read_array(&self, path: &Path) -> Result<ArrayD<f32>> {
        let mut reader = self.storage.open_read(path)?;
        let bytes = reader.read_all()?;

        self.formats.for_path(path).decode(&bytes, path)
    }

    fn read_matrix(&self, path: &Path, dim: Option<usize>) -> Result<Array2<f32>> {
        let array = self.read_array(path)?;
        let ndim = array.ndim();
        let matrix = array.into_dimensionality::<Ix2>().map_err(|_| {
            DataError::shape(format!(
                "'{}' holds a {ndim}-D array, expected 2-D",
                path.display()
            ))
        })?;

        if let Some(dim) = dim {
            if matrix.ncols() != dim {
                return Err(DataError::shape(format!(
                    "'{}' has {} feature columns, expected {dim}",
                    path.display(),
                    matrix.ncols()
                )));
            }
        }

        Ok(matrix)
    }

    fn read_labels(&self, path: &Path) -> Result<Array1<f32>> {
        let array = self.read_array(path)?;
        Ok(array.iter().copied().collect())
    }
}

impl std::fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("formats", &self.formats)
            .finish()
    }
}

/// Loads `entities` from `data_root` on the local filesystem.
///
/// # Errors
///
/// See [`DatasetLoader::load`].
pub fn load_dataset<S: AsRef<str>>(
    data_root: impl AsRef<Path>,
    entities: &[S],
    options: &LoadOptions,
) -> Result<DatasetCollection> {
    DatasetLoader::new(Arc::new(LocalStorage::default())).load(data_root.as_ref(), entities, options)
}

/// Returns, sorted, every entity `E` with a file `E_{train_suffix}` directly
/// under `data_root`.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed.
pub fn discover_entities(
    storage: &dyn StorageBackend,
    data_root: &Path,
    train_suffix: &str,
) -> Result<Vec<String>> {
    let marker = format!("_{train_suffix}");
    let entities = storage
        .list(data_root)?
        .into_iter()
        .filter_map(|file| {
            file.strip_suffix(&marker)
                .filter(|name| !name.is_empty())
                .map(String::from)
        })
        .collect();
    Ok(entities)
}

/// Path of one partition file.
pub fn partition_path(data_root: &Path, entity: &str, suffix: &str) -> PathBuf {
    data_root.join(format!("{entity}_{suffix}"))
}

/// Splits off the last `floor(rows * valid_ratio)` rows as validation data.
///
/// Returns the leading rows and, when `valid_ratio > 0`, the tail.
pub fn split_validation(train: Array2<f32>, valid_ratio: f64) -> (Array2<f32>, Option<Array2<f32>>) {
    if valid_ratio <= 0.0 {
        return (train, None);
    }

    let rows = train.nrows();
    let split_idx = ((rows as f64 * valid_ratio).floor() as usize).min(rows);
    let boundary = rows - split_idx;

    let valid = train.slice(s![boundary.., ..]).to_owned();
    let train = train.slice_move(s![..boundary, ..]);
    (train, Some(valid))
}

/// Replaces every NaN element with `nan_value`.
pub fn sanitize_nan<D: Dimension>(array: &mut Array<f32, D>, nan_value: f32) {
    sanitize(array, nan_value, false);
}

/// Replaces NaN with `nan_value` and, if `clamp_infinite`, clamps `±inf`
/// to the largest finite values.
pub fn sanitize<D: Dimension>(array: &mut Array<f32, D>, nan_value: f32, clamp_infinite: bool) {
    array.mapv_inplace(|v| {
        if v.is_nan() {
            nan_value
        } else if clamp_infinite && v == f32::INFINITY {
            f32::MAX
        } else if clamp_infinite && v == f32::NEG_INFINITY {
            f32::MIN
        } else {
            v
        }
    });
}

fn limit_rows(array: Array2<f32>, row_limit: Option<usize>) -> Array2<f32> {
    match row_limit {
        Some(limit) if limit < array.nrows() => array.slice_move(s![..limit, ..]),
        _ => array,
    }
}

fn limit_labels(labels: Array1<f32>, row_limit: Option<usize>) -> Array1<f32> {
    match row_limit {
        Some(limit) if limit < labels.len() => labels.slice_move(s![..limit]),
        _ => labels,
    }
}
