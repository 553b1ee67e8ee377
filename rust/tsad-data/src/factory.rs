// rust/tsad-data/src/factory.rs

//! Train/validation/test loader construction.

use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::config::LoaderOptions;
use crate::dataloader::{BatchConfig, DataLoader};
use crate::error::{DataError, Result};
use crate::loader::EntityData;
use crate::window::{LabeledDataset, RecordSource, WindowDataset};

/// Loaders for the three partitions of one entity.
///
/// `train` is generic so the same holder serves plain and labeled training
/// data; validation and test partitions are always plain rows.
#[derive(Debug)]
pub struct DataLoaders<T: RecordSource> {
    pub train: DataLoader<T>,
    pub valid: Option<DataLoader<WindowDataset>>,
    pub test: DataLoader<WindowDataset>,
}

impl LoaderOptions {
    fn batch_config(&self, shuffle: bool, seed: Option<u64>) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            shuffle,
            num_workers: self.num_workers,
            prefetch_batches: self.prefetch_batches,
            seed,
        }
    }

    fn train_config(&self) -> BatchConfig {
        self.batch_config(self.shuffle, self.seed)
    }

    // Offset so a seeded valid loader does not replay the train permutation.
    fn valid_config(&self) -> BatchConfig {
        self.batch_config(self.shuffle, self.seed.map(|s| s.wrapping_add(1)))
    }

    fn test_config(&self) -> BatchConfig {
        self.batch_config(false, None)
    }
}

fn plain_loader(
    data: Arc<Array2<f32>>,
    next_steps: usize,
    config: BatchConfig,
) -> Result<DataLoader<WindowDataset>> {
    DataLoader::new(WindowDataset::new(data, next_steps)?, config)
}

fn eval_loaders(
    test: Arc<Array2<f32>>,
    valid: Option<Arc<Array2<f32>>>,
    options: &LoaderOptions,
) -> Result<(Option<DataLoader<WindowDataset>>, DataLoader<WindowDataset>)> {
    let valid = valid
        .map(|valid| plain_loader(valid, options.next_steps, options.valid_config()))
        .transpose()?;
    let test = plain_loader(test, options.next_steps, options.test_config())?;
    Ok((valid, test))
}

/// Builds plain loaders over the train, validation and test arrays.
///
/// Train and validation loaders shuffle according to `options.shuffle`; the
/// test loader always keeps row order.
///
/// # Errors
///
/// Returns an error if `options` is invalid or `next_steps` exceeds the
/// column count of any partition.
pub fn get_dataloaders(
    train: Arc<Array2<f32>>,
    test: Arc<Array2<f32>>,
    valid: Option<Arc<Array2<f32>>>,
    options: &LoaderOptions,
) -> Result<DataLoaders<WindowDataset>> {
    options.validate()?;

    let train = plain_loader(train, options.next_steps, options.train_config())?;
    let (valid, test) = eval_loaders(test, valid, options)?;

    tracing::debug!(
        "Built loaders: {} train, {} valid, {} test batches",
        train.len(),
        valid.as_ref().map_or(0, DataLoader::len),
        test.len()
    );

    Ok(DataLoaders { train, valid, test })
}

/// Like [`get_dataloaders`], but the training loader yields
/// `(row, label)` pairs from `train_label`.
///
/// # Errors
///
/// Returns a shape error if `train` and `train_label` differ in length, in
/// addition to the errors of [`get_dataloaders`].
pub fn get_positive_dataloaders(
    train: Arc<Array2<f32>>,
    train_label: Arc<Array1<f32>>,
    test: Arc<Array2<f32>>,
    valid: Option<Arc<Array2<f32>>>,
    options: &LoaderOptions,
) -> Result<DataLoaders<LabeledDataset>> {
    options.validate()?;

    let train = DataLoader::new(LabeledDataset::new(train, train_label)?, options.train_config())?;
    let (valid, test) = eval_loaders(test, valid, options)?;

    tracing::debug!(
        "Built positive loaders: {} train, {} valid, {} test batches",
        train.len(),
        valid.as_ref().map_or(0, DataLoader::len),
        test.len()
    );

    Ok(DataLoaders { train, valid, test })
}

impl EntityData {
    /// Builds plain loaders over this entity's partitions.
    pub fn dataloaders(&self, options: &LoaderOptions) -> Result<DataLoaders<WindowDataset>> {
        get_dataloaders(
            self.train.clone(),
            self.test.clone(),
            self.valid.clone(),
            options,
        )
    }

    /// Builds loaders whose training loader pairs rows with train labels.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no train labels were loaded.
    pub fn positive_dataloaders(
        &self,
        options: &LoaderOptions,
    ) -> Result<DataLoaders<LabeledDataset>> {
        let train_label = self.train_label.clone().ok_or_else(|| {
            DataError::config(format!(
                "entity {} has no train labels; set train_label_suffix",
                self.name
            ))
        })?;

        get_positive_dataloaders(
            self.train.clone(),
            train_label,
            self.test.clone(),
            self.valid.clone(),
            options,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize) -> Arc<Array2<f32>> {
        Arc::new(Array2::from_shape_fn((rows, cols), |(r, c)| (r * cols + c) as f32))
    }

    fn options() -> LoaderOptions {
        LoaderOptions {
            batch_size: 8,
            num_workers: 0,
            seed: Some(3),
            ..LoaderOptions::default()
        }
    }

    fn entity(train_label: Option<Arc<Array1<f32>>>) -> EntityData {
        EntityData {
            name: "machine-1-1".to_string(),
            train: matrix(40, 4),
            valid: Some(matrix(10, 4)),
            test: matrix(25, 4),
            test_label: Arc::new(Array1::zeros(25)),
            train_label,
        }
    }

    #[test]
    fn test_get_dataloaders() {
        let mut loaders =
            get_dataloaders(matrix(40, 4), matrix(25, 4), Some(matrix(10, 4)), &options()).unwrap();

        assert_eq!(loaders.train.len(), 5);
        assert_eq!(loaders.valid.as_ref().unwrap().len(), 2);
        assert_eq!(loaders.test.len(), 4);

        assert!(loaders.train.config().shuffle);
        assert!(loaders.valid.as_ref().unwrap().config().shuffle);
        assert!(!loaders.test.config().shuffle);

        let rows: Vec<usize> = loaders
            .test
            .iter()
            .unwrap()
            .flat_map(|batch| batch.unwrap().indices)
            .collect();
        assert_eq!(rows, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_seeded_valid_order_differs_from_train() {
        let options = LoaderOptions {
            batch_size: 64,
            ..options()
        };
        let mut loaders =
            get_dataloaders(matrix(64, 2), matrix(4, 2), Some(matrix(64, 2)), &options).unwrap();
        let mut valid = loaders.valid.take().unwrap();

        let train_order = loaders.train.iter().unwrap().next().unwrap().unwrap().indices;
        let valid_order = valid.iter().unwrap().next().unwrap().unwrap().indices;
        assert_ne!(train_order, valid_order);

        // Both stay reproducible from the same options.
        let mut again =
            get_dataloaders(matrix(64, 2), matrix(4, 2), Some(matrix(64, 2)), &options).unwrap();
        let valid_again = again.valid.as_mut().unwrap().iter().unwrap().next().unwrap().unwrap();
        assert_eq!(valid_again.indices, valid_order);
    }

    #[test]
    fn test_without_valid() {
        let loaders = get_dataloaders(matrix(4, 2), matrix(4, 2), None, &options()).unwrap();
        assert!(loaders.valid.is_none());
    }

    #[test]
    fn test_no_shuffle_option() {
        let options = LoaderOptions {
            shuffle: false,
            ..options()
        };
        let loaders = get_dataloaders(matrix(4, 2), matrix(4, 2), Some(matrix(2, 2)), &options).unwrap();
        assert!(!loaders.train.config().shuffle);
        assert!(!loaders.valid.unwrap().config().shuffle);
    }

    #[test]
    fn test_next_steps_applied_to_all_partitions() {
        let options = LoaderOptions {
            next_steps: 1,
            ..options()
        };
        let mut loaders =
            get_dataloaders(matrix(6, 3), matrix(6, 3), Some(matrix(2, 3)), &options).unwrap();

        let batch = loaders.test.iter().unwrap().next().unwrap().unwrap();
        assert_eq!(batch.input.ncols(), 2);
        assert_eq!(batch.target.unwrap().ncols(), 1);

        let batch = loaders.train.iter().unwrap().next().unwrap().unwrap();
        assert_eq!(batch.input.ncols(), 2);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let options = LoaderOptions {
            batch_size: 0,
            ..options()
        };
        let err = get_dataloaders(matrix(4, 2), matrix(4, 2), None, &options).unwrap_err();
        assert!(matches!(err, DataError::Config { .. }));
    }

    #[test]
    fn test_positive_dataloaders() {
        let labels = Arc::new(Array1::from_elem(40, 1.0));
        let mut loaders = get_positive_dataloaders(
            matrix(40, 4),
            labels,
            matrix(25, 4),
            None,
            &options(),
        )
        .unwrap();

        assert_eq!(loaders.train.len(), 5);
        let batch = loaders.train.iter().unwrap().next().unwrap().unwrap();
        assert_eq!(batch.data.dim(), (8, 4));
        assert!(batch.labels.iter().all(|&l| l == 1.0));
    }

    #[test]
    fn test_positive_label_mismatch() {
        let labels = Arc::new(Array1::zeros(39));
        let err = get_positive_dataloaders(matrix(40, 4), labels, matrix(2, 4), None, &options())
            .unwrap_err();
        assert!(matches!(err, DataError::Shape { .. }));
    }

    #[test]
    fn test_entity_dataloaders() {
        let entity = entity(None);
        let loaders = entity.dataloaders(&options()).unwrap();
        assert_eq!(loaders.train.num_records(), 40);
        assert_eq!(loaders.valid.unwrap().num_records(), 10);
        assert_eq!(loaders.test.num_records(), 25);

        let err = entity.positive_dataloaders(&options()).unwrap_err();
        assert!(matches!(err, DataError::Config { .. }));
        assert!(err.to_string().contains("machine-1-1"));
    }

    #[test]
    fn test_entity_positive_dataloaders() {
        let entity = entity(Some(Arc::new(Array1::zeros(40))));
        let loaders = entity.positive_dataloaders(&options()).unwrap();
        assert_eq!(loaders.train.num_records(), 40);
    }
}
