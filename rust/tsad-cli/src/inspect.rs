// rust/tsad-cli/src/inspect.rs

//! One-epoch traversal of an entity's loaders.

use std::time::{Duration, Instant};

use tsad_data::{DataLoader, DataLoaders, LabeledBatch, RecordSource, Result, WindowBatch};

/// Batches that know how many records they hold.
pub trait BatchRows {
    fn rows(&self) -> usize;
}

impl BatchRows for WindowBatch {
    fn rows(&self) -> usize {
        self.len()
    }
}

impl BatchRows for LabeledBatch {
    fn rows(&self) -> usize {
        self.len()
    }
}

/// Counts gathered while traversing one loader for one epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochSummary {
    pub batches: usize,
    pub records: usize,
    pub elapsed: Duration,
}

/// Pulls every batch of one pass of `loader`.
pub fn traverse<S>(loader: &mut DataLoader<S>) -> Result<EpochSummary>
where
    S: RecordSource + 'static,
    S::Batch: BatchRows,
{
    let start = Instant::now();
    let mut summary = EpochSummary::default();

    for batch in loader.iter()? {
        summary.batches += 1;
        summary.records += batch?.rows();
    }

    summary.elapsed = start.elapsed();
    Ok(summary)
}

/// Traverses train, valid and test loaders of one entity, logging counts.
pub fn inspect_entity<T>(name: &str, loaders: &mut DataLoaders<T>) -> Result<()>
where
    T: RecordSource + 'static,
    T::Batch: BatchRows,
{
    let train = traverse(&mut loaders.train)?;
    report(name, "train", &train);

    if let Some(valid) = loaders.valid.as_mut() {
        let valid = traverse(valid)?;
        report(name, "valid", &valid);
    }

    let test = traverse(&mut loaders.test)?;
    report(name, "test", &test);

    Ok(())
}

fn report(entity: &str, partition: &str, summary: &EpochSummary) {
    tracing::info!(
        "{} {}: {} batches, {} records in {:.2?}",
        entity,
        partition,
        summary.batches,
        summary.records,
        summary.elapsed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};
    use std::sync::Arc;
    use tsad_data::{get_dataloaders, get_positive_dataloaders, LoaderOptions};

    fn matrix(rows: usize) -> Arc<Array2<f32>> {
        Arc::new(Array2::zeros((rows, 3)))
    }

    #[test]
    fn test_traverse_counts() {
        let options = LoaderOptions {
            batch_size: 4,
            num_workers: 2,
            ..LoaderOptions::default()
        };
        let mut loaders = get_dataloaders(matrix(10), matrix(7), Some(matrix(3)), &options).unwrap();

        let train = traverse(&mut loaders.train).unwrap();
        assert_eq!((train.batches, train.records), (3, 10));

        let valid = traverse(loaders.valid.as_mut().unwrap()).unwrap();
        assert_eq!((valid.batches, valid.records), (1, 3));

        let test = traverse(&mut loaders.test).unwrap();
        assert_eq!((test.batches, test.records), (2, 7));
    }

    #[test]
    fn test_inspect_positive() {
        let options = LoaderOptions {
            batch_size: 3,
            num_workers: 0,
            ..LoaderOptions::default()
        };
        let labels = Arc::new(Array1::zeros(5));
        let mut loaders =
            get_positive_dataloaders(matrix(5), labels, matrix(2), None, &options).unwrap();

        assert!(inspect_entity("E-1", &mut loaders).is_ok());
    }
}
