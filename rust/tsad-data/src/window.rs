// rust/tsad-data/src/window.rs

//! Indexed record sources over loaded arrays.
//!
//! A record source exposes a length and per-index access, plus a batched
//! gather used by [`DataLoader`](crate::dataloader::DataLoader). Invariants
//! (column counts, label alignment) are checked when a source is built, so
//! access only fails on an out-of-range index.

use std::sync::Arc;

use ndarray::{s, Array1, Array2, Axis};

use crate::error::{DataError, Result};

/// Fixed-size indexed access to records.
pub trait RecordSource: Send + Sync {
    /// A single record.
    type Record;
    /// Several records stacked along a leading batch axis.
    type Batch: Send;

    /// Number of records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the record at `index`.
    fn get(&self, index: usize) -> Result<Self::Record>;

    /// Stacks the records at `indices`, in the given order.
    fn batch(&self, indices: &[usize]) -> Result<Self::Batch>;

    /// Name of this source kind.
    fn name(&self) -> &'static str;
}

fn check_indices(indices: &[usize], len: usize) -> Result<()> {
    match indices.iter().find(|&&i| i >= len) {
        Some(&index) => Err(DataError::index_out_of_bounds(index, len)),
        None => Ok(()),
    }
}

/// One row, optionally split into input and target columns.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRecord {
    /// The full row, or all but the trailing `next_steps` columns.
    pub input: Array1<f32>,
    /// The trailing `next_steps` columns, when splitting.
    pub target: Option<Array1<f32>>,
}

/// A batch of [`WindowRecord`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    /// `[batch, ncols - next_steps]`
    pub input: Array2<f32>,
    /// `[batch, next_steps]`, when splitting.
    pub target: Option<Array2<f32>>,
    /// Source row of each batch entry.
    pub indices: Vec<usize>,
}

impl WindowBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Rows of a 2-D array; with `next_steps > 0` each row is split on the
/// feature axis into leading input columns and `next_steps` trailing target
/// columns.
#[derive(Debug, Clone)]
pub struct WindowDataset {
    data: Arc<Array2<f32>>,
    next_steps: usize,
}

impl WindowDataset {
    /// Wraps `data`.
    ///
    /// # Errors
    ///
    /// Returns a shape error if rows have fewer than `next_steps` columns.
    pub fn new(data: Arc<Array2<f32>>, next_steps: usize) -> Result<Self> {
        if next_steps > data.ncols() {
            return Err(DataError::shape(format!(
                "next_steps ({next_steps}) exceeds the number of columns ({})",
                data.ncols()
            )));
        }
        Ok(Self { data, next_steps })
    }

    pub fn next_steps(&self) -> usize {
        self.next_steps
    }

    pub fn data(&self) -> &Arc<Array2<f32>> {
        &self.data
    }

    fn split_at(&self) -> usize {
        self.data.ncols() - self.next_steps
    }
}

impl RecordSource for WindowDataset {
    type Record = WindowRecord;
    type Batch = WindowBatch;

    fn len(&self) -> usize {
        self.data.nrows()
    }

    fn get(&self, index: usize) -> Result<WindowRecord> {
        if index >= self.len() {
            return Err(DataError::index_out_of_bounds(index, self.len()));
        }

        let row = self.data.row(index);
        if self.next_steps == 0 {
            return Ok(WindowRecord {
                input: row.to_owned(),
                target: None,
            });
        }

        let split = self.split_at();
        Ok(WindowRecord {
            input: row.slice(s![..split]).to_owned(),
            target: Some(row.slice(s![split..]).to_owned()),
        })
    }

    fn batch(&self, indices: &[usize]) -> Result<WindowBatch> {
        check_indices(indices, self.len())?;

        let rows = self.data.select(Axis(0), indices);
        let (input, target) = if self.next_steps == 0 {
            (rows, None)
        } else {
            let split = self.split_at();
            (
                rows.slice(s![.., ..split]).to_owned(),
                Some(rows.slice(s![.., split..]).to_owned()),
            )
        };

        Ok(WindowBatch {
            input,
            target,
            indices: indices.to_vec(),
        })
    }

    fn name(&self) -> &'static str {
        "window"
    }
}

/// One row with its label.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRecord {
    pub data: Array1<f32>,
    pub label: f32,
}

/// A batch of [`LabeledRecord`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledBatch {
    /// `[batch, ncols]`
    pub data: Array2<f32>,
    /// `[batch]`
    pub labels: Array1<f32>,
    /// Source row of each batch entry.
    pub indices: Vec<usize>,
}

impl LabeledBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Rows of a 2-D array paired with a row-aligned label array.
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    data: Arc<Array2<f32>>,
    labels: Arc<Array1<f32>>,
}

impl LabeledDataset {
    /// Pairs `data` with `labels`.
    ///
    /// # Errors
    ///
    /// Returns a shape error if the row and label counts differ.
    pub fn new(data: Arc<Array2<f32>>, labels: Arc<Array1<f32>>) -> Result<Self> {
        if data.nrows() != labels.len() {
            return Err(DataError::shape(format!(
                "data has {} rows but {} labels",
                data.nrows(),
                labels.len()
            )));
        }
        Ok(Self { data, labels })
    }

    pub fn data(&self) -> &Arc<Array2<f32>> {
        &self.data
    }

    pub fn labels(&self) -> &Arc<Array1<f32>> {
        &self.labels
    }
}

impl RecordSource for LabeledDataset {
    type Record = LabeledRecord;
    type Batch = LabeledBatch;

    fn len(&self) -> usize {
        self.data.nrows()
    }

    fn get(&self, index: usize) -> Result<LabeledRecord> {
        if index >= self.len() {
            return Err(DataError::index_out_of_bounds(index, self.len()));
        }

        Ok(LabeledRecord {
            data: self.data.row(index).to_owned(),
            label: self.labels[index],
        })
    }

    fn batch(&self, indices: &[usize]) -> Result<LabeledBatch> {
        check_indices(indices, self.len())?;

        Ok(LabeledBatch {
            data: self.data.select(Axis(0), indices),
            labels: self.labels.select(Axis(0), indices),
            indices: indices.to_vec(),
        })
    }

    fn name(&self) -> &'static str {
        "labeled"
    }
}
