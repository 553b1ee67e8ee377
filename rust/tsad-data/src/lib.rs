// rust/tsad-data/src/lib.rs

//! Time-Series Anomaly Detection - Data Pipeline
//!
//! This crate loads multivariate time-series benchmark datasets (SMAP, MSL,
//! SMD, ASD and compatible layouts), splits and sanitizes them, and serves
//! them to training code as batched, optionally shuffled iterators.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::{DataConfig, LoaderOptions, PipelineConfig, StorageConfig};
pub use error::{DataError, Result};
pub use storage::{LocalStorage, StorageBackend, StorageReader};

pub mod registry;
pub use registry::{get_data_dim, DatasetFamily, DatasetRoots};

pub mod format;
pub use format::{ArrayFormat, ArrayFormatKind, FormatSelector, NpyFormat, TextFormat};

pub mod loader;
pub use loader::{
    discover_entities, load_dataset, sanitize, sanitize_nan, split_validation, DatasetCollection,
    DatasetLoader, EntityData, LoadOptions,
};

pub mod window;
pub use window::{
    LabeledBatch, LabeledDataset, LabeledRecord, RecordSource, WindowBatch, WindowDataset,
    WindowRecord,
};

pub mod dataloader;
pub use dataloader::{BatchConfig, BatchIter, DataLoader};

pub mod factory;
pub use factory::{get_dataloaders, get_positive_dataloaders, DataLoaders};

pub mod pipeline;
pub use pipeline::Pipeline;
