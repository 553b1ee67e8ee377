// rust/tsad-data/src/storage/mod.rs

//! Storage abstraction for dataset loading.
//!
//! The loader reads every partition file through a [`StorageBackend`].
//! [`LocalStorage`] memory-maps large files and buffers small ones.
//!
//! # Example
//!
//! ```no_run
//! use tsad_data::config::StorageConfig;
//! use tsad_data::storage::{LocalStorage, StorageBackend};
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default());
//! let mut reader = storage.open_read(Path::new("datasets/SMD/machine-1-1_train.npy")).unwrap();
//! let bytes = reader.read_all().unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{StorageBackend, StorageReader};
