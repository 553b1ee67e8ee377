// rust/tsad-data/src/pipeline.rs

//! Config-driven orchestration.
//!
//! [`Pipeline`] ties the pieces together: it sets up the storage backend, turns
//! a [`PipelineConfig`] into load options, loads the configured entities and
//! builds their batch loaders.
//!
//! # Example
//!
//! ```no_run
//! use tsad_data::Pipeline;
//!
//! let pipeline = Pipeline::from_config_file("tsad.toml").unwrap();
//! let data = pipeline.load().unwrap();
//!
//! for entity in &data {
//!     let mut loaders = pipeline.dataloaders(entity).unwrap();
//!     for batch in loaders.train.iter().unwrap() {
//!         let batch = batch.unwrap();
//!         // Feed batch.input to the model
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{DataError, Result};
use crate::factory::DataLoaders;
use crate::format::FormatSelector;
use crate::loader::{DatasetCollection, DatasetLoader, EntityData};
use crate::storage::{LocalStorage, StorageBackend};
use crate::window::{LabeledDataset, WindowDataset};

/// Loads datasets and builds loaders according to a [`PipelineConfig`].
pub struct Pipeline {
    config: PipelineConfig,
    loader: DatasetLoader,
}

impl Pipeline {
    /// Creates a pipeline with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the default configuration fails validation.
    pub fn new() -> Result<Self> {
        Self::from_config(PipelineConfig::default())
    }

    /// Creates a pipeline from a TOML configuration file.
    ///
    /// Environment variable overrides are applied after loading the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = PipelineConfig::from_file(path)?.with_env_overrides();
        Self::from_config(config)
    }

    /// Creates a pipeline from a configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let delimiter = u8::try_from(config.data.delimiter).map_err(|_| {
            DataError::config(format!(
                "data.delimiter must be a single-byte character, got {:?}",
                config.data.delimiter
            ))
        })?;
        let formats = FormatSelector::new(config.data.format, delimiter);

        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage));
        let loader = DatasetLoader::with_formats(storage, formats);

        Ok(Self { config, loader })
    }

    /// Loads the configured entities.
    ///
    /// If `data.entities` is empty, every entity with a train partition in
    /// the data root is loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the data root cannot be resolved, the dimension
    /// of the named dataset is unknown, or any entity fails to load.
    pub fn load(&self) -> Result<DatasetCollection> {
        let data = &self.config.data;
        let root = data.resolve_root(&self.config.roots)?;
        let options = data.load_options()?;

        let entities = if data.entities.is_empty() {
            let found = self.loader.discover_entities(&root, &options.train_suffix)?;
            tracing::info!("Discovered {} entities in {}", found.len(), root.display());
            found
        } else {
            data.entities.clone()
        };

        if entities.is_empty() {
            tracing::warn!("No entities to load in {}", root.display());
        }

        self.loader.load(&root, &entities, &options)
    }

    /// Builds plain loaders for `entity` from the `[loader]` section.
    pub fn dataloaders(&self, entity: &EntityData) -> Result<DataLoaders<WindowDataset>> {
        entity.dataloaders(&self.config.loader)
    }

    /// Builds loaders for `entity` whose training loader yields labeled rows.
    pub fn positive_dataloaders(&self, entity: &EntityData) -> Result<DataLoaders<LabeledDataset>> {
        entity.positive_dataloaders(&self.config.loader)
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("loader", &self.loader)
            .finish()
    }
}
