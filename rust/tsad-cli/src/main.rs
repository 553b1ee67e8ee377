// rust/tsad-cli/src/main.rs

//! Time-Series Anomaly Detection Dataset Inspector
//!
//! This binary loads a benchmark dataset the same way training does, builds
//! the train/valid/test loaders for every entity and traverses one epoch of
//! each, logging batch and record counts.
//!
//! # Usage
//!
//! ```bash
//! # Inspect two SMD machines from the registered SMD root
//! tsad-inspect --dataset SMD --entities machine-1-1,machine-1-2
//!
//! # Use a custom directory with a validation split
//! tsad-inspect --data-root ./data/SMAP --dataset SMAP --valid-ratio 0.2
//!
//! # Start from a configuration file
//! tsad-inspect --config tsad.toml --num-workers 4
//! ```

mod inspect;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tsad_data::{Pipeline, PipelineConfig};

/// Time-Series Anomaly Detection Dataset Inspector
#[derive(Parser, Debug)]
#[command(name = "tsad-inspect")]
#[command(about = "Load an anomaly-detection dataset and traverse one epoch of batches")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dataset family name (SMAP, MSL, SMD, ASD); selects dim and data root
    #[arg(short, long)]
    dataset: Option<String>,

    /// Directory holding the entity files
    #[arg(long)]
    data_root: Option<PathBuf>,

    /// Entities to load; all entities in the data root if omitted
    #[arg(short, long, value_delimiter = ',')]
    entities: Vec<String>,

    /// Fraction of the train rows held out for validation
    #[arg(long)]
    valid_ratio: Option<f64>,

    /// Keep only the first N rows of each partition
    #[arg(long)]
    row_limit: Option<usize>,

    /// Records per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Trailing columns split off as the prediction target
    #[arg(long)]
    next_steps: Option<usize>,

    /// Worker threads assembling batches (0 = calling thread)
    #[arg(long)]
    num_workers: Option<usize>,

    /// Keep row order in train and valid loaders
    #[arg(long)]
    no_shuffle: bool,

    /// Seed for reproducible shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Pair train rows with train labels
    #[arg(long)]
    positive: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Builds the pipeline configuration: file (or defaults), then `TSAD_*`
    /// environment overrides, then command-line flags.
    fn pipeline_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        }
        .with_env_overrides();

        if let Some(dataset) = &self.dataset {
            config.data.dataset = Some(dataset.clone());
        }
        if let Some(root) = &self.data_root {
            config.data.data_root = Some(root.clone());
        }
        if !self.entities.is_empty() {
            config.data.entities = self
                .entities
                .iter()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(ratio) = self.valid_ratio {
            config.data.valid_ratio = ratio;
        }
        if let Some(limit) = self.row_limit {
            config.data.row_limit = Some(limit);
        }
        if let Some(batch_size) = self.batch_size {
            config.loader.batch_size = batch_size;
        }
        if let Some(next_steps) = self.next_steps {
            config.loader.next_steps = next_steps;
        }
        if let Some(num_workers) = self.num_workers {
            config.loader.num_workers = num_workers;
        }
        if self.no_shuffle {
            config.loader.shuffle = false;
        }
        if let Some(seed) = self.seed {
            config.loader.seed = Some(seed);
        }
        if self.positive && config.data.train_label_suffix.is_none() {
            config.data.train_label_suffix = Some("train_label.npy".to_string());
        }

        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.pipeline_config()?;

    tracing::info!("Starting TSAD inspector");
    tracing::info!("  Dataset: {}", config.data.dataset.as_deref().unwrap_or("-"));
    tracing::info!("  Valid ratio: {}", config.data.valid_ratio);
    tracing::info!("  Batch size: {}", config.loader.batch_size);
    tracing::info!("  Next steps: {}", config.loader.next_steps);
    tracing::info!("  Workers: {}", config.loader.num_workers);
    tracing::info!("  Shuffle: {}", config.loader.shuffle);

    let pipeline = Pipeline::from_config(config)?;
    let data = pipeline.load()?;

    for entity in &data {
        tracing::info!("Entity {} (dim {})", entity.name, entity.dim());

        if args.positive {
            let mut loaders = pipeline.positive_dataloaders(entity)?;
            inspect::inspect_entity(&entity.name, &mut loaders)?;
        } else {
            let mut loaders = pipeline.dataloaders(entity)?;
            inspect::inspect_entity(&entity.name, &mut loaders)?;
        }
    }

    tracing::info!("Inspected {} entities", data.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::parse_from([
            "tsad-inspect",
            "--dataset",
            "SMD",
            "--entities",
            "machine-1-1, machine-1-2",
            "--valid-ratio",
            "0.3",
            "--batch-size",
            "16",
            "--num-workers",
            "0",
            "--no-shuffle",
            "--seed",
            "7",
            "--positive",
        ]);
        let config = args.pipeline_config().unwrap();

        assert_eq!(config.data.dataset.as_deref(), Some("SMD"));
        assert_eq!(config.data.entities, vec!["machine-1-1", "machine-1-2"]);
        assert_eq!(config.data.valid_ratio, 0.3);
        assert_eq!(config.loader.batch_size, 16);
        assert_eq!(config.loader.num_workers, 0);
        assert!(!config.loader.shuffle);
        assert_eq!(config.loader.seed, Some(7));
        assert_eq!(config.data.train_label_suffix.as_deref(), Some("train_label.npy"));
    }

    #[test]
    fn test_defaults_without_flags() {
        let args = Args::parse_from(["tsad-inspect"]);
        assert!(args.entities.is_empty());
        assert!(!args.positive);
        assert_eq!(args.log_level, "info");
    }
}
