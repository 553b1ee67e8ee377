// rust/tsad-data/src/registry.rs

//! Known dataset families and their fixed feature dimensionality.
//!
//! Dataset identifiers are matched by substring, so `"SMD"`,
//! `"SMD-machine-1-1"` and `"smd_SMD"` all resolve to the SMD family. The
//! families are checked in a fixed priority order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// A family of anomaly-detection datasets sharing one feature layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetFamily {
    /// Soil Moisture Active Passive satellite telemetry.
    Smap,
    /// Mars Science Laboratory rover telemetry.
    Msl,
    /// Server Machine Dataset.
    Smd,
    /// Application Server Dataset.
    Asd,
}

impl DatasetFamily {
    /// All families, in the order identifiers are matched against them.
    pub const ALL: [DatasetFamily; 4] = [
        DatasetFamily::Smap,
        DatasetFamily::Msl,
        DatasetFamily::Smd,
        DatasetFamily::Asd,
    ];

    /// Finds the first family whose name appears in `dataset`.
    pub fn detect(dataset: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|family| dataset.contains(family.name()))
    }

    /// Canonical upper-case name, as it appears in dataset identifiers.
    pub fn name(&self) -> &'static str {
        match self {
            DatasetFamily::Smap => "SMAP",
            DatasetFamily::Msl => "MSL",
            DatasetFamily::Smd => "SMD",
            DatasetFamily::Asd => "ASD",
        }
    }

    /// Number of feature columns per timestep.
    pub fn dim(&self) -> usize {
        match self {
            DatasetFamily::Smap => 25,
            DatasetFamily::Msl => 55,
            DatasetFamily::Smd => 38,
            DatasetFamily::Asd => 19,
        }
    }
}

impl fmt::Display for DatasetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns the feature dimensionality of the dataset named by `dataset`.
///
/// # Errors
///
/// Returns [`DataError::UnknownDataset`] when no known family name appears
/// in the identifier.
pub fn get_data_dim(dataset: &str) -> Result<usize> {
    DatasetFamily::detect(dataset)
        .map(|family| family.dim())
        .ok_or_else(|| DataError::unknown_dataset(dataset))
}

/// Canonical directories for dataset families, keyed by family name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetRoots {
    roots: BTreeMap<String, PathBuf>,
}

impl Default for DatasetRoots {
    fn default() -> Self {
        let roots = [DatasetFamily::Smd, DatasetFamily::Smap, DatasetFamily::Msl]
            .into_iter()
            .map(|family| {
                (
                    family.name().to_string(),
                    PathBuf::from(format!("./datasets/{}", family.name())),
                )
            })
            .collect();
        Self { roots }
    }
}

impl DatasetRoots {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            roots: BTreeMap::new(),
        }
    }

    /// Sets the directory for a family name, replacing any previous entry.
    pub fn insert(&mut self, family: impl Into<String>, root: impl Into<PathBuf>) {
        self.roots.insert(family.into(), root.into());
    }

    /// Looks up the directory registered for an exact family name.
    pub fn get(&self, family: &str) -> Option<&Path> {
        self.roots.get(family).map(PathBuf::as_path)
    }

    /// Resolves the directory for a dataset identifier via its family.
    pub fn root_for(&self, dataset: &str) -> Option<&Path> {
        let family = DatasetFamily::detect(dataset)?;
        self.get(family.name())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dims() {
        assert_eq!(get_data_dim("SMAP").unwrap(), 25);
        assert_eq!(get_data_dim("MSL").unwrap(), 55);
        assert_eq!(get_data_dim("SMD").unwrap(), 38);
        assert_eq!(get_data_dim("ASD").unwrap(), 19);
    }

    #[test]
    fn test_substring_match() {
        assert_eq!(get_data_dim("SMD-machine-1-1").unwrap(), 38);
        assert_eq!(get_data_dim("data/MSL_C-1").unwrap(), 55);
        assert_eq!(get_data_dim("omni_ASD_12").unwrap(), 19);
    }

    #[test]
    fn test_priority_order() {
        // Both names present: SMAP is checked before SMD.
        assert_eq!(DatasetFamily::detect("SMD_vs_SMAP"), Some(DatasetFamily::Smap));
        assert_eq!(get_data_dim("SMD_vs_SMAP").unwrap(), 25);
        assert_eq!(get_data_dim("MSL+SMD").unwrap(), 55);
    }

    #[test]
    fn test_unknown_dataset() {
        let err = get_data_dim("WADI").unwrap_err();
        assert!(matches!(err, DataError::UnknownDataset { ref name } if name == "WADI"));

        // Matching is case-sensitive.
        assert!(get_data_dim("smd").is_err());
        assert!(get_data_dim("").is_err());
    }

    #[test]
    fn test_default_roots() {
        let roots = DatasetRoots::default();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots.get("SMD"), Some(Path::new("./datasets/SMD")));
        assert_eq!(roots.root_for("SMAP"), Some(Path::new("./datasets/SMAP")));
        assert_eq!(roots.root_for("MSL_P-1"), Some(Path::new("./datasets/MSL")));
        assert_eq!(roots.root_for("ASD"), None);
        assert_eq!(roots.root_for("WADI"), None);
    }

    #[test]
    fn test_roots_insert_overrides() {
        let mut roots = DatasetRoots::default();
        roots.insert("SMD", "/mnt/smd");
        roots.insert("ASD", "/mnt/asd");

        assert_eq!(roots.root_for("SMD"), Some(Path::new("/mnt/smd")));
        assert_eq!(roots.root_for("ASD_1"), Some(Path::new("/mnt/asd")));
    }

    #[test]
    fn test_roots_toml_table() {
        #[derive(Deserialize)]
        struct Wrapper {
            roots: DatasetRoots,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [roots]
            SMD = "/data/smd"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.roots.len(), 1);
        assert_eq!(parsed.roots.root_for("SMD"), Some(Path::new("/data/smd")));
    }
}
