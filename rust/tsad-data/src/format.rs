// rust/tsad-data/src/format.rs

//! Decoders for serialized arrays.
//!
//! Every partition file holds a single numeric array. Decoders turn the raw
//! bytes into a dynamically shaped `f32` array; the loader then checks the
//! dimensionality it expects for the partition.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, ArrayD};
use ndarray_npy::{ReadNpyError, ReadNpyExt};
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

/// Describes how to decode an array from its serialized bytes.
pub trait ArrayFormat: Send + Sync {
    /// Decodes `bytes` read from `path` into an `f32` array.
    ///
    /// `path` is only used for error reporting.
    fn decode(&self, bytes: &[u8], path: &Path) -> Result<ArrayD<f32>>;

    /// Name of this array format.
    fn name(&self) -> &'static str;
}

/// NumPy `.npy` files.
///
/// Floating point, integer and boolean dtypes are accepted and converted to
/// `f32`.
#[derive(Debug, Clone, Default)]
pub struct NpyFormat;

impl NpyFormat {
    pub fn new() -> Self {
        Self
    }
}

// Tries one element type; falls through to the next on a dtype mismatch.
macro_rules! try_npy_dtype {
    ($bytes:expr, $ty:ty, $convert:expr) => {
        match ArrayD::<$ty>::read_npy($bytes) {
            Ok(array) => return Ok(array.mapv($convert)),
            Err(ReadNpyError::WrongDescriptor(_)) => {}
            Err(e) => return Err(e),
        }
    };
}

fn decode_npy(bytes: &[u8]) -> std::result::Result<ArrayD<f32>, ReadNpyError> {
    try_npy_dtype!(bytes, f32, |v| v);
    try_npy_dtype!(bytes, f64, |v| v as f32);
    try_npy_dtype!(bytes, i64, |v| v as f32);
    try_npy_dtype!(bytes, i32, |v| v as f32);
    try_npy_dtype!(bytes, i16, |v| v as f32);
    try_npy_dtype!(bytes, i8, |v| v as f32);
    try_npy_dtype!(bytes, u64, |v| v as f32);
    try_npy_dtype!(bytes, u32, |v| v as f32);
    try_npy_dtype!(bytes, u16, |v| v as f32);
    try_npy_dtype!(bytes, u8, |v| v as f32);

    // Last candidate: report its error as-is.
    ArrayD::<bool>::read_npy(bytes).map(|array| array.mapv(|v| if v { 1.0 } else { 0.0 }))
}

impl ArrayFormat for NpyFormat {
    fn decode(&self, bytes: &[u8], path: &Path) -> Result<ArrayD<f32>> {
        if bytes.is_empty() {
            return Err(DataError::deserialization(path, "file is empty"));
        }

        decode_npy(bytes).map_err(|e| match e {
            ReadNpyError::WrongDescriptor(descr) => DataError::deserialization(
                path,
                format!("unsupported npy dtype {descr}"),
            ),
            other => DataError::deserialization_with_source(path, "invalid npy data", other),
        })
    }

    fn name(&self) -> &'static str {
        "npy"
    }
}

/// Delimited text files: one timestep per line, no header.
///
/// Empty fields and `nan` parse as NaN. Every line must have the same number
/// of fields.
#[derive(Debug, Clone)]
pub struct TextFormat {
    delimiter: u8,
}

impl TextFormat {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

impl Default for TextFormat {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl ArrayFormat for TextFormat {
    fn decode(&self, bytes: &[u8], path: &Path) -> Result<ArrayD<f32>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .from_reader(bytes);

        let mut values = Vec::new();
        let mut rows = 0usize;
        let mut cols = 0usize;

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| {
                DataError::deserialization_with_source(path, "malformed delimited text", e)
            })?;

            if rows == 0 {
                cols = record.len();
            }

            for field in record.iter() {
                let value = if field.is_empty() {
                    f32::NAN
                } else {
                    field.parse::<f32>().map_err(|e| {
                        DataError::deserialization_with_source(
                            path,
                            format!("invalid number '{field}' on line {}", line + 1),
                            e,
                        )
                    })?
                };
                values.push(value);
            }
            rows += 1;
        }

        if rows == 0 {
            return Err(DataError::deserialization(path, "file contains no rows"));
        }

        let array = Array2::from_shape_vec((rows, cols), values).map_err(|e| {
            DataError::deserialization_with_source(path, "inconsistent row lengths", e)
        })?;
        Ok(array.into_dyn())
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

/// Which decoder to use for partition files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayFormatKind {
    /// Pick by file extension: `.txt`/`.csv` as text, everything else as npy.
    #[default]
    Auto,
    /// NumPy `.npy`.
    Npy,
    /// Delimited text.
    Text,
}

/// Chooses a decoder per file according to an [`ArrayFormatKind`].
#[derive(Clone)]
pub struct FormatSelector {
    kind: ArrayFormatKind,
    npy: Arc<NpyFormat>,
    text: Arc<TextFormat>,
}

impl FormatSelector {
    pub fn new(kind: ArrayFormatKind, delimiter: u8) -> Self {
        Self {
            kind,
            npy: Arc::new(NpyFormat::new()),
            text: Arc::new(TextFormat::new(delimiter)),
        }
    }

    /// Returns the decoder for `path`.
    pub fn for_path(&self, path: &Path) -> Arc<dyn ArrayFormat> {
        match self.kind {
            ArrayFormatKind::Npy => self.npy.clone(),
            ArrayFormatKind::Text => self.text.clone(),
            ArrayFormatKind::Auto => {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase);
                match ext.as_deref() {
                    Some("txt") | Some("csv") => self.text.clone(),
                    _ => self.npy.clone(),
                }
            }
        }
    }

    pub fn kind(&self) -> ArrayFormatKind {
        self.kind
    }
}

impl Default for FormatSelector {
    fn default() -> Self {
        Self::new(ArrayFormatKind::Auto, b',')
    }
}

impl std::fmt::Debug for FormatSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatSelector")
            .field("kind", &self.kind)
            .field("delimiter", &(self.text.delimiter() as char))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1, Array3};
    use ndarray_npy::WriteNpyExt;

    fn npy_bytes<A, D>(array: &ndarray::Array<A, D>) -> Vec<u8>
    where
        A: ndarray_npy::WritableElement,
        D: ndarray::Dimension,
    {
        let mut buf = Vec::new();
        array.write_npy(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_npy_f32_matrix() {
        let original = array![[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let decoded = NpyFormat::new()
            .decode(&npy_bytes(&original), Path::new("a.npy"))
            .unwrap();

        assert_eq!(decoded.shape(), &[2, 3]);
        assert_eq!(decoded.into_dimensionality::<ndarray::Ix2>().unwrap(), original);
    }

    #[test]
    fn test_npy_converts_dtypes() {
        let floats = array![[0.5f64, f64::NAN]];
        let decoded = NpyFormat::new().decode(&npy_bytes(&floats), Path::new("f.npy")).unwrap();
        assert_eq!(decoded[[0, 0]], 0.5);
        assert!(decoded[[0, 1]].is_nan());

        let ints = Array1::from(vec![0i64, 1, 1, 0]);
        let decoded = NpyFormat::new().decode(&npy_bytes(&ints), Path::new("l.npy")).unwrap();
        assert_eq!(decoded.iter().copied().collect::<Vec<_>>(), vec![0.0, 1.0, 1.0, 0.0]);

        let flags = Array1::from(vec![true, false]);
        let decoded = NpyFormat::new().decode(&npy_bytes(&flags), Path::new("b.npy")).unwrap();
        assert_eq!(decoded.iter().copied().collect::<Vec<_>>(), vec![1.0, 0.0]);

        let bytes = Array1::from(vec![3u8, 7]);
        let decoded = NpyFormat::new().decode(&npy_bytes(&bytes), Path::new("u.npy")).unwrap();
        assert_eq!(decoded.iter().copied().collect::<Vec<_>>(), vec![3.0, 7.0]);
    }

    #[test]
    fn test_npy_keeps_higher_dims() {
        let cube = Array3::<f32>::zeros((2, 3, 4));
        let decoded = NpyFormat::new().decode(&npy_bytes(&cube), Path::new("c.npy")).unwrap();
        assert_eq!(decoded.shape(), &[2, 3, 4]);
    }

    #[test]
    fn test_npy_empty_file() {
        let err = NpyFormat::new().decode(&[], Path::new("empty.npy")).unwrap_err();
        assert!(matches!(err, DataError::Deserialization { .. }));
        assert!(err.to_string().contains("empty.npy"));
    }

    #[test]
    fn test_npy_garbage() {
        let err = NpyFormat::new()
            .decode(b"definitely not numpy", Path::new("bad.npy"))
            .unwrap_err();
        assert!(matches!(err, DataError::Deserialization { .. }));
    }

    #[test]
    fn test_text_matrix() {
        let text = b"1.0,2.0,3.0\n4, 5 ,6\n";
        let decoded = TextFormat::default().decode(text, Path::new("a.txt")).unwrap();
        assert_eq!(decoded.shape(), &[2, 3]);
        assert_eq!(decoded[[1, 1]], 5.0);
    }

    #[test]
    fn test_text_nan_fields() {
        let text = b"1,,nan\nNaN,2,3\n";
        let decoded = TextFormat::default().decode(text, Path::new("a.txt")).unwrap();
        assert!(decoded[[0, 1]].is_nan());
        assert!(decoded[[0, 2]].is_nan());
        assert!(decoded[[1, 0]].is_nan());
        assert_eq!(decoded[[1, 2]], 3.0);
    }

    #[test]
    fn test_text_custom_delimiter() {
        let text = b"1 2\n3 4\n";
        let decoded = TextFormat::new(b' ').decode(text, Path::new("a.txt")).unwrap();
        assert_eq!(decoded.shape(), &[2, 2]);
        assert_eq!(decoded[[1, 0]], 3.0);
    }

    #[test]
    fn test_text_ragged_rows() {
        let err = TextFormat::default()
            .decode(b"1,2,3\n4,5\n", Path::new("ragged.txt"))
            .unwrap_err();
        assert!(matches!(err, DataError::Deserialization { .. }));
    }

    #[test]
    fn test_text_bad_number() {
        let err = TextFormat::default()
            .decode(b"1,abc\n", Path::new("bad.txt"))
            .unwrap_err();
        assert!(err.to_string().contains("bad.txt"));
    }

    #[test]
    fn test_text_empty() {
        assert!(TextFormat::default().decode(b"", Path::new("e.txt")).is_err());
    }

    #[test]
    fn test_selector_auto() {
        let selector = FormatSelector::default();
        assert_eq!(selector.for_path(Path::new("m_train.npy")).name(), "npy");
        assert_eq!(selector.for_path(Path::new("m_train.txt")).name(), "text");
        assert_eq!(selector.for_path(Path::new("m_train.CSV")).name(), "text");
        assert_eq!(selector.for_path(Path::new("m_train.pkl")).name(), "npy");
    }

    #[test]
    fn test_selector_forced() {
        let selector = FormatSelector::new(ArrayFormatKind::Text, b';');
        assert_eq!(selector.for_path(Path::new("m_train.npy")).name(), "text");

        let selector = FormatSelector::new(ArrayFormatKind::Npy, b',');
        assert_eq!(selector.for_path(Path::new("m_train.txt")).name(), "npy");
    }
}
