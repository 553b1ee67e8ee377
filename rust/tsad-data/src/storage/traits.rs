// rust/tsad-data/src/storage/traits.rs

//! Storage abstraction traits for dataset loading.
//!
//! The loader only ever reads, so backends expose directory listing and
//! readers. Any implementation (local filesystem, an in-memory fixture, a
//! remote mount) can be plugged into
//! [`DatasetLoader`](crate::loader::DatasetLoader).

use std::io::{Read, Seek};
use std::path::Path;

use crate::error::{DataError, Result};

/// A handle for reading from storage.
pub trait StorageReader: Read + Seek + Send {
    /// Returns the total size of the object in bytes.
    fn size(&self) -> u64;

    /// Location of the object, as resolved by the backend.
    fn path(&self) -> &Path;

    /// Reads the whole object from the start.
    ///
    /// # Errors
    ///
    /// Returns an error if seeking or reading fails.
    fn read_all(&mut self) -> Result<Vec<u8>> {
        if let Err(e) = self.rewind() {
            return Err(DataError::storage_with_source(self.path(), "failed to rewind", e));
        }

        let mut buf = Vec::with_capacity(self.size() as usize);
        if let Err(e) = self.read_to_end(&mut buf) {
            return Err(DataError::storage_with_source(self.path(), "failed to read object", e));
        }
        Ok(buf)
    }
}

/// The read-only storage backend trait.
///
/// # Object Safety
///
/// This trait is object-safe and can be used with `Arc<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    /// Opens an object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Lists entry names directly under `prefix`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list(&self, prefix: &Path) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, SeekFrom};
    use std::path::PathBuf;

    /// Reader whose reads always fail.
    struct BrokenReader {
        path: PathBuf,
    }

    impl Read for BrokenReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    impl Seek for BrokenReader {
        fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
            Ok(0)
        }
    }

    impl StorageReader for BrokenReader {
        fn size(&self) -> u64 {
            16
        }

        fn path(&self) -> &Path {
            &self.path
        }
    }

    #[test]
    fn test_read_all_error_names_reader_path() {
        let mut reader = BrokenReader {
            path: PathBuf::from("/data/SMD/machine-1-1_train.npy"),
        };

        match reader.read_all().unwrap_err() {
            DataError::Storage { path, message, source } => {
                assert_eq!(path, PathBuf::from("/data/SMD/machine-1-1_train.npy"));
                assert_eq!(message, "failed to read object");
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
