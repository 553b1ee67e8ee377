// rust/tsad-data/src/storage/local.rs

//! Local filesystem storage backend.
//!
//! Small files are read through a buffered reader; files at or above the
//! configured threshold are memory-mapped.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{StorageBackend, StorageReader};
use crate::config::StorageConfig;
use crate::error::{DataError, Result};

/// Local filesystem storage backend.
///
/// Relative paths are resolved against the configured base path; absolute
/// paths are used as given.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    buffer_size: usize,
    use_mmap: bool,
    mmap_threshold: u64,
}

impl LocalStorage {
    /// Creates a new `LocalStorage` instance from configuration.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            base_path: config.base_path.clone(),
            buffer_size: config.buffer_size,
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

impl StorageBackend for LocalStorage {
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path)
            .map_err(|e| DataError::storage_with_source(&full_path, "failed to open file", e))?;

        let meta = file.metadata().map_err(|e| {
            DataError::storage_with_source(&full_path, "failed to read file metadata", e)
        })?;
        if meta.is_dir() {
            return Err(DataError::storage(&full_path, "path is a directory"));
        }
        let size = meta.len();

        // Zero-length files cannot be mapped on every platform.
        if self.use_mmap && size > 0 && size >= self.mmap_threshold {
            // SAFETY: The file is opened read-only and the map lives as long
            // as the reader. Dataset files are not modified while loading.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                DataError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;

            Ok(Box::new(MmapReader::new(mmap, full_path)))
        } else {
            Ok(Box::new(LocalReader::new(file, full_path, size, self.buffer_size)))
        }
    }

    fn list(&self, prefix: &Path) -> Result<Vec<String>> {
        let full_path = self.resolve_path(prefix);

        if !full_path.exists() {
            return Err(DataError::storage(&full_path, "directory does not exist"));
        }

        if !full_path.is_dir() {
            return Err(DataError::storage(&full_path, "path is not a directory"));
        }

        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path).map_err(|e| {
            DataError::storage_with_source(&full_path, "failed to read directory", e)
        })? {
            let entry = entry.map_err(|e| {
                DataError::storage_with_source(&full_path, "failed to read directory entry", e)
            })?;

            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }
}

/// Buffered file reader for local storage.
struct LocalReader {
    reader: BufReader<File>,
    path: PathBuf,
    size: u64,
}

impl LocalReader {
    fn new(file: File, path: PathBuf, size: u64, buffer_size: usize) -> Self {
        Self {
            reader: BufReader::with_capacity(buffer_size.max(1), file),
            path,
            size,
        }
    }
}

impl Read for LocalReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for LocalReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl StorageReader for LocalReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Memory-mapped file reader for local storage.
struct MmapReader {
    mmap: Mmap,
    path: PathBuf,
    position: u64,
}

impl MmapReader {
    fn new(mmap: Mmap, path: PathBuf) -> Self {
        Self {
            mmap,
            path,
            position: 0,
        }
    }
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let pos = (self.position as usize).min(self.mmap.len());
        let remaining = &self.mmap[pos..];
        let to_read = buf.len().min(remaining.len());

        buf[..to_read].copy_from_slice(&remaining[..to_read]);
        self.position += to_read as u64;
        Ok(to_read)
    }
}

impl Seek for MmapReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.mmap.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to negative position",
            ));
        }

        self.position = new_pos as u64;
        Ok(self.position)
    }
}

impl StorageReader for MmapReader {
    fn size(&self) -> u64 {
        self.mmap.len() as u64
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        self.position = self.mmap.len() as u64;
        Ok(self.mmap.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 4096,
            use_mmap: true,
            mmap_threshold: 1024, // Low threshold for testing
        };
        (LocalStorage::new(&config), temp_dir)
    }

    #[test]
    fn test_absolute_path_bypasses_base() {
        let (storage, _temp) = create_test_storage();
        let other = TempDir::new().unwrap();
        let file = other.path().join("abs.txt");
        std::fs::write(&file, b"abc").unwrap();

        let mut reader = storage.open_read(&file).unwrap();
        assert_eq!(reader.path(), file.as_path());
        assert_eq!(reader.read_all().unwrap(), b"abc");
    }

    #[test]
    fn test_read_small_file() {
        let (storage, temp) = create_test_storage();
        let data = b"hello world";
        std::fs::write(temp.path().join("small.txt"), data).unwrap();

        let mut reader = storage.open_read(Path::new("small.txt")).unwrap();
        assert_eq!(reader.size(), data.len() as u64);
        assert_eq!(reader.path(), temp.path().join("small.txt"));

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_read_large_file_mmap() {
        let (storage, temp) = create_test_storage();
        let data: Vec<u8> = (0..2048).map(|i| (i % 256) as u8).collect();
        std::fs::write(temp.path().join("large.bin"), &data).unwrap();

        let mut reader = storage.open_read(Path::new("large.bin")).unwrap();
        assert_eq!(reader.size(), 2048);
        assert_eq!(reader.path(), temp.path().join("large.bin"));

        reader.seek(SeekFrom::Start(1000)).unwrap();
        let mut chunk = [0u8; 4];
        reader.read_exact(&mut chunk).unwrap();
        assert_eq!(chunk, [232, 233, 234, 235]);

        assert_eq!(reader.read_all().unwrap(), data);
    }

    #[test]
    fn test_read_empty_file() {
        let (storage, temp) = create_test_storage();
        std::fs::write(temp.path().join("empty.bin"), b"").unwrap();

        let mut reader = storage.open_read(Path::new("empty.bin")).unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_open_missing_file() {
        let (storage, _temp) = create_test_storage();
        let err = storage.open_read(Path::new("missing.npy")).err().unwrap();
        assert!(matches!(err, DataError::Storage { .. }));
    }

    #[test]
    fn test_open_directory_fails() {
        let (storage, temp) = create_test_storage();
        std::fs::create_dir(temp.path().join("subdir")).unwrap();
        assert!(storage.open_read(Path::new("subdir")).is_err());
    }

    #[test]
    fn test_list_sorted() {
        let (storage, temp) = create_test_storage();
        for name in ["b_train.npy", "a_train.npy", "a_test.npy"] {
            std::fs::write(temp.path().join(name), b"").unwrap();
        }

        let entries = storage.list(Path::new("")).unwrap();
        assert_eq!(entries, vec!["a_test.npy", "a_train.npy", "b_train.npy"]);
    }

    #[test]
    fn test_list_missing_directory() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.list(Path::new("nope")).is_err());
    }
}
