//! Block storage seen by the muxers and the playback engine.
//!
//! Paths are storage-absolute strings such as `/20240315/clip.avi`, the
//! same form that appears in clip names. [`FsStorage`] maps them under a
//! root directory on the host filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use sysinfo::Disks;

use crate::errors::DvrError;

/// An open file on storage
pub trait StorageFile: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> StorageFile for T {}

pub trait Storage: Send + Sync {
    /// Create or truncate a file for writing
    fn create(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError>;
    /// Open an existing file for reading
    fn open(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError>;
    fn rename(&self, from: &str, to: &str) -> Result<(), DvrError>;
    fn remove(&self, path: &str) -> Result<(), DvrError>;
    /// Create a directory if it does not exist yet
    fn mkdir(&self, path: &str) -> Result<(), DvrError>;
    fn exists(&self, path: &str) -> bool;
    /// Entry names directly inside `dir`, sorted
    fn list(&self, dir: &str) -> Result<Vec<String>, DvrError>;
    /// Free bytes, or `None` when the device cannot report it
    fn free_bytes(&self) -> Option<u64>;
}

/// Storage rooted at a host directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Mount `root`, creating it if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, DvrError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            DvrError::InitializationError(format!(
                "storage root {} unavailable: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a storage path
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Storage for FsStorage {
    fn create(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.resolve(path))
            .map_err(|e| DvrError::StorageError(format!("create {}: {}", path, e)))?;
        Ok(Box::new(file))
    }

    fn open(&self, path: &str) -> Result<Box<dyn StorageFile>, DvrError> {
        let file = File::open(self.resolve(path))
            .map_err(|e| DvrError::StorageError(format!("open {}: {}", path, e)))?;
        Ok(Box::new(file))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), DvrError> {
        fs::rename(self.resolve(from), self.resolve(to))
            .map_err(|e| DvrError::StorageError(format!("rename {} -> {}: {}", from, to, e)))
    }

    fn remove(&self, path: &str) -> Result<(), DvrError> {
        fs::remove_file(self.resolve(path))
            .map_err(|e| DvrError::StorageError(format!("remove {}: {}", path, e)))
    }

    fn mkdir(&self, path: &str) -> Result<(), DvrError> {
        fs::create_dir_all(self.resolve(path))
            .map_err(|e| DvrError::StorageError(format!("mkdir {}: {}", path, e)))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, DvrError> {
        let entries = fs::read_dir(self.resolve(dir))
            .map_err(|e| DvrError::StorageError(format!("list {}: {}", dir, e)))?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        Ok(names)
    }

    fn free_bytes(&self) -> Option<u64> {
        let root = fs::canonicalize(&self.root).ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| root.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::SeekFrom;

    #[test]
    fn test_create_write_rename_list() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        storage.mkdir("/20240315").unwrap();

        let mut f = storage.create("/current.avi").unwrap();
        f.write_all(b"hello world").unwrap();
        f.seek(SeekFrom::Start(0)).unwrap();
        f.write_all(b"HELLO").unwrap();
        drop(f);

        storage
            .rename("/current.avi", "/20240315/clip.avi")
            .unwrap();
        assert!(!storage.exists("/current.avi"));
        assert_eq!(storage.list("/20240315").unwrap(), vec!["clip.avi"]);

        let mut data = String::new();
        storage
            .open("/20240315/clip.avi")
            .unwrap()
            .read_to_string(&mut data)
            .unwrap();
        assert_eq!(data, "HELLO world");
    }

    #[test]
    fn test_missing_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorage::new(dir.path()).unwrap();
        assert!(matches!(
            storage.open("/nope.avi"),
            Err(DvrError::StorageError(_))
        ));
        assert!(storage.remove("/nope.avi").is_err());
    }
}
