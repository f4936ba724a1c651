//! Directory-backed durable cache tier

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use stockmark::{DurableStore, StockmarkError, StockmarkResult};

/// Stores each cache key as one JSON file in a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`; the directory is created on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the entries
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a key
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

fn storage_error(action: &str, path: &Path, err: &std::io::Error) -> StockmarkError {
    StockmarkError::storage(format!("{action} {}: {err}", path.display()))
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> StockmarkResult<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, &e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StockmarkResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| storage_error("create", &self.dir, &e))?;
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|e| storage_error("write", &path, &e))
    }

    fn remove(&self, key: &str) -> StockmarkResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, &e)),
        }
    }
}
