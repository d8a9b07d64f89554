use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::atomic_io::write_text_atomic;

const SAVE_EXTENSION: &str = "json";

/// Key/value blob storage behind the save manager.
pub trait SaveStore {
    fn read(&self, key: &str) -> io::Result<Option<String>>;

    fn write(&mut self, key: &str, value: &str) -> io::Result<()>;

    /// Returns whether something was removed.
    fn remove(&mut self, key: &str) -> io::Result<bool>;

    fn contains(&self, key: &str) -> io::Result<bool> {
        Ok(self.read(key)?.is_some())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySaveStore {
    entries: BTreeMap<String, String>,
}

impl MemorySaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SaveStore for MemorySaveStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn contains(&self, key: &str) -> io::Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}

/// One `<key>.json` file per key under `dir`.
#[derive(Debug, Clone)]
pub struct FileSaveStore {
    dir: PathBuf,
}

impl FileSaveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{SAVE_EXTENSION}"))
    }
}

impl SaveStore for FileSaveStore {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> io::Result<()> {
        let path = self.path_for(key);
        write_text_atomic(&path, value)?;
        debug!(path = %path.display(), bytes = value.len(), "save_file_written");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> io::Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn contains(&self, key: &str) -> io::Result<bool> {
        Ok(self.path_for(key).is_file())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn exercise(store: &mut dyn SaveStore) {
        assert_eq!(store.read("save_3").expect("read"), None);
        assert!(!store.contains("save_3").expect("contains"));

        store.write("save_3", "{\"version\":1}").expect("write");
        store.write("save_3", "{\"version\":2}").expect("overwrite");

        assert_eq!(
            store.read("save_3").expect("read").as_deref(),
            Some("{\"version\":2}")
        );
        assert!(store.contains("save_3").expect("contains"));
        assert!(store.remove("save_3").expect("remove"));
        assert!(!store.remove("save_3").expect("second remove"));
    }

    #[test]
    fn memory_store_round_trips_keys() {
        let mut store = MemorySaveStore::new();
        exercise(&mut store);
        assert!(store.is_empty());
    }

    #[test]
    fn file_store_round_trips_keys() {
        let temp = TempDir::new().expect("tempdir");
        let mut store = FileSaveStore::new(temp.path().join("saves"));
        exercise(&mut store);
        assert!(store.dir().is_dir());
    }
}
