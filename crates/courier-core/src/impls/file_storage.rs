//! FileStorage - key ごとに JSON ファイルを 1 つ置く
//!
//! Writes go to `<key>.json.tmp` first and are renamed into place, so a crash
//! mid-write leaves the previous snapshot intact.

use std::path::{Path, PathBuf};

use crate::domain::StorageError;
use crate::ports::QueueStorage;

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Anything outside `[A-Za-z0-9_.-]` becomes `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl QueueStorage for FileStorage {
    fn save(&self, key: &str, snapshot: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, snapshot)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => Ok(None),
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));

        storage.save("event_queue", "{\"version\":1}").unwrap();

        assert_eq!(
            storage.load("event_queue").unwrap().as_deref(),
            Some("{\"version\":1}")
        );
        assert!(!storage.path_for("event_queue").with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert_eq!(storage.load("nothing").unwrap(), None);
    }

    #[test]
    fn keys_are_sanitized_and_distinct() {
        let storage = FileStorage::new("/tmp/q");
        assert_eq!(
            storage.path_for("tenant/a:queue"),
            PathBuf::from("/tmp/q/tenant_a_queue.json")
        );
        assert_ne!(storage.path_for("a"), storage.path_for("b"));
    }

    #[test]
    fn overwrite_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.save("k", "one").unwrap();
        storage.save("k", "two").unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some("two"));
    }
}
