//! File-backed KvStore
//!
//! All keys live in one JSON object (`{ "projects": [...], "tasks": {...} }`).
//! Writes take an exclusive lock on a sibling `.lock` file, rewrite the whole
//! document to a temp file and rename it into place, so a crash mid-write
//! leaves the previous document intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{KvError, KvStore};

/// JSON document store on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (or lazily create) the store document at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let path = path.as_ref().to_path_buf();
        debug!(path = %path.display(), "FileStore::open: called");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        info!(path = %path.display(), "Opened file store");
        Ok(Self { path })
    }

    /// Path of the backing JSON document
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_document(path: &Path) -> Result<Map<String, Value>, KvError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "read_document: no document yet");
                return Ok(Map::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(KvError::Corrupt(format!(
                "expected a JSON object at the top level, found {}",
                json_kind(&other)
            ))),
        }
    }

    fn lock(&self) -> Result<File, KvError> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;
        FileExt::lock_exclusive(&lock)?;
        Ok(lock)
    }

    fn get_blocking(&self, key: &str) -> Result<Option<Value>, KvError> {
        let lock = self.lock()?;
        let mut document = Self::read_document(&self.path)?;
        FileExt::unlock(&lock)?;
        Ok(document.remove(key))
    }

    fn set_blocking(&self, key: &str, value: Value) -> Result<(), KvError> {
        let lock = self.lock()?;
        let mut document = Self::read_document(&self.path)?;
        document.insert(key.to_string(), value);

        let tmp = self.tmp_path();
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, &document)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        FileExt::unlock(&lock)?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        debug!(%key, "FileStore::get: called");
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.get_blocking(&key))
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))?
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), KvError> {
        debug!(%key, "FileStore::set: called");
        let store = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || store.set_blocking(&key, value))
            .await
            .map_err(|e| KvError::Unavailable(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_get_before_any_write() {
        let temp = tempdir().unwrap();
        let store = FileStore::open(temp.path().join("store.json")).unwrap();
        assert_eq!(store.get("projects").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("projects", json!([{"id": "p1", "name": "Site"}])).await.unwrap();
        store.set("github-token", json!("ghp_example")).await.unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("projects").await.unwrap(),
            Some(json!([{"id": "p1", "name": "Site"}]))
        );
        assert_eq!(reopened.get("github-token").await.unwrap(), Some(json!("ghp_example")));
    }

    #[tokio::test]
    async fn test_set_keeps_other_keys() {
        let temp = tempdir().unwrap();
        let store = FileStore::open(temp.path().join("store.json")).unwrap();

        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();
        store.set("a", json!(3)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!(3)));
        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_non_object_document_is_corrupt() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileStore::open(&path).unwrap();
        let result = store.get("projects").await;
        assert!(matches!(result, Err(KvError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_empty_document_reads_as_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("store.json");
        fs::write(&path, "").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("tasks").await.unwrap(), None);
    }
}
