use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

const BACKUP_DIR: &str = "backups";
const BACKUP_LIMIT: usize = 5;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidKey(String),
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io(err) => write!(f, "io error: {err}"),
            StorageError::Json(err) => write!(f, "json error: {err}"),
            StorageError::InvalidKey(key) => write!(f, "invalid storage key: {key:?}"),
            StorageError::Unavailable(reason) => write!(f, "storage unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(value: std::io::Error) -> Self {
        StorageError::Io(value)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        StorageError::Json(value)
    }
}

/// Asynchronous record store keyed by name. `set` overwrites the whole record.
#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;
}

impl<T: KeyValueStore> KeyValueStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }
}

/// In-process store. Failure switches let tests exercise the error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, value: Value) -> Self {
        let store = Self::default();
        store
            .entries
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.entries.lock().expect("store poisoned").get(key).cloned()
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("reads disabled".to_string()));
        }
        Ok(self.raw(key))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled".to_string()));
        }
        self.entries
            .lock()
            .expect("store poisoned")
            .insert(key.to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One pretty-printed JSON file per key under `root`, with rolling backups.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.join(BACKUP_DIR)).await?;
        Ok(())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }

    async fn write_atomic(&self, path: &Path, value: &Value) -> Result<(), StorageError> {
        let temp_path = path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&temp_path, &json).await?;
        tokio::fs::File::open(&temp_path).await?.sync_all().await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    async fn create_backup(&self, key: &str, path: &Path) -> Result<(), StorageError> {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f").to_string();
        let backup_path = self
            .root
            .join(BACKUP_DIR)
            .join(format!("{key}-{timestamp}.json"));
        tokio::fs::copy(path, backup_path).await?;
        self.trim_backups(key).await
    }

    /// Backup file names for `key`, oldest first.
    pub async fn list_backups(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let prefix = format!("{key}-");
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(self.root.join(BACKUP_DIR)).await?;
        while let Some(entry) = dir.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(&prefix) && name.ends_with(".json") {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn trim_backups(&self, key: &str) -> Result<(), StorageError> {
        let names = self.list_backups(key).await?;
        let to_remove = names.len().saturating_sub(BACKUP_LIMIT);
        for name in names.into_iter().take(to_remove) {
            let _ = tokio::fs::remove_file(self.root.join(BACKUP_DIR).join(name)).await;
        }
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        self.ensure_dirs().await?;
        if tokio::fs::try_exists(&path).await? {
            self.create_backup(key, &path).await?;
        }
        self.write_atomic(&path, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_round_trips_and_counts_writes() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn memory_store_failure_switches() {
        let store = MemoryStore::with_entry("k", json!(1));
        store.set_fail_reads(true);
        assert!(matches!(
            store.get("k").await,
            Err(StorageError::Unavailable(_))
        ));
        store.set_fail_reads(false);

        store.set_fail_writes(true);
        assert!(store.set("k", &json!(2)).await.is_err());
        assert_eq!(store.raw("k"), Some(json!(1)));
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn file_store_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        assert!(store.get("ont_v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_writes_json_file_and_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        store.set("ont_v1", &json!({"version": 1})).await.unwrap();
        assert!(dir.path().join("ont_v1.json").is_file());
        assert!(!dir.path().join("ont_v1.tmp").exists());
        assert_eq!(
            store.get("ont_v1").await.unwrap(),
            Some(json!({"version": 1}))
        );
    }

    #[tokio::test]
    async fn file_store_corrupt_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ont_v1.json"), b"{not json").unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.get("ont_v1").await,
            Err(StorageError::Json(_))
        ));
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        assert!(matches!(
            store.set("../escape", &json!(1)).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn file_store_keeps_bounded_backups_on_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf());
        for n in 0..(BACKUP_LIMIT + 3) {
            store.set("ont_v1", &json!({ "n": n })).await.unwrap();
            // Backup names carry a millisecond stamp.
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        let backups = store.list_backups("ont_v1").await.unwrap();
        assert_eq!(backups.len(), BACKUP_LIMIT);
        assert_eq!(
            store.get("ont_v1").await.unwrap(),
            Some(json!({ "n": BACKUP_LIMIT + 2 }))
        );
    }
}
