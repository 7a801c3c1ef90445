use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::{Error, Result, Storage};

const STORE_FILE: &str = "parcel.json";

/// [`Storage`] that keeps every entry in memory and mirrors it to one JSON file.
///
/// Each mutation rewrites the file with an atomic "write-then-rename": the snapshot
/// goes to a temporary file in the same directory which is then renamed over the
/// store file, so a crash never leaves a half-written store behind. Batched
/// writes ([`Storage::put_many`], [`Storage::delete_many`]) rewrite it once.
pub struct FileStorage {
    file_path: PathBuf,
    data: Mutex<HashMap<String, String>>,
}

impl FileStorage {
    /// Opens the store in `dir`, creating the directory if needed.
    ///
    /// An unreadable or corrupt store file is logged and replaced by an empty store.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        let file_path = dir.join(STORE_FILE);
        let data = Self::load(&file_path);
        debug!("Opened {:?} with {} entries", file_path, data.len());
        Ok(Self {
            file_path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn load(path: &Path) -> HashMap<String, String> {
        if !path.exists() {
            return HashMap::new();
        }
        let content = match fs::read(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Could not read store file {:?}: {}", path, e);
                return HashMap::new();
            }
        };
        match serde_json::from_slice(&content) {
            Ok(d) => d,
            Err(e) => {
                warn!("Could not unmarshal store file {:?}: {}", path, e);
                HashMap::new()
            }
        }
    }

    async fn save(&self, data: &HashMap<String, String>) -> Result<()> {
        let bytes = serde_json::to_vec(data)?;
        let file_path = self.file_path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&file_path, &bytes))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("{:?} has no parent directory", path)))?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, value: String) -> Result<()> {
        let mut data = self.data.lock().await;
        let previous = data.insert(key.to_string(), value);
        if let Err(e) = self.save(&data).await {
            match previous {
                Some(p) => data.insert(key.to_string(), p),
                None => data.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, String)>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut data = self.data.lock().await;
        let mut previous = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let old = data.insert(key.clone(), value);
            previous.push((key, old));
        }
        if let Err(e) = self.save(&data).await {
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(p) => data.insert(key, p),
                    None => data.remove(&key),
                };
            }
            return Err(e);
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(previous) = data.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.save(&data).await {
            data.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(true)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut data = self.data.lock().await;
        let removed: Vec<_> = keys
            .iter()
            .filter_map(|key| data.remove(key).map(|value| (key.clone(), value)))
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.save(&data).await {
            data.extend(removed);
            return Err(e);
        }
        Ok(removed.len() as u64)
    }

    async fn delete_all(&self) -> Result<()> {
        let mut data = self.data.lock().await;
        self.save(&HashMap::new()).await?;
        data.clear();
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.data.lock().await.contains_key(key))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.data.lock().await.len() as u64)
    }
}
