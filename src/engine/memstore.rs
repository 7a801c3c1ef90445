use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Result, Storage};

/// Volatile [`Storage`] backed by a `HashMap`.
///
/// This is the default backend of [`ParcelStoreBuilder`](crate::ParcelStoreBuilder).
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing set of entries.
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(entries),
        }
    }

    /// Copy of every entry, in no particular order.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, value: String) -> Result<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn delete_all(&self) -> Result<()> {
        self.data.write().await.clear();
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.data.read().await.contains_key(key))
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.data.read().await.len() as u64)
    }
}
