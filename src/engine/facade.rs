use std::sync::Arc;

use log::{debug, error, warn};

use crate::engine::{Converter, Executor, Serializer};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Encryption, Error, Result, Storage};

/// Single-entry pipeline: convert, encrypt and wrap on the way in, the reverse
/// on the way out.
///
/// The `try_*` methods report errors; the plain methods log them and return
/// `false`/`None`.
pub struct Facade {
    storage: Arc<dyn Storage>,
    encryption: Arc<dyn Encryption>,
    converter: Arc<Converter>,
    serializer: Arc<Serializer>,
    executor: Executor,
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

impl Facade {
    pub fn new(
        storage: Arc<dyn Storage>,
        encryption: Arc<dyn Encryption>,
        converter: Arc<Converter>,
        serializer: Arc<Serializer>,
        executor: Executor,
    ) -> Self {
        Self {
            storage,
            encryption,
            converter,
            serializer,
            executor,
        }
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    /// Produces the envelope text for `value` without touching storage.
    pub async fn seal(&self, key: &str, value: Value) -> Result<String> {
        validate_key(key)?;
        let key = key.to_string();
        let encryption = self.encryption.clone();
        let converter = self.converter.clone();
        let serializer = self.serializer.clone();
        self.executor
            .execute(move || {
                let text = converter.to_text(&value)?;
                let cipher = encryption.encrypt(&key, &text)?;
                serializer.wrap(cipher, &value)
            })
            .await
    }

    /// Writes a sealed envelope.
    pub async fn commit(&self, key: &str, sealed: String) -> Result<()> {
        validate_key(key)?;
        self.storage.put(key, sealed).await
    }

    /// Writes several sealed envelopes as one storage batch.
    pub async fn commit_all(&self, sealed: Vec<(String, String)>) -> Result<()> {
        for (key, _) in &sealed {
            validate_key(key)?;
        }
        self.storage.put_many(sealed).await
    }

    pub async fn try_put(&self, key: &str, value: Value) -> Result<()> {
        let sealed = self.seal(key, value).await?;
        self.commit(key, sealed).await
    }

    pub async fn put(&self, key: &str, value: Value) -> bool {
        match self.try_put(key, value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to put '{}': {}", key, e);
                false
            }
        }
    }

    /// Reads `key`, decoding as `hint` when given and as the envelope's own type
    /// otherwise.
    pub async fn try_get(&self, key: &str, hint: Option<&TypeDesc>) -> Result<Option<Value>> {
        validate_key(key)?;
        let Some(text) = self.storage.get(key).await? else {
            return Ok(None);
        };

        let key = key.to_string();
        let hint = hint.cloned();
        let encryption = self.encryption.clone();
        let converter = self.converter.clone();
        let serializer = self.serializer.clone();
        let value = self
            .executor
            .execute(move || {
                let info = serializer.unwrap(&text)?;
                debug!("Read '{}': {}", key, info);
                let target = match hint {
                    Some(desc) => desc,
                    None => info.target_type()?,
                };
                let plain = encryption.decrypt(&key, &info.cipher_text)?;
                converter.from_text(&plain, &target)
            })
            .await?;
        Ok(Some(value))
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_as(key, None).await
    }

    pub async fn get_as(&self, key: &str, hint: Option<&TypeDesc>) -> Option<Value> {
        match self.try_get(key, hint).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to get '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn try_delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.storage.delete(key).await
    }

    /// Removes several keys as one storage batch; returns how many existed.
    pub async fn try_delete_many(&self, keys: &[String]) -> Result<u64> {
        for key in keys {
            validate_key(key)?;
        }
        self.storage.delete_many(keys).await
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.try_delete(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to delete '{}': {}", key, e);
                false
            }
        }
    }

    pub async fn try_contains(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        self.storage.contains(key).await
    }

    pub async fn contains(&self, key: &str) -> bool {
        match self.try_contains(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!("Failed to look up '{}': {}", key, e);
                false
            }
        }
    }

    /// Number of physical entries, or `-1` when the backend fails.
    pub async fn count(&self) -> i64 {
        match self.storage.count().await {
            Ok(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Err(e) => {
                warn!("Failed to count entries: {}", e);
                -1
            }
        }
    }

    pub async fn delete_all(&self) -> bool {
        match self.storage.delete_all().await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete all entries: {}", e);
                false
            }
        }
    }
}
