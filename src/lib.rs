//! Parcel Store is a local, encrypted, schema-light persistence engine.
//!
//! Values are stored under string keys in any backend that implements [`Storage`].
//! Every value is converted to text, encrypted and wrapped in a small envelope that
//! carries enough type metadata to rebuild it. Composite values that opt into
//! [`Partitioned`] storage are split across many physical entries
//! (`K.partitions`, `K.type`, `K.i`, `K.i.rows`, `K.i.j`, `K.i.j.type`) and
//! reassembled transparently on read.
//!
//! ## Core Components
//! - [`partition`]: The public entry point, [`ParcelStore`], and the partitioning algorithm.
//! - [`engine`]: The single-entry pipeline (converter, encryption, envelope, facade) and
//!   the bundled storage backends.
//! - [`registry`] and [`types`]: The closed type registry that replaces runtime class lookup.
//! - [`config`]: Settings and the store builder.

pub mod config;
pub mod engine;
pub mod partition;
pub mod registry;
pub mod types;
pub mod value;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use config::{open, open_with, ParcelStoreBuilder, Settings};
pub use engine::Limits;
pub use partition::{ParcelStore, Partitioned};
pub use registry::{Record, TypeRegistry};
pub use types::TypeDesc;
pub use value::{FromValue, ToValue, Typed, Value};

/// Errors returned by Parcel Store.
#[derive(Error, Debug)]
pub enum Error {
    /// The key is empty or otherwise unusable.
    #[error("invalid key: {0}")]
    InvalidKey(String),
    /// A value could not be converted to or from its text form.
    #[error("conversion error: {0}")]
    Conversion(String),
    /// Encrypting or decrypting a payload failed.
    #[error("encryption error: {0}")]
    Encryption(String),
    /// Error during JSON serialization or deserialization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The storage backend reported a failure.
    #[error("storage error: {0}")]
    Storage(String),
    /// A type identifier could not be resolved through the registry.
    #[error("unknown type: {0}")]
    UnknownType(String),
    /// Partition metadata is missing or inconsistent.
    #[error("partition error: {0}")]
    Partition(String),
    /// A worker did not finish within its time bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// A collection or payload is over the configured ceiling.
    #[error("size limit exceeded: {0}")]
    SizeLimit(String),
    /// An I/O error occurred while persisting.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Parcel Store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The key-value backend that physical entries are written to.
///
/// Implementations only ever see opaque envelope text; they never need to
/// understand the values stored in them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores `value` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, value: String) -> Result<()>;
    /// Returns the entry stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;
    /// Removes `key`. Returns `false` when nothing was stored under it.
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Removes every entry.
    async fn delete_all(&self) -> Result<()>;
    /// Reports whether an entry exists under `key`.
    async fn contains(&self, key: &str) -> Result<bool>;
    /// Number of physical entries.
    async fn count(&self) -> Result<u64>;

    /// Stores several entries at once. Backends that persist on every write
    /// override this to persist once per batch.
    async fn put_many(&self, entries: Vec<(String, String)>) -> Result<()> {
        for (key, value) in entries {
            self.put(&key, value).await?;
        }
        Ok(())
    }

    /// Removes several keys at once and returns how many were present.
    async fn delete_many(&self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Symmetric encryption applied to every converted payload.
///
/// The entry key is passed to both directions so implementations can bind a
/// ciphertext to the key it was written under.
pub trait Encryption: Send + Sync {
    /// Prepares the implementation. Returning `false` makes the builder fall back to
    /// [`engine::NoEncryption`].
    fn init(&self) -> bool;
    /// Encrypts `plaintext` stored under `key`.
    fn encrypt(&self, key: &str, plaintext: &str) -> Result<Vec<u8>>;
    /// Reverses [`Encryption::encrypt`].
    fn decrypt(&self, key: &str, ciphertext: &[u8]) -> Result<String>;
}

/// Text format used for converted payloads.
pub trait Parser: Send + Sync {
    /// Renders a JSON tree as text.
    fn to_text(&self, value: &serde_json::Value) -> Result<String>;
    /// Parses text back into a JSON tree.
    fn from_text(&self, text: &str) -> Result<serde_json::Value>;
}
