use std::env;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::engine::{
    AesGcmEncryption, Converter, Executor, Facade, FileStorage, JsonParser, Limits, MemoryStorage, NoEncryption,
    Serializer,
};
use crate::partition::{ParcelStore, Partitioned};
use crate::registry::{Record, TypeRegistry};
use crate::{Encryption, Parser, Result, Storage};

/// Tunables of one store instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Identifies the store; bound into every ciphertext as the encryption salt.
    pub storage_tag: String,
    pub limits: Limits,
    /// Number of pipeline jobs that may run at once.
    pub workers: usize,
    /// Time bound of one pipeline job.
    pub operation_timeout: Duration,
    /// Time bound of a parallel partition fan-out.
    pub partition_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_tag: "parcel".to_string(),
            limits: Limits::default(),
            workers: 4,
            operation_timeout: Duration::from_secs(60),
            partition_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Defaults overridden by `PARCEL_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(tag) = env::var("PARCEL_STORAGE_TAG") {
            if !tag.is_empty() {
                settings.storage_tag = tag;
            }
        }
        override_with("PARCEL_WORKERS", &mut settings.workers);
        override_with("PARCEL_MAX_COLLECTION_SIZE", &mut settings.limits.max_collection_size);
        override_with("PARCEL_MAX_MAP_SIZE", &mut settings.limits.max_map_size);
        override_with("PARCEL_MAX_TEXT_BYTES", &mut settings.limits.max_text_bytes);

        let mut secs = settings.operation_timeout.as_secs();
        override_with("PARCEL_OPERATION_TIMEOUT_SECS", &mut secs);
        settings.operation_timeout = Duration::from_secs(secs);
        let mut secs = settings.partition_timeout.as_secs();
        override_with("PARCEL_PARTITION_TIMEOUT_SECS", &mut secs);
        settings.partition_timeout = Duration::from_secs(secs);
        settings
    }
}

fn override_with<T: FromStr>(name: &str, target: &mut T) {
    let Ok(raw) = env::var(name) else { return };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => warn!("Ignoring {}={:?}: not a valid value", name, raw),
    }
}

/// Assembles a [`ParcelStore`] from injected capabilities.
///
/// Anything left unset gets a default: [`MemoryStorage`], [`NoEncryption`],
/// [`JsonParser`] and [`Settings::default`].
#[derive(Default)]
pub struct ParcelStoreBuilder {
    storage: Option<Arc<dyn Storage>>,
    encryption: Option<Arc<dyn Encryption>>,
    parser: Option<Arc<dyn Parser>>,
    master_key: Option<Vec<u8>>,
    registry: TypeRegistry,
    settings: Settings,
}

impl ParcelStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn encryption(mut self, encryption: Arc<dyn Encryption>) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Uses [`AesGcmEncryption`] with `key`, salted with the storage tag.
    pub fn master_key(mut self, key: &[u8]) -> Self {
        self.master_key = Some(key.to_vec());
        self
    }

    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn register_record<T: Record>(mut self) -> Self {
        self.registry.register_record::<T>();
        self
    }

    pub fn register_partitioned<T: Partitioned + Record + Default>(mut self) -> Self {
        self.registry.register_partitioned::<T>();
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.settings.limits = limits;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.settings.workers = workers;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.operation_timeout = timeout;
        self
    }

    pub fn partition_timeout(mut self, timeout: Duration) -> Self {
        self.settings.partition_timeout = timeout;
        self
    }

    pub fn build(self) -> ParcelStore {
        let settings = self.settings;
        let registry = Arc::new(self.registry);

        let encryption: Arc<dyn Encryption> = match (self.encryption, self.master_key) {
            (Some(encryption), _) => encryption,
            (None, Some(key)) => Arc::new(AesGcmEncryption::new(&key, settings.storage_tag.clone())),
            (None, None) => Arc::new(NoEncryption),
        };
        let encryption = if encryption.init() {
            encryption
        } else {
            warn!("Encryption failed to initialize; storing '{}' without encryption", settings.storage_tag);
            Arc::new(NoEncryption)
        };

        let storage = self.storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let parser = self.parser.unwrap_or_else(|| Arc::new(JsonParser));
        debug!("Building store '{}' with {:?}", settings.storage_tag, registry);

        let facade = Facade::new(
            storage,
            encryption,
            Arc::new(Converter::new(parser, registry.clone(), settings.limits)),
            Arc::new(Serializer::new(registry)),
            Executor::new(settings.workers, settings.operation_timeout),
        );
        ParcelStore::new(Arc::new(facade), settings.partition_timeout)
    }
}

/// Opens a file-backed store in `data_dir` with settings from the environment.
///
/// With a master key, entries are encrypted with AES-256-GCM.
///
/// # Examples
///
/// ```no_run
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let store = parcel_store::open("./data", None)?;
///     store.put("greeting", "hello").await;
///     Ok(())
/// }
/// ```
pub fn open<P: AsRef<Path>>(data_dir: P, master_key: Option<&[u8]>) -> Result<ParcelStore> {
    open_with(data_dir, master_key, ParcelStoreBuilder::new())
}

/// Like [`open`], starting from a builder that already carries type registrations.
pub fn open_with<P: AsRef<Path>>(
    data_dir: P,
    master_key: Option<&[u8]>,
    builder: ParcelStoreBuilder,
) -> Result<ParcelStore> {
    let storage = Arc::new(FileStorage::open(data_dir)?);
    let mut builder = builder.settings(Settings::from_env()).storage(storage);
    if let Some(key) = master_key {
        builder = builder.master_key(key);
    }
    Ok(builder.build())
}
