use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{debug, error, info, warn};

use crate::engine::Facade;
use crate::partition::{keys, layout, AsAny, Partitioned};
use crate::types::TypeDesc;
use crate::value::{FromValue, ToValue, Value};
use crate::{Error, Result};

type Sealed = Vec<(String, String)>;

enum Loaded {
    Plain(Value),
    Aggregate(Box<dyn Partitioned>),
}

/// The public entry point: a [`Facade`] that splits [`Partitioned`] values across
/// many entries and reassembles them on read.
///
/// Writes are staged. Every entry of a put is sealed (converted, encrypted and
/// wrapped) before the first one is committed, so a conversion, encryption,
/// size or timeout failure leaves storage untouched. A storage failure during
/// commit can still leave part of a layout behind.
pub struct ParcelStore {
    facade: Arc<Facade>,
    partition_timeout: Duration,
}

impl ParcelStore {
    pub fn new(facade: Arc<Facade>, partition_timeout: Duration) -> Self {
        Self {
            facade,
            partition_timeout,
        }
    }

    pub fn facade(&self) -> &Facade {
        &self.facade
    }

    pub async fn put<V: ToValue + ?Sized>(&self, key: &str, value: &V) -> bool {
        match self.try_put(key, value).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to put '{}': {}", key, e);
                false
            }
        }
    }

    pub async fn try_put<V: ToValue + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }
        match value.partitioned() {
            Some(aggregate) if aggregate.is_partitioning_enabled() => self.put_partitioned(key, aggregate).await,
            _ => {
                let sealed = self.facade.seal(key, value.to_value()?).await?;
                if self.partition_count(key).await > 0 {
                    self.remove(key).await?;
                }
                self.facade.commit(key, sealed).await
            }
        }
    }

    async fn put_partitioned(&self, key: &str, aggregate: &dyn Partitioned) -> Result<()> {
        let type_name = self.facade.converter().registry().aggregate_name(aggregate)?;
        let count = aggregate.partition_count();
        if count == 0 {
            return Err(Error::Partition(format!("{} declares no partitions", type_name)));
        }

        let limits = *self.facade.converter().limits();
        let mut staged = Vec::with_capacity(count);
        for index in 0..count {
            match aggregate.partition_data(index)? {
                Some(data) => {
                    limits.check(&data)?;
                    staged.push(layout::encode(key, index, data)?);
                }
                None => debug!("Skipping empty partition {} of '{}'", index, key),
            }
        }

        let mut sealed = vec![
            (
                keys::partitions(key),
                self.facade.seal(&keys::partitions(key), Value::Long(count as i64)).await?,
            ),
            (
                keys::type_tag(key),
                self.facade
                    .seal(&keys::type_tag(key), Value::Text(type_name.to_string()))
                    .await?,
            ),
        ];
        if aggregate.is_partitioning_parallelized() {
            sealed.extend(self.seal_parallel(staged).await?);
        } else {
            for entries in staged {
                sealed.extend(seal_all(&self.facade, entries).await?);
            }
        }

        self.remove(key).await?;
        let total = sealed.len();
        self.facade.commit_all(sealed).await?;
        debug!("Stored '{}' as {} partitions in {} entries", key, count, total);
        Ok(())
    }

    /// Seals each partition on its own task. Past the partition timeout every task
    /// is aborted and nothing is committed.
    async fn seal_parallel(&self, staged: Vec<Vec<(String, Value)>>) -> Result<Sealed> {
        let handles: Vec<_> = staged
            .into_iter()
            .map(|entries| {
                let facade = self.facade.clone();
                tokio::spawn(async move { seal_all(&facade, entries).await })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let results = match tokio::time::timeout(self.partition_timeout, join_all(handles)).await {
            Ok(results) => results,
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                return Err(Error::Timeout(self.partition_timeout));
            }
        };

        let mut sealed = Vec::new();
        for result in results {
            sealed.extend(result.map_err(|e| Error::Internal(format!("partition task failed: {}", e)))??);
        }
        Ok(sealed)
    }

    /// Reads `key` as `T`, reassembling it first if it was stored partitioned.
    pub async fn try_get<T: FromValue + 'static>(&self, key: &str) -> Result<Option<T>> {
        match self.load(key).await? {
            None => Ok(None),
            Some(Loaded::Plain(value)) => Ok(Some(T::from_value(value)?)),
            Some(Loaded::Aggregate(aggregate)) => {
                if AsAny::as_any(&*aggregate).is::<T>() {
                    let any = <dyn Partitioned as AsAny>::into_any(aggregate);
                    return any
                        .downcast::<T>()
                        .map(|typed| Some(*typed))
                        .map_err(|_| Error::Internal("aggregate downcast failed".to_string()));
                }
                let value = ToValue::to_value(&*aggregate)?;
                Ok(Some(T::from_value(value)?))
            }
        }
    }

    pub async fn get<T: FromValue + 'static>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to get '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn get_or<T: FromValue + 'static>(&self, key: &str, default: T) -> T {
        self.get(key).await.unwrap_or(default)
    }

    async fn load(&self, key: &str) -> Result<Option<Loaded>> {
        let count = self.partition_count(key).await;
        if count == 0 {
            return Ok(self.facade.try_get(key, None).await?.map(Loaded::Plain));
        }

        let type_key = keys::type_tag(key);
        let type_name = match self.facade.try_get(&type_key, Some(&TypeDesc::Text)).await? {
            Some(Value::Text(name)) => name,
            _ => return Err(Error::Partition(format!("missing aggregate type at {}", type_key))),
        };
        let mut aggregate = self.facade.converter().registry().instantiate(&type_name)?;

        for index in 0..count {
            if let Err(e) = self.load_partition(key, index, &type_name, &mut *aggregate).await {
                aggregate.fail_partition_data(index, &e);
                return Err(e);
            }
        }
        debug!("Rebuilt '{}' ({}) from {} partitions", key, type_name, count);
        Ok(Some(Loaded::Aggregate(aggregate)))
    }

    async fn load_partition(
        &self,
        key: &str,
        index: usize,
        type_name: &str,
        aggregate: &mut dyn Partitioned,
    ) -> Result<()> {
        let declared = aggregate
            .partition_type(index)
            .ok_or_else(|| Error::Partition(format!("{} has no partition {}", type_name, index)))?;

        let data = match self.facade.try_get(&keys::rows(key, index), Some(&TypeDesc::Long)).await? {
            Some(Value::Long(rows)) => Some(layout::decode(&self.facade, key, index, rows, &declared).await?),
            Some(other) => {
                return Err(Error::Partition(format!("bad row count {:?} for partition {}", other, index)));
            }
            None => self.facade.try_get(&keys::partition(key, index), Some(&declared)).await?,
        };

        match data {
            Some(data) => aggregate.set_partition_data(index, data),
            None => Ok(()),
        }
    }

    /// Number of partitions stored under `key`; `0` when it is not partitioned
    /// or the count cannot be read.
    async fn partition_count(&self, key: &str) -> usize {
        match self.facade.try_get(&keys::partitions(key), Some(&TypeDesc::Long)).await {
            Ok(Some(Value::Long(n))) => usize::try_from(n).unwrap_or(0),
            Ok(_) => 0,
            Err(e) => {
                warn!("Unreadable partition count for '{}': {}", key, e);
                0
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.remove(key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Failed to delete '{}': {}", key, e);
                false
            }
        }
    }

    /// Removes the plain entry and any partition layout under `key` in one
    /// storage batch. A row count that cannot be read does not stop the batch;
    /// the first error is returned.
    async fn remove(&self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }
        let count = self.partition_count(key).await;
        if count == 0 {
            return self.facade.try_delete(key).await;
        }

        let mut first_error = None;
        let mut doomed = Vec::new();
        for index in 0..count {
            let rows_key = keys::rows(key, index);
            match self.facade.try_get(&rows_key, Some(&TypeDesc::Long)).await {
                Ok(Some(Value::Long(rows))) => {
                    for j in 0..usize::try_from(rows).unwrap_or(0) {
                        doomed.push(keys::row(key, index, j));
                        doomed.push(keys::row_type(key, index, j));
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
            doomed.push(rows_key);
            doomed.push(keys::partition(key, index));
        }
        doomed.push(keys::type_tag(key));
        doomed.push(keys::partitions(key));
        doomed.push(key.to_string());

        match self.facade.try_delete_many(&doomed).await {
            Ok(removed) => debug!("Removed {} entries of '{}' ({} partitions)", removed, key, count),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(true),
        }
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.partition_count(key).await > 0 || self.facade.contains(key).await
    }

    /// Number of physical entries, or `-1` when the backend fails.
    pub async fn count(&self) -> i64 {
        self.facade.count().await
    }

    pub async fn delete_all(&self) -> bool {
        let ok = self.facade.delete_all().await;
        if ok {
            info!("Deleted all entries");
        }
        ok
    }
}

async fn seal_all(facade: &Facade, entries: Vec<(String, Value)>) -> Result<Sealed> {
    let mut sealed = Vec::with_capacity(entries.len());
    for (physical_key, value) in entries {
        let envelope = facade.seal(&physical_key, value).await?;
        sealed.push((physical_key, envelope));
    }
    Ok(sealed)
}
