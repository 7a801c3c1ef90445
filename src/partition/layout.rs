use log::debug;
use serde::{Deserialize, Serialize};

use crate::engine::Facade;
use crate::partition::keys;
use crate::registry::{Record, TypeRegistry};
use crate::types::TypeDesc;
use crate::value::{FromValue, Value};
use crate::{Error, Result};

/// How a partition is laid out in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionShape {
    /// One entry at `K.i`.
    Scalar,
    /// Rows appended in order.
    Sequence,
    /// One [`PairDataInfo`] row per entry.
    Associative,
    /// Rows with duplicates dropped on read.
    SetLike,
}

impl PartitionShape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::List(_) => PartitionShape::Sequence,
            Value::Set(_) => PartitionShape::SetLike,
            Value::Map(_) => PartitionShape::Associative,
            _ => PartitionShape::Scalar,
        }
    }

    pub fn declared(desc: &TypeDesc) -> Self {
        match desc {
            TypeDesc::List(_) => PartitionShape::Sequence,
            TypeDesc::Set(_) => PartitionShape::SetLike,
            TypeDesc::Map(_) => PartitionShape::Associative,
            _ => PartitionShape::Scalar,
        }
    }
}

/// Row value of a map partition: one entry with both sides typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairDataInfo {
    pub first: serde_json::Value,
    pub second: serde_json::Value,
    pub first_type: String,
    pub second_type: String,
}

crate::impl_record!(PairDataInfo, "PairDataInfo");

impl PairDataInfo {
    pub fn new(first: &Value, second: &Value) -> Result<Self> {
        Ok(Self {
            first: first.to_json()?,
            second: second.to_json()?,
            first_type: first.uniform_type()?.to_string(),
            second_type: second.uniform_type()?.to_string(),
        })
    }

    /// Rebuilds the entry, resolving both sides through the registry.
    pub fn decode(self, registry: &TypeRegistry) -> Result<(Value, Value)> {
        let first_type = registry.resolve(&self.first_type)?;
        let second_type = registry.resolve(&self.second_type)?;
        Ok((
            registry.decode(&first_type, self.first)?,
            registry.decode(&second_type, self.second)?,
        ))
    }
}

/// Physical entries for partition `index` of `key`.
pub fn encode(key: &str, index: usize, data: Value) -> Result<Vec<(String, Value)>> {
    let rows = match data {
        Value::List(items) | Value::Set(items) => items,
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| Value::from_record(&PairDataInfo::new(k, v)?))
            .collect::<Result<_>>()?,
        scalar => return Ok(vec![(keys::partition(key, index), scalar)]),
    };

    let mut entries = Vec::with_capacity(rows.len() * 2 + 1);
    entries.push((keys::rows(key, index), Value::Long(rows.len() as i64)));
    for (j, row) in rows.into_iter().enumerate() {
        let tag = Value::Text(row.uniform_type()?.to_string());
        entries.push((keys::row(key, index, j), row));
        entries.push((keys::row_type(key, index, j), tag));
    }
    Ok(entries)
}

/// Reads the `rows` rows of partition `index` back into a collection of the
/// declared kind.
pub async fn decode(facade: &Facade, key: &str, index: usize, rows: i64, declared: &TypeDesc) -> Result<Value> {
    let shape = PartitionShape::declared(declared);
    if shape == PartitionShape::Scalar {
        return Err(Error::Partition(format!(
            "unsupported partition type '{}' for {}",
            declared,
            keys::rows(key, index)
        )));
    }
    let rows = usize::try_from(rows).map_err(|_| Error::Partition(format!("negative row count {}", rows)))?;
    let limits = facade.converter().limits();
    let ceiling = match shape {
        PartitionShape::Associative => limits.max_map_size,
        _ => limits.max_collection_size,
    };
    if rows > ceiling {
        return Err(Error::SizeLimit(format!("{} rows exceed {}", rows, ceiling)));
    }

    let registry = facade.converter().registry();
    let mut items = Vec::with_capacity(rows);
    let mut entries = Vec::new();
    for j in 0..rows {
        let type_key = keys::row_type(key, index, j);
        let tag = match facade.try_get(&type_key, Some(&TypeDesc::Text)).await? {
            Some(Value::Text(tag)) => tag,
            _ => return Err(Error::Partition(format!("missing row type at {}", type_key))),
        };
        let row_type = registry.resolve(&tag)?;
        let row_key = keys::row(key, index, j);
        let row = facade
            .try_get(&row_key, Some(&row_type))
            .await?
            .ok_or_else(|| Error::Partition(format!("missing row at {}", row_key)))?;

        match shape {
            PartitionShape::Associative => {
                if row_type != TypeDesc::record(PairDataInfo::TYPE_NAME) {
                    return Err(Error::Partition(format!("unsupported map child type '{}'", row_type)));
                }
                entries.push(PairDataInfo::from_value(row)?.decode(registry)?);
            }
            PartitionShape::SetLike => {
                if !items.contains(&row) {
                    items.push(row);
                }
            }
            _ => items.push(row),
        }
    }
    debug!("Read {} rows of {}", rows, keys::partition(key, index));

    Ok(match shape {
        PartitionShape::Associative => Value::Map(entries),
        PartitionShape::SetLike => Value::Set(items),
        _ => Value::List(items),
    })
}
