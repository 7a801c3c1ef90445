use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::partition::layout::PairDataInfo;
use crate::partition::{AsAny, Partitioned};
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};

/// A named serde type that can be stored as a [`Value::Record`].
///
/// Usually implemented through [`impl_record!`](crate::impl_record).
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

type Validator = fn(&serde_json::Value) -> Result<()>;
type Factory = fn() -> Box<dyn Partitioned>;

fn validate<T: Record>(body: &serde_json::Value) -> Result<()> {
    T::deserialize(body).map(|_| ()).map_err(|e| {
        Error::Conversion(format!("body does not decode as '{}': {}", T::TYPE_NAME, e))
    })
}

fn instantiate<T: Partitioned + Default>() -> Box<dyn Partitioned> {
    Box::new(T::default())
}

/// Closed mapping from type identifiers to decoders and factories.
///
/// Scalars and collections are built in. Record types and partitioned
/// aggregates must be registered before a store is built; an identifier that is
/// not registered resolves to [`Error::UnknownType`].
#[derive(Clone)]
pub struct TypeRegistry {
    records: HashMap<String, Validator>,
    aggregates: HashMap<String, Factory>,
    aggregate_names: HashMap<TypeId, &'static str>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .field("aggregates", &self.aggregates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            records: HashMap::new(),
            aggregates: HashMap::new(),
            aggregate_names: HashMap::new(),
        };
        registry.register_record::<PairDataInfo>();
        registry
    }

    pub fn register_record<T: Record>(&mut self) -> &mut Self {
        self.records.insert(T::TYPE_NAME.to_string(), validate::<T>);
        self
    }

    /// Registers an aggregate for partitioned reads. It is also registered as a
    /// record so it can be stored whole when partitioning is disabled.
    pub fn register_partitioned<T: Partitioned + Record + Default>(&mut self) -> &mut Self {
        self.register_record::<T>();
        self.aggregates.insert(T::TYPE_NAME.to_string(), instantiate::<T>);
        self.aggregate_names.insert(TypeId::of::<T>(), T::TYPE_NAME);
        self
    }

    /// Record name an aggregate was registered under; this is what `K.type` holds.
    pub fn aggregate_name(&self, aggregate: &dyn Partitioned) -> Result<&'static str> {
        let any: &dyn Any = AsAny::as_any(aggregate);
        self.aggregate_names
            .get(&Any::type_id(any))
            .copied()
            .ok_or_else(|| Error::UnknownType("aggregate is not registered as partitioned".to_string()))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Parses a type identifier and checks that every record it names is known.
    pub fn resolve(&self, name: &str) -> Result<TypeDesc> {
        let desc: TypeDesc = name.parse()?;
        if let Some(unknown) = desc.record_names().into_iter().find(|r| !self.is_registered(r)) {
            return Err(Error::UnknownType(unknown.to_string()));
        }
        Ok(desc)
    }

    /// Builds an empty aggregate for the partitioned read path.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn Partitioned>> {
        self.aggregates
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    /// Decodes untyped JSON into a value of the described type.
    pub fn decode(&self, desc: &TypeDesc, json: serde_json::Value) -> Result<Value> {
        use serde_json::Value as Json;

        let unexpected = |json: &Json| Error::Conversion(format!("cannot read {} as {}", json, desc));

        match desc {
            TypeDesc::Bool => json.as_bool().map(Value::Bool).ok_or_else(|| unexpected(&json)),
            TypeDesc::Int => json
                .as_i64()
                .and_then(|l| i32::try_from(l).ok())
                .map(Value::Int)
                .ok_or_else(|| unexpected(&json)),
            TypeDesc::Long => match json.as_i64() {
                Some(l) => Ok(Value::Long(l)),
                None => json
                    .as_f64()
                    .filter(|d| d.fract() == 0.0)
                    .map(|d| Value::Long(d as i64))
                    .ok_or_else(|| unexpected(&json)),
            },
            TypeDesc::Double => json.as_f64().map(Value::Double).ok_or_else(|| unexpected(&json)),
            TypeDesc::Text => match json {
                Json::String(s) => Ok(Value::Text(s)),
                other => Err(unexpected(&other)),
            },
            TypeDesc::Uuid => json
                .as_str()
                .and_then(|s| uuid::Uuid::parse_str(s).ok())
                .map(Value::Uuid)
                .ok_or_else(|| unexpected(&json)),
            TypeDesc::Record(name) => {
                let validator = self
                    .records
                    .get(name)
                    .ok_or_else(|| Error::UnknownType(name.clone()))?;
                validator(&json)?;
                Ok(Value::Record {
                    type_name: name.clone(),
                    body: json,
                })
            }
            TypeDesc::List(element) => Ok(Value::List(self.decode_items(desc, element.as_deref(), json)?)),
            TypeDesc::Set(element) => Ok(Value::Set(self.decode_items(desc, element.as_deref(), json)?)),
            TypeDesc::Map(entry) => {
                let object = match json {
                    Json::Object(object) => object,
                    other => return Err(unexpected(&other)),
                };
                if object.is_empty() {
                    return Ok(Value::Map(Vec::new()));
                }
                let (key_desc, value_desc) = entry
                    .as_ref()
                    .ok_or_else(|| Error::Conversion(format!("'{}' has no key/value types", desc)))?;
                let mut entries = Vec::with_capacity(object.len());
                for (k, v) in object {
                    entries.push((self.decode_key(key_desc, k)?, self.decode(value_desc, v)?));
                }
                Ok(Value::Map(entries))
            }
        }
    }

    fn decode_items(&self, desc: &TypeDesc, element: Option<&TypeDesc>, json: serde_json::Value) -> Result<Vec<Value>> {
        let items = match json {
            serde_json::Value::Array(items) => items,
            other => return Err(Error::Conversion(format!("cannot read {} as {}", other, desc))),
        };
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let element = element.ok_or_else(|| Error::Conversion(format!("'{}' has no element type", desc)))?;
        items.into_iter().map(|item| self.decode(element, item)).collect()
    }

    /// Reverses [`Value::to_key_string`].
    fn decode_key(&self, desc: &TypeDesc, key: String) -> Result<Value> {
        let bad = |e: &dyn fmt::Display| Error::Conversion(format!("bad {} map key: {}", desc, e));
        match desc {
            TypeDesc::Text => Ok(Value::Text(key)),
            TypeDesc::Bool => key.parse().map(Value::Bool).map_err(|e| bad(&e)),
            TypeDesc::Int => key.parse().map(Value::Int).map_err(|e| bad(&e)),
            TypeDesc::Long => key.parse().map(Value::Long).map_err(|e| bad(&e)),
            TypeDesc::Double => key.parse().map(Value::Double).map_err(|e| bad(&e)),
            TypeDesc::Uuid => uuid::Uuid::parse_str(&key).map(Value::Uuid).map_err(|e| bad(&e)),
            composite => {
                let json: serde_json::Value = serde_json::from_str(&key)?;
                self.decode(composite, json)
            }
        }
    }
}
