use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use uuid::Uuid;

use crate::partition::Partitioned;
use crate::registry::Record;
use crate::types::TypeDesc;
use crate::{Error, Result};

/// A dynamically typed value as it flows through the engine.
///
/// Every variant knows its own [`TypeDesc`], which is what lets heterogeneous
/// collection rows keep their concrete types across a round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    /// A named composite object with its serialized body.
    Record { type_name: String, body: serde_json::Value },
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Runtime type of this value. Collections describe their first element.
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Value::Bool(_) => TypeDesc::Bool,
            Value::Int(_) => TypeDesc::Int,
            Value::Long(_) => TypeDesc::Long,
            Value::Double(_) => TypeDesc::Double,
            Value::Text(_) => TypeDesc::Text,
            Value::Uuid(_) => TypeDesc::Uuid,
            Value::Record { type_name, .. } => TypeDesc::Record(type_name.clone()),
            Value::List(items) => TypeDesc::List(items.first().map(|v| Box::new(v.type_desc()))),
            Value::Set(items) => TypeDesc::Set(items.first().map(|v| Box::new(v.type_desc()))),
            Value::Map(entries) => TypeDesc::Map(
                entries
                    .first()
                    .map(|(k, v)| (Box::new(k.type_desc()), Box::new(v.type_desc()))),
            ),
        }
    }

    /// Type shared by every element, checked all the way down. Fails on a
    /// collection whose elements disagree.
    pub fn uniform_type(&self) -> Result<TypeDesc> {
        match self {
            Value::List(items) => Ok(TypeDesc::List(common_type(items.iter())?.map(Box::new))),
            Value::Set(items) => Ok(TypeDesc::Set(common_type(items.iter())?.map(Box::new))),
            Value::Map(entries) => {
                let key = common_type(entries.iter().map(|(k, _)| k))?;
                let value = common_type(entries.iter().map(|(_, v)| v))?;
                Ok(match (key, value) {
                    (Some(k), Some(v)) => TypeDesc::map(k, v),
                    _ => TypeDesc::Map(None),
                })
            }
            other => Ok(other.type_desc()),
        }
    }

    /// Wraps a serializable record.
    pub fn from_record<T: Record>(record: &T) -> Result<Self> {
        Ok(Value::Record {
            type_name: T::TYPE_NAME.to_string(),
            body: serde_json::to_value(record)?,
        })
    }

    /// Deserializes a [`Value::Record`] into `T`.
    pub fn into_record<T: Record>(self) -> Result<T> {
        match self {
            Value::Record { type_name, body } => {
                if type_name != T::TYPE_NAME {
                    return Err(Error::Conversion(format!(
                        "expected record '{}', found '{}'",
                        T::TYPE_NAME,
                        type_name
                    )));
                }
                Ok(serde_json::from_value(body)?)
            }
            other => Err(mismatch(T::TYPE_NAME, &other)),
        }
    }

    /// Plain JSON form used as parser input. Type information is not part of it.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        use serde_json::Value as Json;

        Ok(match self {
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Long(l) => Json::from(*l),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .ok_or_else(|| Error::Conversion(format!("non-finite number {}", d)))?,
            Value::Text(s) => Json::String(s.clone()),
            Value::Uuid(u) => Json::String(u.to_string()),
            Value::Record { body, .. } => body.clone(),
            Value::List(items) | Value::Set(items) => {
                Json::Array(items.iter().map(Value::to_json).collect::<Result<_>>()?)
            }
            Value::Map(entries) => {
                let mut object = serde_json::Map::with_capacity(entries.len());
                for (k, v) in entries {
                    object.insert(k.to_key_string()?, v.to_json()?);
                }
                Json::Object(object)
            }
        })
    }

    /// Map keys become JSON object keys. Scalars are written verbatim, anything
    /// else as its JSON text.
    pub(crate) fn to_key_string(&self) -> Result<String> {
        Ok(match self {
            Value::Text(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Long(l) => l.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Uuid(u) => u.to_string(),
            other => serde_json::to_string(&other.to_json()?)?,
        })
    }

    /// Maps untyped JSON onto the value model: integers become `Long`, other
    /// numbers `Double`, objects become maps with text keys. `null` has no
    /// counterpart and is rejected.
    pub fn infer(json: serde_json::Value) -> Result<Self> {
        use serde_json::Value as Json;

        Ok(match json {
            Json::Null => return Err(Error::Conversion("null values cannot be stored".to_string())),
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(l) => Value::Long(l),
                None => Value::Double(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::List(items.into_iter().map(Value::infer).collect::<Result<_>>()?),
            Json::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| Ok((Value::Text(k), Value::infer(v)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Text(_) => "string",
            Value::Uuid(_) => "uuid",
            Value::Record { .. } => "record",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
        }
    }
}

fn common_type<'a>(values: impl Iterator<Item = &'a Value>) -> Result<Option<TypeDesc>> {
    let mut common: Option<TypeDesc> = None;
    for value in values {
        let desc = value.uniform_type()?;
        common = match common {
            None => Some(desc),
            Some(seen) => match seen.unify(&desc) {
                Some(unified) => Some(unified),
                None => {
                    return Err(Error::Conversion(format!(
                        "mixed element types '{}' and '{}'",
                        seen, desc
                    )))
                }
            },
        };
    }
    Ok(common)
}

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::Conversion(format!("expected {}, found {}", expected, found.kind()))
}

/// Conversion of a Rust value into the engine's value model.
pub trait ToValue {
    fn to_value(&self) -> Result<Value>;

    /// Composite values that support partitioned storage return themselves here.
    fn partitioned(&self) -> Option<&dyn Partitioned> {
        None
    }
}

/// Conversion back out of the engine's value model.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Static type descriptor of a Rust type, used to declare partition types.
pub trait Typed {
    fn type_desc() -> TypeDesc;
}

/// Implements [`Record`], [`ToValue`], [`FromValue`] and [`Typed`] for a serde type.
///
/// Add `partitioned` to route puts of the type through its [`Partitioned`] impl.
///
/// ```ignore
/// impl_record!(SampleItem, "SampleItem");
/// impl_record!(SampleData, "SampleData", partitioned);
/// ```
#[macro_export]
macro_rules! impl_record {
    (@common $ty:ty, $name:expr) => {
        impl $crate::Record for $ty {
            const TYPE_NAME: &'static str = $name;
        }
        impl $crate::FromValue for $ty {
            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                value.into_record()
            }
        }
        impl $crate::Typed for $ty {
            fn type_desc() -> $crate::TypeDesc {
                $crate::TypeDesc::record($name)
            }
        }
    };
    ($ty:ty, $name:expr) => {
        $crate::impl_record!(@common $ty, $name);
        impl $crate::ToValue for $ty {
            fn to_value(&self) -> $crate::Result<$crate::Value> {
                $crate::Value::from_record(self)
            }
        }
    };
    ($ty:ty, $name:expr, partitioned) => {
        $crate::impl_record!(@common $ty, $name);
        impl $crate::ToValue for $ty {
            fn to_value(&self) -> $crate::Result<$crate::Value> {
                $crate::Value::from_record(self)
            }

            fn partitioned(&self) -> Option<&dyn $crate::Partitioned> {
                Some(self)
            }
        }
    };
}

impl ToValue for Value {
    fn to_value(&self) -> Result<Value> {
        Ok(self.clone())
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Result<Value> {
        (**self).to_value()
    }

    fn partitioned(&self) -> Option<&dyn Partitioned> {
        (**self).partitioned()
    }
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident, $desc:ident) => {
        impl ToValue for $ty {
            fn to_value(&self) -> Result<Value> {
                Ok(Value::$variant(self.clone()))
            }
        }

        impl Typed for $ty {
            fn type_desc() -> TypeDesc {
                TypeDesc::$desc
            }
        }
    };
}

scalar_value!(bool, Bool, Bool);
scalar_value!(i32, Int, Int);
scalar_value!(i64, Long, Long);
scalar_value!(f64, Double, Double);
scalar_value!(String, Text, Text);
scalar_value!(Uuid, Uuid, Uuid);

impl ToValue for str {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Text(self.to_string()))
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            Value::Long(l) => i32::try_from(l).map_err(|e| Error::Conversion(e.to_string())),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Long(l) => Ok(l),
            Value::Int(i) => Ok(i64::from(i)),
            other => Err(mismatch("long", &other)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(d) => Ok(d),
            Value::Int(i) => Ok(f64::from(i)),
            Value::Long(l) => Ok(l as f64),
            other => Err(mismatch("double", &other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::Text(s) => Uuid::parse_str(&s).map_err(|e| Error::Conversion(e.to_string())),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

fn elements<T: ToValue>(items: impl IntoIterator<Item = T>) -> Result<Vec<Value>> {
    items.into_iter().map(|item| item.to_value()).collect()
}

fn items_of(value: Value, expected: &str) -> Result<Vec<Value>> {
    match value {
        Value::List(items) | Value::Set(items) => Ok(items),
        other => Err(mismatch(expected, &other)),
    }
}

fn entries_of(value: Value) -> Result<Vec<(Value, Value)>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(mismatch("map", &other)),
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::List(elements(self.iter())?))
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::List(elements(self.iter())?))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        items_of(value, "list")?.into_iter().map(T::from_value).collect()
    }
}

impl<T: Typed> Typed for Vec<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::list(T::type_desc())
    }
}

impl<T: ToValue> ToValue for HashSet<T> {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Set(elements(self.iter())?))
    }
}

impl<T: FromValue + Eq + Hash> FromValue for HashSet<T> {
    fn from_value(value: Value) -> Result<Self> {
        items_of(value, "set")?.into_iter().map(T::from_value).collect()
    }
}

impl<T: Typed> Typed for HashSet<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::set(T::type_desc())
    }
}

impl<T: ToValue> ToValue for BTreeSet<T> {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Set(elements(self.iter())?))
    }
}

impl<T: FromValue + Ord> FromValue for BTreeSet<T> {
    fn from_value(value: Value) -> Result<Self> {
        items_of(value, "set")?.into_iter().map(T::from_value).collect()
    }
}

impl<T: Typed> Typed for BTreeSet<T> {
    fn type_desc() -> TypeDesc {
        TypeDesc::set(T::type_desc())
    }
}

impl<K: ToValue, V: ToValue> ToValue for HashMap<K, V> {
    fn to_value(&self) -> Result<Value> {
        let entries = self
            .iter()
            .map(|(k, v)| Ok((k.to_value()?, v.to_value()?)))
            .collect::<Result<_>>()?;
        Ok(Value::Map(entries))
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        entries_of(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K: Typed, V: Typed> Typed for HashMap<K, V> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(K::type_desc(), V::type_desc())
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Result<Value> {
        let entries = self
            .iter()
            .map(|(k, v)| Ok((k.to_value()?, v.to_value()?)))
            .collect::<Result<_>>()?;
        Ok(Value::Map(entries))
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        entries_of(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K: Typed, V: Typed> Typed for BTreeMap<K, V> {
    fn type_desc() -> TypeDesc {
        TypeDesc::map(K::type_desc(), V::type_desc())
    }
}
