use std::fmt;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::registry::TypeRegistry;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Result};

/// Structural shape of an enveloped value, persisted as `'0'..='3'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "char", try_from = "char")]
pub enum Shape {
    Object,
    List,
    Map,
    Set,
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::List(_) => Shape::List,
            Value::Set(_) => Shape::Set,
            Value::Map(_) => Shape::Map,
            _ => Shape::Object,
        }
    }
}

impl From<Shape> for char {
    fn from(shape: Shape) -> char {
        match shape {
            Shape::Object => '0',
            Shape::List => '1',
            Shape::Map => '2',
            Shape::Set => '3',
        }
    }
}

impl TryFrom<char> for Shape {
    type Error = String;

    fn try_from(c: char) -> std::result::Result<Self, String> {
        match c {
            '0' => Ok(Shape::Object),
            '1' => Ok(Shape::List),
            '2' => Ok(Shape::Map),
            '3' => Ok(Shape::Set),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

mod hex_text {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

/// The persisted record for one physical entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInfo {
    #[serde(with = "hex_text")]
    pub cipher_text: Vec<u8>,
    pub data_type: Shape,
    #[serde(rename = "keyClazzName", default, skip_serializing_if = "Option::is_none")]
    pub key_type_name: Option<String>,
    #[serde(rename = "valueClazzName", default, skip_serializing_if = "Option::is_none")]
    pub value_type_name: Option<String>,
    /// Resolved form of `key_type_name`; unset when resolution failed.
    #[serde(skip)]
    pub key_type: Option<TypeDesc>,
    /// Resolved form of `value_type_name`; unset when resolution failed.
    #[serde(skip)]
    pub value_type: Option<TypeDesc>,
}

impl DataInfo {
    /// Type to decode the plaintext as.
    ///
    /// A name that was written but does not resolve is an error. A collection
    /// written without element names was empty and decodes as such.
    pub fn target_type(&self) -> Result<TypeDesc> {
        let value = resolved(&self.value_type_name, &self.value_type)?;
        match self.data_type {
            Shape::Object => value.ok_or_else(|| Error::Conversion("object envelope without a type name".to_string())),
            Shape::List => Ok(TypeDesc::List(value.map(Box::new))),
            Shape::Set => Ok(TypeDesc::Set(value.map(Box::new))),
            Shape::Map => {
                let key = resolved(&self.key_type_name, &self.key_type)?;
                match (key, value) {
                    (Some(k), Some(v)) => Ok(TypeDesc::map(k, v)),
                    (None, None) => Ok(TypeDesc::Map(None)),
                    _ => Err(Error::Conversion("map envelope with only one side typed".to_string())),
                }
            }
        }
    }
}

fn resolved(name: &Option<String>, desc: &Option<TypeDesc>) -> Result<Option<TypeDesc>> {
    match (name, desc) {
        (_, Some(desc)) => Ok(Some(desc.clone())),
        (Some(name), None) => Err(Error::UnknownType(name.clone())),
        (None, None) => Ok(None),
    }
}

impl fmt::Display for DataInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataInfo({:?}, key={}, value={}, {} bytes)",
            self.data_type,
            self.key_type_name.as_deref().unwrap_or("-"),
            self.value_type_name.as_deref().unwrap_or("-"),
            self.cipher_text.len()
        )
    }
}

/// Wraps ciphertext with shape and type metadata, and unwraps it on read.
pub struct Serializer {
    registry: Arc<TypeRegistry>,
}

impl Serializer {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn wrap(&self, cipher_text: Vec<u8>, value: &Value) -> Result<String> {
        let data_type = Shape::of(value);
        let (key_type_name, value_type_name) = match value.uniform_type()? {
            TypeDesc::List(element) | TypeDesc::Set(element) => (None, element.map(|e| e.to_string())),
            TypeDesc::Map(Some((k, v))) => (Some(k.to_string()), Some(v.to_string())),
            TypeDesc::Map(None) => (None, None),
            other => (None, Some(other.to_string())),
        };
        let info = DataInfo {
            cipher_text,
            data_type,
            key_type_name,
            value_type_name,
            key_type: None,
            value_type: None,
        };
        Ok(serde_json::to_string(&info)?)
    }

    pub fn unwrap(&self, text: &str) -> Result<DataInfo> {
        let mut info: DataInfo = serde_json::from_str(text)?;
        info.key_type = self.resolve(info.key_type_name.as_deref());
        info.value_type = self.resolve(info.value_type_name.as_deref());
        Ok(info)
    }

    fn resolve(&self, name: Option<&str>) -> Option<TypeDesc> {
        let name = name?;
        match self.registry.resolve(name) {
            Ok(desc) => Some(desc),
            Err(e) => {
                warn!("Could not resolve envelope type '{}': {}", name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serializer() -> Serializer {
        Serializer::new(Arc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_wire_format() {
        let value = Value::Map(vec![(Value::Int(1), Value::Text("a".into()))]);
        let text = serializer().wrap(vec![0xab, 0x01], &value).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cipherText": "ab01",
                "dataType": "2",
                "keyClazzName": "int",
                "valueClazzName": "string"
            })
        );
    }

    #[test]
    fn test_wrap_unwrap_shapes() {
        let serializer = serializer();
        let cases = [
            (Value::Long(3), Shape::Object, TypeDesc::Long),
            (Value::List(vec![Value::Text("x".into())]), Shape::List, TypeDesc::list(TypeDesc::Text)),
            (Value::Set(vec![]), Shape::Set, TypeDesc::Set(None)),
            (Value::Map(vec![]), Shape::Map, TypeDesc::Map(None)),
        ];
        for (value, shape, target) in cases {
            let info = serializer.unwrap(&serializer.wrap(b"payload".to_vec(), &value).unwrap()).unwrap();
            assert_eq!(info.data_type, shape);
            assert_eq!(info.cipher_text, b"payload");
            assert_eq!(info.target_type().unwrap(), target);
        }
    }

    #[test]
    fn test_element_type_skips_empty_first_element() {
        let value = Value::List(vec![Value::List(vec![]), Value::List(vec![Value::Int(4)])]);
        let text = serializer().wrap(Vec::new(), &value).unwrap();
        let info = serializer().unwrap(&text).unwrap();
        assert_eq!(info.value_type_name.as_deref(), Some("list<int>"));
        assert!(serializer().wrap(Vec::new(), &Value::Set(vec![Value::Int(1), Value::Long(1)])).is_err());
    }

    #[test]
    fn test_empty_cipher_text() {
        let serializer = serializer();
        let text = serializer.wrap(Vec::new(), &Value::Text(String::new())).unwrap();
        assert!(serializer.unwrap(&text).unwrap().cipher_text.is_empty());
    }

    #[test]
    fn test_unresolved_name_fails_target_type() {
        let text = r#"{"cipherText":"00","dataType":"1","valueClazzName":"Missing"}"#;
        let info = serializer().unwrap(text).unwrap();
        assert_eq!(info.value_type, None);
        assert!(matches!(info.target_type(), Err(Error::UnknownType(n)) if n == "Missing"));
    }

    #[test]
    fn test_malformed_envelope() {
        let serializer = serializer();
        assert!(serializer.unwrap("not json").is_err());
        assert!(serializer.unwrap(r#"{"cipherText":"zz","dataType":"0"}"#).is_err());
        assert!(serializer.unwrap(r#"{"cipherText":"00","dataType":"7"}"#).is_err());
    }
}
