use std::sync::Arc;

use crate::registry::TypeRegistry;
use crate::types::TypeDesc;
use crate::value::Value;
use crate::{Error, Parser, Result};

/// Size ceilings enforced before a value is converted and after it is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of items in one list or set.
    pub max_collection_size: usize,
    /// Maximum number of entries in one map.
    pub max_map_size: usize,
    /// Maximum length of a converted payload in bytes.
    pub max_text_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_collection_size: 100_000,
            max_map_size: 50_000,
            max_text_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Checks `value` and everything nested in it against the collection ceilings.
    pub fn check(&self, value: &Value) -> Result<()> {
        match value {
            Value::List(items) | Value::Set(items) => {
                if items.len() > self.max_collection_size {
                    return Err(Error::SizeLimit(format!(
                        "collection of {} items exceeds {}",
                        items.len(),
                        self.max_collection_size
                    )));
                }
                items.iter().try_for_each(|item| self.check(item))
            }
            Value::Map(entries) => {
                if entries.len() > self.max_map_size {
                    return Err(Error::SizeLimit(format!(
                        "map of {} entries exceeds {}",
                        entries.len(),
                        self.max_map_size
                    )));
                }
                entries.iter().try_for_each(|(k, v)| {
                    self.check(k)?;
                    self.check(v)
                })
            }
            _ => Ok(()),
        }
    }

    fn check_text(&self, text: &str) -> Result<()> {
        if text.len() > self.max_text_bytes {
            return Err(Error::SizeLimit(format!(
                "payload of {} bytes exceeds {}",
                text.len(),
                self.max_text_bytes
            )));
        }
        Ok(())
    }
}

/// Bridges the value model and the [`Parser`].
///
/// Writing is type-agnostic. Reading needs the target [`TypeDesc`], which the
/// registry uses to rebuild scalars, records and nested collections from the
/// parsed tree.
pub struct Converter {
    parser: Arc<dyn Parser>,
    registry: Arc<TypeRegistry>,
    limits: Limits,
}

impl Converter {
    pub fn new(parser: Arc<dyn Parser>, registry: Arc<TypeRegistry>, limits: Limits) -> Self {
        Self {
            parser,
            registry,
            limits,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Rejects values over the ceilings and collections with mixed element types.
    pub fn to_text(&self, value: &Value) -> Result<String> {
        self.limits.check(value)?;
        value.uniform_type()?;
        let text = self.parser.to_text(&value.to_json()?)?;
        self.limits.check_text(&text)?;
        Ok(text)
    }

    pub fn from_text(&self, text: &str, desc: &TypeDesc) -> Result<Value> {
        self.limits.check_text(text)?;
        let json = self.parser.from_text(text)?;
        let value = self.registry.decode(desc, json)?;
        self.limits.check(&value)?;
        Ok(value)
    }
}
