//! Single-entry persistence pipeline and the bundled capability implementations.

pub mod converter;
pub mod envelope;
pub mod executor;
pub mod facade;
pub mod memstore;
pub mod parser;
pub mod persistence;
pub mod vault;

pub use converter::{Converter, Limits};
pub use envelope::{DataInfo, Serializer, Shape};
pub use executor::Executor;
pub use facade::Facade;
pub use memstore::MemoryStorage;
pub use parser::JsonParser;
pub use persistence::FileStorage;
pub use vault::{AesGcmEncryption, NoEncryption};
