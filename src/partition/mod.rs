//! Partitioned storage of composite values.
//!
//! An aggregate that implements [`Partitioned`] is written as a set of physical
//! entries derived from its base key (see [`keys`]), one group per partition, and
//! rebuilt from them on read by [`ParcelStore`].

pub mod delegate;
pub mod keys;
pub mod layout;

use std::any::Any;

use log::warn;

use crate::types::TypeDesc;
use crate::value::{ToValue, Value};
use crate::{Error, Result};

pub use delegate::ParcelStore;
pub use layout::{PairDataInfo, PartitionShape};

/// Upcast to [`Any`] so a rebuilt aggregate can be handed back as its concrete type.
pub trait AsAny: Any + Send {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A composite value that can be split across many physical entries.
///
/// Partition `i` holds a scalar, a record, or a list/set/map whose rows are
/// stored individually. Implementors must be registered with
/// [`TypeRegistry::register_partitioned`](crate::TypeRegistry::register_partitioned);
/// the record name given there is stored under `K.type` and used to instantiate
/// the aggregate on read.
pub trait Partitioned: AsAny + ToValue + Send + Sync {
    fn is_partitioning_enabled(&self) -> bool {
        true
    }

    /// Seal partitions concurrently, one task each, under the partition timeout.
    fn is_partitioning_parallelized(&self) -> bool {
        false
    }

    fn partition_count(&self) -> usize;

    /// Data of partition `i`. `None` skips the partition.
    fn partition_data(&self, index: usize) -> Result<Option<Value>>;

    fn set_partition_data(&mut self, index: usize, data: Value) -> Result<()>;

    /// Declared type of partition `i`, used to decode it on read.
    fn partition_type(&self, index: usize) -> Option<TypeDesc>;

    /// Called before a read aborts because partition `i` could not be rebuilt.
    fn fail_partition_data(&mut self, index: usize, error: &Error) {
        warn!("Partition {} could not be read: {}", index, error);
    }
}
