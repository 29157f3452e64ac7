//! Offset checkpoints.
//!
//! A checkpoint store records, per partition, the offset of the last message
//! the handler accepted. Consumption resumes from this snapshot on every
//! reconnect.
//!
//! Backends:
//! - In-memory ([`MemoryCheckpointStore`]), for tests and ephemeral consumers
//! - Remote key-value hash ([`KeyValueCheckpointStore`]); Redis support via
//!   the `redis` feature
//!
//! ```rust,ignore
//! use eventbus::checkpoint::{KeyValueCheckpointStore, RedisCommands};
//!
//! let commands = RedisCommands::open("redis://127.0.0.1/")?;
//! let store = KeyValueCheckpointStore::new("orders-consumer", commands);
//! ```

mod kv;
mod memory;

#[cfg(feature = "redis")]
mod redis;

pub use kv::{HashCommands, KeyValueCheckpointStore, MemoryHashCommands};
pub use memory::MemoryCheckpointStore;

#[cfg(feature = "redis")]
pub use self::redis::RedisCommands;

use std::collections::btree_map::{self, BTreeMap};
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("unexpected reply to offset write: {0}")]
    UnexpectedReply(i64),

    #[error("offset listing has odd length {0}")]
    OddReply(usize),

    #[error("invalid stored field: {0}")]
    InvalidField(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Last processed offset per partition.
///
/// Serialises with string keys and string values, which is what the server
/// expects inside the handshake state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionOffsets(BTreeMap<i32, i64>);

impl PartitionOffsets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, partition: i32) -> Option<i64> {
        self.0.get(&partition).copied()
    }

    pub fn insert(&mut self, partition: i32, offset: i64) -> Option<i64> {
        self.0.insert(partition, offset)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, i32, i64> {
        self.0.iter()
    }
}

impl FromIterator<(i32, i64)> for PartitionOffsets {
    fn from_iter<I: IntoIterator<Item = (i32, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a PartitionOffsets {
    type Item = (&'a i32, &'a i64);
    type IntoIter = btree_map::Iter<'a, i32, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PartitionOffsets {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (partition, offset) in &self.0 {
            map.serialize_entry(&partition.to_string(), &offset.to_string())?;
        }
        map.end()
    }
}

/// Checkpoint store trait.
///
/// Implementations use interior mutability so a store can be shared between
/// the connection loop and whoever inspects or seeds it.
pub trait CheckpointStore: Send + Sync {
    /// Full snapshot, or `None` when nothing has been recorded yet.
    fn get_offsets(&self) -> Result<Option<PartitionOffsets>>;

    /// Record `offset` as the last processed position of `partition`.
    fn set_offset(&self, partition: i32, offset: i64) -> Result<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Arc<S> {
    fn get_offsets(&self) -> Result<Option<PartitionOffsets>> {
        (**self).get_offsets()
    }

    fn set_offset(&self, partition: i32, offset: i64) -> Result<()> {
        (**self).set_offset(partition, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_serialize_as_strings() {
        let offsets: PartitionOffsets = [(1, 200), (0, 100)].into_iter().collect();
        let json = serde_json::to_string(&offsets).unwrap();
        assert_eq!(json, r#"{"0":"100","1":"200"}"#);
    }

    #[test]
    fn test_offsets_negative_values() {
        let offsets: PartitionOffsets = [(-1, -2)].into_iter().collect();
        assert_eq!(serde_json::to_string(&offsets).unwrap(), r#"{"-1":"-2"}"#);
    }

    #[test]
    fn test_offsets_insert_overwrites() {
        let mut offsets = PartitionOffsets::new();
        assert!(offsets.is_empty());
        assert_eq!(offsets.insert(3, 10), None);
        assert_eq!(offsets.insert(3, 11), Some(10));
        assert_eq!(offsets.get(3), Some(11));
        assert_eq!(offsets.len(), 1);
    }
}
