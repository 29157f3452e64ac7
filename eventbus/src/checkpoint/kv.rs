//! Checkpoints in a remote key-value hash.
//!
//! All offsets of one consumer live in a single hash at `<prefix>:offsets`,
//! one field per partition. Writes are single-field `HSET`s, so concurrent
//! consumers sharing a backend rely on its per-field atomicity.

use std::str;

use dashmap::DashMap;

use super::{CheckpointError, CheckpointStore, PartitionOffsets, Result};

/// The two hash commands the store needs from a backend.
pub trait HashCommands: Send + Sync {
    /// `HSET key field value`. Redis replies 1 when the field was created
    /// and 0 when it was updated.
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<i64>;

    /// `HGETALL key` as a flat `field, value, field, value, ...` sequence.
    /// An absent key is an empty sequence.
    fn hgetall(&self, key: &str) -> Result<Vec<Vec<u8>>>;
}

/// Checkpoint store over a [`HashCommands`] backend.
#[derive(Debug)]
pub struct KeyValueCheckpointStore<C> {
    key: String,
    commands: C,
}

impl<C: HashCommands> KeyValueCheckpointStore<C> {
    pub fn new(prefix: &str, commands: C) -> Self {
        Self {
            key: format!("{prefix}:offsets"),
            commands,
        }
    }

    /// Name of the hash holding the offsets.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }
}

impl<C: HashCommands> CheckpointStore for KeyValueCheckpointStore<C> {
    fn get_offsets(&self) -> Result<Option<PartitionOffsets>> {
        let values = self.commands.hgetall(&self.key)?;
        parse_offsets(&values)
    }

    fn set_offset(&self, partition: i32, offset: i64) -> Result<()> {
        let reply = self
            .commands
            .hset(&self.key, &partition.to_string(), &offset.to_string())?;
        match reply {
            0 | 1 => Ok(()),
            other => Err(CheckpointError::UnexpectedReply(other)),
        }
    }
}

fn parse_offsets(values: &[Vec<u8>]) -> Result<Option<PartitionOffsets>> {
    if values.is_empty() {
        return Ok(None);
    }
    if values.len() % 2 != 0 {
        return Err(CheckpointError::OddReply(values.len()));
    }

    let mut offsets = PartitionOffsets::new();
    for pair in values.chunks_exact(2) {
        let partition = parse_field::<i32>(&pair[0])?;
        let offset = parse_field::<i64>(&pair[1])?;
        offsets.insert(partition, offset);
    }
    Ok(Some(offsets))
}

fn parse_field<T: str::FromStr>(raw: &[u8]) -> Result<T> {
    str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CheckpointError::InvalidField(String::from_utf8_lossy(raw).into_owned()))
}

/// In-process stand-in for a Redis hash, with Redis reply semantics.
#[derive(Debug, Default)]
pub struct MemoryHashCommands {
    hashes: DashMap<String, Vec<(String, String)>>,
}

impl MemoryHashCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw field value, as the backend stores it.
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        let hash = self.hashes.get(key)?;
        hash.iter().find(|(f, _)| f == field).map(|(_, v)| v.clone())
    }

    /// Drop a whole hash, like an operator resetting a consumer.
    pub fn delete(&self, key: &str) -> bool {
        self.hashes.remove(key).is_some()
    }
}

impl HashCommands for MemoryHashCommands {
    fn hset(&self, key: &str, field: &str, value: &str) -> Result<i64> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        match hash.iter_mut().find(|(f, _)| f == field) {
            Some((_, existing)) => {
                *existing = value.to_string();
                Ok(0)
            }
            None => {
                hash.push((field.to_string(), value.to_string()));
                Ok(1)
            }
        }
    }

    fn hgetall(&self, key: &str) -> Result<Vec<Vec<u8>>> {
        let Some(hash) = self.hashes.get(key) else {
            return Ok(Vec::new());
        };
        Ok(hash
            .iter()
            .flat_map(|(f, v)| [f.as_bytes().to_vec(), v.as_bytes().to_vec()])
            .collect())
    }
}
