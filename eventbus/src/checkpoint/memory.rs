//! In-memory checkpoint store.

use dashmap::DashMap;

use super::{CheckpointStore, PartitionOffsets, Result};

/// Process-local store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    offsets: DashMap<i32, i64>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a snapshot.
    pub fn with_offsets(offsets: &PartitionOffsets) -> Self {
        let store = Self::new();
        for (partition, offset) in offsets {
            store.offsets.insert(*partition, *offset);
        }
        store
    }

    pub fn offset(&self, partition: i32) -> Option<i64> {
        self.offsets.get(&partition).map(|r| *r)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn get_offsets(&self) -> Result<Option<PartitionOffsets>> {
        if self.offsets.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            self.offsets.iter().map(|r| (*r.key(), *r.value())).collect(),
        ))
    }

    fn set_offset(&self, partition: i32, offset: i64) -> Result<()> {
        self.offsets.insert(partition, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_store_has_no_snapshot() {
        let store = MemoryCheckpointStore::new();
        assert_eq!(store.get_offsets().unwrap(), None);
    }

    #[test]
    fn test_set_then_get() {
        let store = MemoryCheckpointStore::new();
        store.set_offset(0, 5).unwrap();
        store.set_offset(2, 9).unwrap();
        store.set_offset(0, 6).unwrap();

        let snapshot = store.get_offsets().unwrap().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get(0), Some(6));
        assert_eq!(snapshot.get(2), Some(9));
        assert_eq!(store.offset(1), None);
    }

    #[test]
    fn test_seeded_store() {
        let seed: PartitionOffsets = [(4, 40)].into_iter().collect();
        let store = MemoryCheckpointStore::with_offsets(&seed);
        assert_eq!(store.get_offsets().unwrap(), Some(seed));
    }
}
