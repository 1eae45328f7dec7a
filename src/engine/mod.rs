//! Engine Module
//!
//! Partitioned in-memory key/value storage with no knowledge of logging
//! or replication.
//!
//! ## Responsibilities
//! - Upsert, lookup and removal of text keys
//! - Route each key to exactly one partition by a pure hash
//! - Keep operations on different partitions free of mutual interference
//!
//! ## Data Structure Choice
//! A fixed array of `parking_lot::Mutex<HashMap>` shards. The partition
//! count is chosen at construction and never resized, so a key's shard is
//! stable for the process lifetime.

mod partition;

pub use partition::Partition;

use crate::error::{Result, TideError};

/// Default number of partitions
pub const DEFAULT_PARTITIONS: usize = 10;

/// Partitioned in-memory engine
pub struct Engine {
    partitions: Vec<Partition>,
}

impl Engine {
    /// Create an engine with `partition_count` shards
    pub fn new(partition_count: usize) -> Result<Self> {
        if partition_count == 0 {
            return Err(TideError::Config(
                "partition count must be positive".to_string(),
            ));
        }

        let partitions = (0..partition_count).map(|_| Partition::new()).collect();
        Ok(Self { partitions })
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: &str, value: &str) {
        self.partition(key).set(key.to_string(), value.to_string());
    }

    /// Get a value by key
    ///
    /// Only contends with writers of the same partition.
    pub fn get(&self, key: &str) -> Option<String> {
        self.partition(key).get(key)
    }

    /// Remove a key if present
    pub fn delete(&self, key: &str) {
        self.partition(key).delete(key);
    }

    /// Index of the partition that owns `key`
    pub fn partition_for(&self, key: &str) -> usize {
        crc32fast::hash(key.as_bytes()) as usize % self.partitions.len()
    }

    /// Number of partitions
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of live keys across all partitions
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Partition::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Partition::is_empty)
    }

    fn partition(&self, key: &str) -> &Partition {
        &self.partitions[self.partition_for(key)]
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            partitions: (0..DEFAULT_PARTITIONS).map(|_| Partition::new()).collect(),
        }
    }
}
