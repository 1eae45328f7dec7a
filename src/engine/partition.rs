//! Partition implementation
//!
//! One shard of the key space: a HashMap behind its own exclusive lock.

use std::collections::HashMap;

use parking_lot::Mutex;

/// A single independently locked shard
pub struct Partition {
    data: Mutex<HashMap<String, String>>,
}

impl Partition {
    /// Create a new empty partition
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.data.lock().get(key).cloned()
    }

    /// Insert or overwrite a key
    pub fn set(&self, key: String, value: String) {
        self.data.lock().insert(key, value);
    }

    /// Remove a key; absent keys are ignored
    pub fn delete(&self, key: &str) {
        self.data.lock().remove(key);
    }

    /// Number of keys held by this partition
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hold the partition lock (used to simulate a stalled writer)
    #[cfg(test)]
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, HashMap<String, String>> {
        self.data.lock()
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}
