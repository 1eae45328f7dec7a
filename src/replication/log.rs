//! Replication log
//!
//! The primary's history of committed batches. The WAL worker publishes
//! into it after each durable write; follower connections read from it.
//! Publishing never waits on a follower.
//!
//! Only the newest batches stay in memory. A follower whose cursor falls
//! behind that window is served from the WAL segments on disk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{Result, TideError};
use crate::wal::{list_segments, scan_segment, Batch, CommitListener};

/// Batches kept in memory by default
pub const DEFAULT_RETAINED_BATCHES: usize = 1024;

#[derive(Default)]
struct History {
    recent: VecDeque<Batch>,
    /// Seq of the newest batch dropped from `recent` (0 if none)
    evicted_through: u64,
    last_seq: u64,
}

/// Committed batches ordered by sequence number
pub struct ReplicationLog {
    history: RwLock<History>,
    capacity: usize,
    segments: Option<PathBuf>,
}

impl Default for ReplicationLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationLog {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(History::default()),
            capacity: DEFAULT_RETAINED_BATCHES,
            segments: None,
        }
    }

    /// Keep at most `capacity` batches in memory
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Serve batches older than the in-memory window from the WAL in `dir`
    pub fn with_segments(mut self, dir: impl AsRef<Path>) -> Self {
        self.segments = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Record a committed batch
    ///
    /// Out-of-order or repeated sequence numbers are ignored.
    pub fn publish(&self, batch: &Batch) {
        let mut history = self.history.write();
        if batch.seq <= history.last_seq {
            tracing::warn!(seq = batch.seq, last = history.last_seq, "Ignoring stale committed batch");
            return;
        }

        history.last_seq = batch.seq;
        history.recent.push_back(batch.clone());
        while history.recent.len() > self.capacity {
            if let Some(evicted) = history.recent.pop_front() {
                history.evicted_through = evicted.seq;
            }
        }
    }

    /// Up to `limit` batches with `seq > after_seq`, in order
    ///
    /// Fails when the batches after `after_seq` have left memory and no
    /// segment directory is configured.
    pub fn batches_after(&self, after_seq: u64, limit: usize) -> Result<Vec<Batch>> {
        let upto = {
            let history = self.history.read();
            if after_seq >= history.evicted_through {
                let start = history.recent.partition_point(|batch| batch.seq <= after_seq);
                return Ok(history.recent.range(start..).take(limit).cloned().collect());
            }
            history.last_seq
        };

        match &self.segments {
            Some(dir) => read_segments(dir, after_seq, upto, limit),
            None => Err(TideError::Protocol(format!(
                "batches after {after_seq} are no longer retained"
            ))),
        }
    }

    /// Sequence number of the newest committed batch (0 when empty)
    pub fn last_seq(&self) -> u64 {
        self.history.read().last_seq
    }

    /// Batches held in memory
    pub fn len(&self) -> usize {
        self.history.read().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.read().recent.is_empty()
    }
}

/// Batches in `after_seq < seq <= upto` read back from segment files
fn read_segments(dir: &Path, after_seq: u64, upto: u64, limit: usize) -> Result<Vec<Batch>> {
    let mut found = Vec::new();
    for (id, path) in list_segments(dir)? {
        let scan = scan_segment(&path)?;
        for batch in scan.batches {
            if batch.seq > upto {
                return Ok(found);
            }
            if batch.seq > after_seq {
                found.push(batch);
                if found.len() == limit {
                    return Ok(found);
                }
            }
        }
        tracing::trace!(segment = id, found = found.len(), "Scanned segment for catch-up");
    }
    Ok(found)
}

impl CommitListener for ReplicationLog {
    fn on_commit(&self, batch: &Batch) {
        self.publish(batch);
    }
}
