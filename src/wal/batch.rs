//! Batch accumulator
//!
//! The in-progress batch shared between appending callers and the log
//! worker. Every detached batch is stamped with the next sequence number
//! while the lock is held, so the worker can restore hand-off order even
//! though channel sends happen outside the lock.

use super::future::{Failure, Promise};
use super::LogRecord;

/// A record waiting for persistence, paired with its completion promise
pub(crate) struct PendingRecord {
    pub(crate) record: LogRecord,
    pub(crate) promise: Promise,
}

/// A batch detached from the accumulator, ready for the writer
pub(crate) struct DetachedBatch {
    pub(crate) seq: u64,
    pub(crate) records: Vec<PendingRecord>,
}

impl DetachedBatch {
    /// Resolve every record in the batch with the same failure
    pub(crate) fn fail(self, failure: Failure) {
        for pending in self.records {
            pending.promise.fail(failure.clone());
        }
    }
}

pub(crate) struct BatchAccumulator {
    records: Vec<PendingRecord>,
    max_batch_size: usize,
    next_seq: u64,
    /// First sequence number this run will persist
    base_seq: u64,
    closed: bool,
}

impl BatchAccumulator {
    pub(crate) fn new(max_batch_size: usize) -> Self {
        Self {
            records: Vec::with_capacity(max_batch_size),
            max_batch_size,
            next_seq: 1,
            base_seq: 1,
            closed: false,
        }
    }

    /// Add a record; returns the batch if it just became full
    ///
    /// A closed accumulator hands the record back untouched.
    pub(crate) fn push(
        &mut self,
        pending: PendingRecord,
    ) -> std::result::Result<Option<DetachedBatch>, PendingRecord> {
        if self.closed {
            return Err(pending);
        }

        self.records.push(pending);
        if self.records.len() >= self.max_batch_size {
            Ok(self.detach())
        } else {
            Ok(None)
        }
    }

    /// Detach whatever has accumulated, if anything
    pub(crate) fn detach(&mut self) -> Option<DetachedBatch> {
        if self.records.is_empty() {
            return None;
        }

        let records = std::mem::replace(
            &mut self.records,
            Vec::with_capacity(self.max_batch_size),
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(DetachedBatch { seq, records })
    }

    /// Refuse further appends; returns the last partial batch and the
    /// sequence number one past the final detached batch
    pub(crate) fn close(&mut self) -> (Option<DetachedBatch>, u64) {
        let partial = self.detach();
        self.closed = true;
        (partial, self.next_seq)
    }

    /// Continue numbering after a recovered sequence number
    pub(crate) fn resume_after(&mut self, last_seq: u64) {
        self.next_seq = self.next_seq.max(last_seq + 1);
        self.base_seq = self.next_seq;
    }

    pub(crate) fn base_seq(&self) -> u64 {
        self.base_seq
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
