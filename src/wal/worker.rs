//! Log worker
//!
//! The single thread that owns all persistence I/O. It races three
//! triggers: a full batch handed off by an appender, the shutdown signal,
//! and the flush deadline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};
use crossbeam::select;
use parking_lot::Mutex;

use super::batch::{BatchAccumulator, DetachedBatch};
use super::future::Failure;
use super::{Batch, BatchWriter, CommitListener};

pub(crate) struct Worker {
    pub(crate) writer: Box<dyn BatchWriter>,
    pub(crate) accumulator: Arc<Mutex<BatchAccumulator>>,
    pub(crate) batches: Receiver<DetachedBatch>,
    pub(crate) shutdown: Receiver<()>,
    pub(crate) listener: Option<Arc<dyn CommitListener>>,
    pub(crate) flush_timeout: Duration,

    /// Next sequence number to persist
    pub(crate) next_seq: u64,

    /// Batches that arrived ahead of an earlier one still in flight
    pub(crate) parked: BTreeMap<u64, DetachedBatch>,
}

impl Worker {
    pub(crate) fn run(mut self) {
        tracing::debug!(next_seq = self.next_seq, "WAL worker started");
        let batches = self.batches.clone();
        let shutdown = self.shutdown.clone();
        let mut deadline = Instant::now() + self.flush_timeout;

        loop {
            select! {
                recv(batches) -> msg => match msg {
                    Ok(batch) => {
                        if self.submit(batch) {
                            deadline = Instant::now() + self.flush_timeout;
                        }
                    }
                    // Every sender is gone: the log itself was dropped
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
                recv(channel::at(deadline)) -> _ => {
                    let partial = self.accumulator.lock().detach();
                    if let Some(batch) = partial {
                        self.submit(batch);
                    }
                    deadline = Instant::now() + self.flush_timeout;
                }
            }
        }

        self.finish();
        tracing::debug!("WAL worker stopped");
    }

    /// Final flush: close the accumulator, persist its partial batch and
    /// wait for every batch detached before the close
    pub(crate) fn finish(&mut self) {
        let (partial, end_seq) = self.accumulator.lock().close();
        if let Some(batch) = partial {
            self.submit(batch);
        }

        while self.next_seq < end_seq {
            match self.batches.recv() {
                Ok(batch) => {
                    self.submit(batch);
                }
                Err(_) => break,
            }
        }

        for (_, batch) in std::mem::take(&mut self.parked) {
            batch.fail(Failure::Durability("log stopped before batch arrived".to_string()));
        }
    }

    /// Persist `batch` and any parked batches it unblocks, in sequence
    /// order; returns whether anything was written
    fn submit(&mut self, batch: DetachedBatch) -> bool {
        self.parked.insert(batch.seq, batch);

        let mut wrote = false;
        while let Some(batch) = self.parked.remove(&self.next_seq) {
            self.persist(batch);
            self.next_seq += 1;
            wrote = true;
        }
        wrote
    }

    fn persist(&mut self, detached: DetachedBatch) {
        let seq = detached.seq;
        let (records, promises): (Vec<_>, Vec<_>) = detached
            .records
            .into_iter()
            .map(|pending| (pending.record, pending.promise))
            .unzip();
        let batch = Batch { seq, records };

        match self.writer.write_batch(&batch) {
            Ok(()) => {
                tracing::trace!(seq, records = batch.records.len(), "Persisted batch");
                // Publish before resolving so an acknowledged write is
                // already visible to replication
                if let Some(listener) = &self.listener {
                    listener.on_commit(&batch);
                }
                for promise in promises {
                    promise.succeed();
                }
            }
            Err(e) => {
                tracing::error!(seq, records = batch.records.len(), error = %e, "Failed to persist batch");
                let failure = Failure::Durability(e.to_string());
                for promise in promises {
                    promise.fail(failure.clone());
                }
            }
        }
    }
}
