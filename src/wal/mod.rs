//! Write-Ahead Log (WAL) Module
//!
//! Turns a stream of mutation requests into durable, ordered batches and
//! reports completion back to callers.
//!
//! ## Responsibilities
//! - Accumulate records into a shared in-progress batch (non-blocking append)
//! - Hand full batches to a single background writer
//! - Flush partial batches after the flush timeout
//! - Recover all persisted batches, in order, across segments
//!
//! ## File Format
//! ```text
//! segment_000001.wal, segment_000002.wal, ...
//! ┌─────────────────────────────────────────┐
//! │ Batch 1                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Batch 2                                 │
//! │ ┌─────────┬─────────┬────────┬────────┐ │
//! │ │ Seq (8) │ CRC (4) │Len (4) │ Data   │ │
//! │ └─────────┴─────────┴────────┴────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//! `Data` is the bincode encoding of the batch's records.

mod batch;
mod entry;
mod future;
mod reader;
mod recovery;
mod segment;
mod worker;
mod writer;

pub use entry::{decode_frame, encode_frame, Batch, FrameDecode, LogRecord, HEADER_SIZE};
pub use future::LogFuture;
pub use reader::{scan_segment, BatchReader, SegmentReader, SegmentScan};
pub use recovery::{RecoveryResult, WalRecovery};
pub use segment::{list_segments, parse_segment_id, segment_path};
pub use writer::{BatchWriter, SegmentWriter};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::WalConfig;
use crate::error::Result;
use crate::protocol::Command;

use batch::{BatchAccumulator, DetachedBatch, PendingRecord};
use future::Failure;
use worker::Worker;

/// Observer of durable batches
///
/// Invoked from the log worker thread for every batch once it is
/// persisted, and for every batch returned by recovery. Implementations
/// must not block.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, batch: &Batch);
}

/// Worker state before `start`
struct IdleParts {
    writer: Box<dyn BatchWriter>,
    batches: Receiver<DetachedBatch>,
    shutdown: Receiver<()>,
}

enum Lifecycle {
    Idle(IdleParts),
    Running(JoinHandle<()>),
    Stopped,
}

/// The write-ahead log
///
/// ## Concurrency Model: many appenders / one writer
///
/// - `append` takes the accumulator lock for an O(1) push and never waits
///   on I/O. A batch that fills up is stamped with a sequence number under
///   the lock and sent to the worker through a capacity-1 channel.
/// - The worker is the only thread that touches the segment files, and it
///   persists batches strictly in sequence order.
pub struct Wal {
    accumulator: Arc<Mutex<BatchAccumulator>>,
    batches: Sender<DetachedBatch>,
    shutdown: Sender<()>,
    reader: Mutex<Box<dyn BatchReader>>,
    listener: Option<Arc<dyn CommitListener>>,
    flush_timeout: Duration,
    lifecycle: Mutex<Lifecycle>,
}

impl Wal {
    /// Build a log over arbitrary persistence backends
    pub fn new(
        writer: Box<dyn BatchWriter>,
        reader: Box<dyn BatchReader>,
        flush_batch_size: usize,
        flush_timeout: Duration,
    ) -> Self {
        let (batch_tx, batch_rx) = channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        Self {
            accumulator: Arc::new(Mutex::new(BatchAccumulator::new(flush_batch_size.max(1)))),
            batches: batch_tx,
            shutdown: shutdown_tx,
            reader: Mutex::new(reader),
            listener: None,
            flush_timeout,
            lifecycle: Mutex::new(Lifecycle::Idle(IdleParts {
                writer,
                batches: batch_rx,
                shutdown: shutdown_rx,
            })),
        }
    }

    /// Open a segment-file log described by `config`
    pub fn open(config: &WalConfig) -> Result<Self> {
        let writer = SegmentWriter::new(&config.data_dir, config.max_segment_size)?;
        let reader = SegmentReader::new(&config.data_dir);
        Ok(Self::new(
            Box::new(writer),
            Box::new(reader),
            config.flush_batch_size,
            config.flush_timeout,
        ))
    }

    /// Register the observer of durable batches (before `recover`)
    pub fn with_commit_listener(mut self, listener: Arc<dyn CommitListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Read every persisted record in original append order
    ///
    /// Call once at startup, before `start` and before any `append`, so
    /// new batches continue the recovered sequence.
    pub fn recover(&self) -> Result<Vec<LogRecord>> {
        let batches = self.reader.lock().read_batches()?;

        if let Some(last) = batches.last() {
            self.accumulator.lock().resume_after(last.seq);
        }
        if let Some(listener) = &self.listener {
            for batch in &batches {
                listener.on_commit(batch);
            }
        }

        Ok(batches.into_iter().flat_map(|batch| batch.records).collect())
    }

    /// Spawn the background writer; a second call is a no-op
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        let parts = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(parts) => parts,
            other => {
                *lifecycle = other;
                tracing::warn!("WAL worker already started");
                return Ok(());
            }
        };

        let worker = self.worker(parts);
        let handle = thread::Builder::new()
            .name("tidekv-wal".to_string())
            .spawn(move || worker.run())?;
        *lifecycle = Lifecycle::Running(handle);
        Ok(())
    }

    /// Append a command; returns its completion handle immediately
    pub fn append(&self, tx_id: i64, command: &Command) -> LogFuture {
        let (promise, future) = future::pair();
        let pending = PendingRecord {
            record: LogRecord::new(tx_id, command),
            promise,
        };

        let full = match self.accumulator.lock().push(pending) {
            Ok(full) => full,
            Err(rejected) => {
                rejected.promise.fail(Failure::Closed);
                return future;
            }
        };

        if let Some(batch) = full {
            if let Err(channel::SendError(batch)) = self.batches.send(batch) {
                batch.fail(Failure::Durability("log worker is not running".to_string()));
            }
        }
        future
    }

    /// Log `Set(key, value)`
    pub fn set(&self, tx_id: i64, key: &str, value: &str) -> LogFuture {
        self.append(
            tx_id,
            &Command::Set {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    /// Log `Del(key)`
    pub fn delete(&self, tx_id: i64, key: &str) -> LogFuture {
        self.append(tx_id, &Command::Del { key: key.to_string() })
    }

    /// Stop the worker after one final flush and wait for it
    ///
    /// Every record appended before this call is resolved by the time it
    /// returns; later appends fail with [`crate::TideError::WalClosed`].
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(handle) => {
                let _ = self.shutdown.try_send(());
                if handle.join().is_err() {
                    tracing::error!("WAL worker panicked");
                }
            }
            // Never started: flush on the caller's thread
            Lifecycle::Idle(parts) => self.worker(parts).finish(),
            Lifecycle::Stopped => {}
        }
    }

    /// Records waiting in the in-progress batch
    pub fn pending_records(&self) -> usize {
        self.accumulator.lock().len()
    }

    /// Sequence number the next detached batch will carry
    pub fn next_seq(&self) -> u64 {
        self.accumulator.lock().next_seq()
    }

    fn worker(&self, parts: IdleParts) -> Worker {
        let next_seq = self.accumulator.lock().base_seq();
        Worker {
            writer: parts.writer,
            accumulator: Arc::clone(&self.accumulator),
            batches: parts.batches,
            shutdown: parts.shutdown,
            listener: self.listener.clone(),
            flush_timeout: self.flush_timeout,
            next_seq,
            parked: BTreeMap::new(),
        }
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Wal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wal")
            .field("flush_timeout", &self.flush_timeout)
            .field("pending_records", &self.pending_records())
            .finish()
    }
}
