//! Shared helpers for WAL tests

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tidekv::protocol::Command;
use tidekv::wal::{Batch, BatchReader, BatchWriter, CommitListener, LogRecord, Wal};
use tidekv::Result;

/// Keeps every written batch in memory; can be switched to failing
#[derive(Clone, Default)]
pub struct MemoryWriter {
    pub batches: Arc<Mutex<Vec<Batch>>>,
    pub fail: Arc<AtomicBool>,
}

impl MemoryWriter {
    pub fn written(&self) -> Vec<Batch> {
        self.batches.lock().clone()
    }
}

impl BatchWriter for MemoryWriter {
    fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk on fire").into());
        }
        self.batches.lock().push(batch.clone());
        Ok(())
    }
}

/// Serves a fixed set of batches
#[derive(Default)]
pub struct MemoryReader {
    pub batches: Vec<Batch>,
}

impl BatchReader for MemoryReader {
    fn read_batches(&mut self) -> Result<Vec<Batch>> {
        Ok(self.batches.clone())
    }
}

/// Records the sequence numbers it is told about
#[derive(Default)]
pub struct SeqListener {
    pub seqs: Mutex<Vec<u64>>,
}

impl CommitListener for SeqListener {
    fn on_commit(&self, batch: &Batch) {
        self.seqs.lock().push(batch.seq);
    }
}

pub fn memory_wal(batch_size: usize, flush_timeout: Duration) -> (Wal, MemoryWriter) {
    let writer = MemoryWriter::default();
    let wal = Wal::new(
        Box::new(writer.clone()),
        Box::new(MemoryReader::default()),
        batch_size,
        flush_timeout,
    );
    (wal, writer)
}

pub fn set(key: &str, value: &str) -> Command {
    Command::Set {
        key: key.to_string(),
        value: value.to_string(),
    }
}

pub fn set_record(tx_id: i64, key: &str, value: &str) -> LogRecord {
    LogRecord::new(tx_id, &set(key, value))
}
