//! WAL Reader
//!
//! Reads batch frames back out of segment files.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

use super::entry::{decode_frame, FrameDecode};
use super::recovery::WalRecovery;
use super::Batch;

/// Source of previously persisted batches, in append order
pub trait BatchReader: Send {
    fn read_batches(&mut self) -> Result<Vec<Batch>>;
}

/// Result of scanning one segment file
#[derive(Debug)]
pub struct SegmentScan {
    /// Whole frames, in file order
    pub batches: Vec<Batch>,

    /// Byte length covered by whole frames
    pub valid_len: u64,

    /// Total file length on disk
    pub file_len: u64,
}

impl SegmentScan {
    /// Whether the file ends in a partial frame
    pub fn is_torn(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Read every whole frame of a segment
///
/// Checksum failures are errors; a trailing partial frame is reported
/// through [`SegmentScan::is_torn`] so the caller can decide.
pub fn scan_segment(path: &Path) -> Result<SegmentScan> {
    let bytes = fs::read(path)?;
    let mut batches = Vec::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match decode_frame(&bytes[offset..])? {
            FrameDecode::Complete(batch, consumed) => {
                batches.push(batch);
                offset += consumed;
            }
            FrameDecode::Incomplete => break,
        }
    }

    Ok(SegmentScan {
        batches,
        valid_len: offset as u64,
        file_len: bytes.len() as u64,
    })
}

/// Reads all segments of a WAL directory through [`WalRecovery`]
pub struct SegmentReader {
    dir: PathBuf,
}

impl SegmentReader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BatchReader for SegmentReader {
    fn read_batches(&mut self) -> Result<Vec<Batch>> {
        let (batches, result) = WalRecovery::recover(&self.dir)?;
        tracing::info!(
            segments = result.segments_scanned,
            batches = result.batches_recovered,
            records = result.records_recovered,
            last_seq = result.last_seq,
            truncated = result.was_truncated,
            "WAL recovery finished"
        );
        Ok(batches)
    }
}
