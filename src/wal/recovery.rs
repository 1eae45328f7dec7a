//! WAL Recovery
//!
//! Rebuilds the single ordered batch stream from all segments.

use std::fs::OpenOptions;
use std::path::Path;

use crate::error::{Result, TideError};

use super::reader::scan_segment;
use super::segment::list_segments;
use super::Batch;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of segment files read
    pub segments_scanned: u64,

    /// Number of batches recovered
    pub batches_recovered: u64,

    /// Number of records across those batches
    pub records_recovered: u64,

    /// Sequence number of the last batch (0 when empty)
    pub last_seq: u64,

    /// Whether a torn tail was found (and, for `recover`, removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover all batches from a WAL directory
    ///
    /// This will:
    /// 1. Read segments in id order as one logical stream
    /// 2. Fail on checksum errors or out-of-order sequence numbers
    /// 3. Truncate a partial frame at the end of the newest segment
    /// 4. Return all batches in order
    pub fn recover(dir: &Path) -> Result<(Vec<Batch>, RecoveryResult)> {
        Self::scan(dir, true)
    }

    /// Verify integrity of a WAL directory without modifying it
    pub fn verify(dir: &Path) -> Result<RecoveryResult> {
        Self::scan(dir, false).map(|(_, result)| result)
    }

    fn scan(dir: &Path, repair: bool) -> Result<(Vec<Batch>, RecoveryResult)> {
        let segments = list_segments(dir)?;
        let mut result = RecoveryResult::default();
        let mut batches: Vec<Batch> = Vec::new();

        for (index, (id, path)) in segments.iter().enumerate() {
            let scan = scan_segment(path)
                .map_err(|e| TideError::WalCorruption(format!("segment {id}: {e}")))?;
            result.segments_scanned += 1;

            if scan.is_torn() {
                let is_last = index + 1 == segments.len();
                if !is_last {
                    return Err(TideError::WalCorruption(format!(
                        "segment {id} ends in a partial frame but is not the newest segment"
                    )));
                }

                tracing::warn!(
                    segment = id,
                    valid_len = scan.valid_len,
                    file_len = scan.file_len,
                    "Dropping torn WAL tail"
                );
                result.was_truncated = true;

                if repair {
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(scan.valid_len)?;
                    file.sync_all()?;
                }
            }

            for batch in scan.batches {
                if batch.seq <= result.last_seq {
                    return Err(TideError::WalCorruption(format!(
                        "segment {id}: batch {} follows batch {}",
                        batch.seq, result.last_seq
                    )));
                }
                result.last_seq = batch.seq;
                result.batches_recovered += 1;
                result.records_recovered += batch.records.len() as u64;
                batches.push(batch);
            }
        }

        Ok((batches, result))
    }
}
