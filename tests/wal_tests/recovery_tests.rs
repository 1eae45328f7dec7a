use std::fs::{self, OpenOptions};
use std::io::Write;

use tempfile::TempDir;
use tidekv::wal::{list_segments, Batch, BatchWriter, SegmentWriter, WalRecovery};
use tidekv::TideError;

use crate::common::set_record;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_batches(dir: &TempDir, max_segment_size: u64, count: u64) -> Vec<Batch> {
    let mut writer = SegmentWriter::new(dir.path(), max_segment_size).unwrap();
    let batches: Vec<Batch> = (1..=count)
        .map(|seq| Batch {
            seq,
            records: vec![set_record(seq as i64, &format!("k{seq}"), "v")],
        })
        .collect();
    for batch in &batches {
        writer.write_batch(batch).unwrap();
    }
    batches
}

fn append_bytes(path: &std::path::Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Clean Recovery
// =============================================================================

#[test]
fn test_recover_empty_directory() {
    let dir = TempDir::new().unwrap();
    let (batches, result) = WalRecovery::recover(dir.path()).unwrap();
    assert!(batches.is_empty());
    assert_eq!(result.last_seq, 0);
    assert_eq!(result.segments_scanned, 0);
}

#[test]
fn test_recover_missing_directory() {
    let dir = TempDir::new().unwrap();
    let (batches, _) = WalRecovery::recover(&dir.path().join("nope")).unwrap();
    assert!(batches.is_empty());
}

#[test]
fn test_recover_returns_batches_in_order() {
    let dir = TempDir::new().unwrap();
    let written = write_batches(&dir, 1 << 20, 5);

    let (batches, result) = WalRecovery::recover(dir.path()).unwrap();
    assert_eq!(batches, written);
    assert_eq!(result.batches_recovered, 5);
    assert_eq!(result.records_recovered, 5);
    assert_eq!(result.last_seq, 5);
    assert!(!result.was_truncated);
}

// =============================================================================
// Torn Tail
// =============================================================================

#[test]
fn test_torn_tail_is_truncated() {
    let dir = TempDir::new().unwrap();
    let written = write_batches(&dir, 1 << 20, 3);
    let (_, path) = list_segments(dir.path()).unwrap().pop().unwrap();
    let clean_len = fs::metadata(&path).unwrap().len();

    // Half a header
    append_bytes(&path, &[1, 0, 0, 0, 0, 0, 0]);

    let verified = WalRecovery::verify(dir.path()).unwrap();
    assert!(verified.was_truncated);
    assert_eq!(fs::metadata(&path).unwrap().len(), clean_len + 7);

    let (batches, result) = WalRecovery::recover(dir.path()).unwrap();
    assert_eq!(batches, written);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);

    let (_, again) = WalRecovery::recover(dir.path()).unwrap();
    assert!(!again.was_truncated);
}

#[test]
fn test_torn_frame_body_is_truncated() {
    let dir = TempDir::new().unwrap();
    write_batches(&dir, 1 << 20, 2);
    let (_, path) = list_segments(dir.path()).unwrap().pop().unwrap();

    // Chop the last frame in half
    let len = fs::metadata(&path).unwrap().len();
    OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 5).unwrap();

    let (batches, result) = WalRecovery::recover(dir.path()).unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].seq, 1);
    assert!(result.was_truncated);
}

#[test]
fn test_torn_frame_in_older_segment_is_corruption() {
    let dir = TempDir::new().unwrap();
    write_batches(&dir, 64, 4);
    let segments = list_segments(dir.path()).unwrap();
    assert!(segments.len() >= 2);

    append_bytes(&segments[0].1, &[9, 9, 9]);

    assert!(matches!(
        WalRecovery::recover(dir.path()),
        Err(TideError::WalCorruption(_))
    ));
}

// =============================================================================
// Corruption
// =============================================================================

#[test]
fn test_checksum_mismatch_is_corruption() {
    let dir = TempDir::new().unwrap();
    write_batches(&dir, 1 << 20, 3);
    let (_, path) = list_segments(dir.path()).unwrap().pop().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        WalRecovery::recover(dir.path()),
        Err(TideError::WalCorruption(_))
    ));
}

#[test]
fn test_out_of_order_sequence_is_corruption() {
    let dir = TempDir::new().unwrap();
    let mut writer = SegmentWriter::new(dir.path(), 1 << 20).unwrap();
    for seq in [1, 3, 2] {
        writer
            .write_batch(&Batch { seq, records: vec![set_record(seq as i64, "k", "v")] })
            .unwrap();
    }

    assert!(matches!(
        WalRecovery::recover(dir.path()),
        Err(TideError::WalCorruption(_))
    ));
}
