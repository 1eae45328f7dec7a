//! Tests for Storage
//!
//! These tests verify:
//! - Set/get/delete through the log
//! - No mutation reaches the engine when logging fails
//! - Followers reject local writes and apply the replicated feed
//! - State survives a restart through log replay

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel;
use tempfile::TempDir;
use tidekv::config::{ReplicaRole, WalConfig};
use tidekv::protocol::Command;
use tidekv::storage::Role;
use tidekv::wal::{Batch, BatchReader, BatchWriter, LogRecord, Wal};
use tidekv::{Engine, Result, Storage, TideError};

// =============================================================================
// Helper Functions
// =============================================================================

struct BrokenDisk;

impl BatchWriter for BrokenDisk {
    fn write_batch(&mut self, _batch: &Batch) -> Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "no space left on device").into())
    }
}

struct EmptyLog;

impl BatchReader for EmptyLog {
    fn read_batches(&mut self) -> Result<Vec<Batch>> {
        Ok(Vec::new())
    }
}

fn wal_config(dir: &TempDir) -> WalConfig {
    WalConfig {
        flush_batch_size: 4,
        flush_timeout: Duration::from_millis(2),
        max_segment_size: 4096,
        data_dir: dir.path().to_path_buf(),
    }
}

fn open_durable(dir: &TempDir) -> Storage {
    let engine = Arc::new(Engine::new(4).unwrap());
    let wal = Wal::open(&wal_config(dir)).unwrap();
    Storage::new(engine, Some(wal), Role::Primary).unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

fn set_record(tx_id: i64, key: &str, value: &str) -> LogRecord {
    LogRecord::new(
        tx_id,
        &Command::Set {
            key: key.to_string(),
            value: value.to_string(),
        },
    )
}

// =============================================================================
// Primary
// =============================================================================

#[test]
fn test_set_then_get() {
    let dir = TempDir::new().unwrap();
    let storage = open_durable(&dir);

    storage.set(1, "a", "1").unwrap();
    assert_eq!(storage.get("a"), Some("1".to_string()));
    assert!(storage.is_durable());
    assert_eq!(storage.role(), ReplicaRole::Primary);
}

#[test]
fn test_delete_then_get() {
    let dir = TempDir::new().unwrap();
    let storage = open_durable(&dir);

    storage.set(1, "a", "1").unwrap();
    storage.delete(2, "a").unwrap();
    assert_eq!(storage.get("a"), None);
}

#[test]
fn test_execute_routes_commands() {
    let storage = Storage::in_memory(Arc::new(Engine::default()));

    let set = Command::Set { key: "k".into(), value: "v".into() };
    assert_eq!(storage.execute(1, &set).unwrap(), None);
    assert_eq!(
        storage.execute(2, &Command::Get { key: "k".into() }).unwrap(),
        Some("v".to_string())
    );
    assert_eq!(storage.execute(3, &Command::Del { key: "k".into() }).unwrap(), None);
    assert_eq!(storage.execute(4, &Command::Get { key: "k".into() }).unwrap(), None);
    assert!(!storage.is_durable());
}

#[test]
fn test_failed_log_write_leaves_engine_untouched() {
    let engine = Arc::new(Engine::new(2).unwrap());
    let wal = Wal::new(Box::new(BrokenDisk), Box::new(EmptyLog), 1, Duration::from_millis(5));
    let storage = Storage::new(Arc::clone(&engine), Some(wal), Role::Primary).unwrap();

    assert!(matches!(storage.set(1, "a", "1"), Err(TideError::Durability(_))));
    assert_eq!(engine.get("a"), None);

    engine.set("b", "2");
    assert!(storage.delete(2, "b").is_err());
    assert_eq!(engine.get("b"), Some("2".to_string()));
}

#[test]
fn test_concurrent_writers_share_batches() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(open_durable(&dir));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..50 {
                    storage.set(t * 100 + i, &format!("t{t}:{i}"), "v").unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(storage.engine().len(), 200);
}

#[test]
fn test_writes_after_shutdown_fail() {
    let dir = TempDir::new().unwrap();
    let storage = open_durable(&dir);
    storage.shutdown();

    assert!(matches!(storage.set(1, "a", "1"), Err(TideError::WalClosed)));
    assert_eq!(storage.get("a"), None);
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_state_survives_restart() {
    let dir = TempDir::new().unwrap();

    {
        let storage = open_durable(&dir);
        storage.set(1, "a", "1").unwrap();
        storage.set(2, "b", "2").unwrap();
        storage.set(3, "a", "3").unwrap();
        storage.delete(4, "b").unwrap();
    }

    let storage = open_durable(&dir);
    assert_eq!(storage.get("a"), Some("3".to_string()));
    assert_eq!(storage.get("b"), None);
}

#[test]
fn test_repeated_recovery_is_idempotent() {
    let dir = TempDir::new().unwrap();

    {
        let storage = open_durable(&dir);
        for i in 0..10 {
            storage.set(i, &format!("k{i}"), &i.to_string()).unwrap();
        }
    }

    for _ in 0..3 {
        let storage = open_durable(&dir);
        assert_eq!(storage.engine().len(), 10);
        assert_eq!(storage.get("k7"), Some("7".to_string()));
    }
}

#[test]
fn test_corrupt_log_fails_startup() {
    let dir = TempDir::new().unwrap();
    {
        let storage = open_durable(&dir);
        storage.set(1, "a", "1").unwrap();
    }

    let (_, path) = tidekv::wal::list_segments(dir.path()).unwrap().pop().unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    std::fs::write(&path, bytes).unwrap();

    let engine = Arc::new(Engine::default());
    let wal = Wal::open(&wal_config(&dir)).unwrap();
    assert!(matches!(
        Storage::new(engine, Some(wal), Role::Primary),
        Err(TideError::WalCorruption(_))
    ));
}

// =============================================================================
// Follower
// =============================================================================

#[test]
fn test_follower_rejects_local_writes() {
    let (_feed_tx, feed) = channel::unbounded();
    let engine = Arc::new(Engine::default());
    let storage = Storage::new(Arc::clone(&engine), None, Role::Follower { feed }).unwrap();

    assert_eq!(storage.role(), ReplicaRole::Follower);
    assert!(matches!(storage.set(1, "a", "1"), Err(TideError::ReadOnlyReplica)));
    assert!(matches!(storage.delete(2, "a"), Err(TideError::ReadOnlyReplica)));
    assert!(engine.is_empty());
}

#[test]
fn test_follower_applies_feed_in_order() {
    let (feed_tx, feed) = channel::unbounded();
    let storage = Storage::new(Arc::new(Engine::default()), None, Role::Follower { feed }).unwrap();

    feed_tx
        .send(Batch { seq: 1, records: vec![set_record(1, "a", "1"), set_record(2, "b", "2")] })
        .unwrap();
    feed_tx.send(Batch { seq: 2, records: vec![set_record(3, "a", "3")] }).unwrap();

    assert!(wait_until(Duration::from_secs(2), || {
        storage.get("a") == Some("3".to_string()) && storage.get("b") == Some("2".to_string())
    }));
}

#[test]
fn test_follower_with_local_log_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (_feed_tx, feed) = channel::unbounded();
    let wal = Wal::open(&wal_config(&dir)).unwrap();

    assert!(matches!(
        Storage::new(Arc::new(Engine::default()), Some(wal), Role::Follower { feed }),
        Err(TideError::Config(_))
    ));
}

#[test]
fn test_follower_shutdown_stops_replay() {
    let (feed_tx, feed) = channel::unbounded();
    let storage = Storage::new(Arc::new(Engine::default()), None, Role::Follower { feed }).unwrap();
    storage.shutdown();

    // The replay thread owned the receiver
    assert!(feed_tx.send(Batch { seq: 1, records: Vec::new() }).is_err());
}
