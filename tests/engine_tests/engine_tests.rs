//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/set/delete operations
//! - Key routing across partitions
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use tidekv::engine::{Engine, DEFAULT_PARTITIONS};
use tidekv::TideError;

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_set_get_delete() {
    let engine = Engine::default();

    assert_eq!(engine.get("name"), None);
    engine.set("name", "tide");
    assert_eq!(engine.get("name"), Some("tide".to_string()));

    engine.set("name", "flood");
    assert_eq!(engine.get("name"), Some("flood".to_string()));

    engine.delete("name");
    assert_eq!(engine.get("name"), None);
}

#[test]
fn test_delete_absent_key_is_noop() {
    let engine = Engine::new(3).unwrap();
    engine.delete("ghost");
    assert!(engine.is_empty());
}

#[test]
fn test_len_counts_all_partitions() {
    let engine = Engine::new(4).unwrap();
    for i in 0..100 {
        engine.set(&format!("key{i}"), "v");
    }
    assert_eq!(engine.len(), 100);
}

// =============================================================================
// Partitioning
// =============================================================================

#[test]
fn test_default_partition_count() {
    assert_eq!(Engine::default().partition_count(), DEFAULT_PARTITIONS);
}

#[test]
fn test_zero_partitions_rejected() {
    assert!(matches!(Engine::new(0), Err(TideError::Config(_))));
}

#[test]
fn test_routing_is_stable_and_in_range() {
    let a = Engine::new(7).unwrap();
    let b = Engine::new(7).unwrap();

    for i in 0..500 {
        let key = format!("user:{i}");
        let index = a.partition_for(&key);
        assert!(index < 7);
        assert_eq!(index, b.partition_for(&key));
    }
}

#[test]
fn test_keys_spread_over_partitions() {
    let engine = Engine::new(10).unwrap();
    let mut used = std::collections::HashSet::new();
    for i in 0..1000 {
        used.insert(engine.partition_for(&format!("key{i}")));
    }
    assert!(used.len() > 5);
}

#[test]
fn test_single_partition_engine() {
    let engine = Engine::new(1).unwrap();
    engine.set("a", "1");
    engine.set("b", "2");
    assert_eq!(engine.partition_for("a"), 0);
    assert_eq!(engine.partition_for("b"), 0);
    assert_eq!(engine.len(), 2);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_writers_on_disjoint_keys() {
    let engine = Arc::new(Engine::new(8).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..200 {
                    engine.set(&format!("t{t}:k{i}"), &i.to_string());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len(), 1600);
    assert_eq!(engine.get("t3:k199"), Some("199".to_string()));
}

#[test]
fn test_concurrent_readers_and_writer() {
    let engine = Arc::new(Engine::new(4).unwrap());
    engine.set("shared", "0");

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 1..=500 {
                engine.set("shared", &i.to_string());
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..500 {
                    let value: u32 = engine.get("shared").unwrap().parse().unwrap();
                    assert!(value <= 500);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.get("shared"), Some("500".to_string()));
}
