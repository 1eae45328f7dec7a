//! Tests for the write-ahead log
//!
//! These tests verify:
//! - Size- and timeout-triggered batching
//! - Ordering of persisted batches under concurrent appends
//! - Failure propagation to every waiter of a batch
//! - Shutdown semantics (final flush, closed log)
//! - Segment rollover and recovery across segments
//! - Torn-tail truncation and corruption detection

mod common;

mod recovery_tests;
