//! # TideKV
//!
//! A partitioned in-memory key-value store with:
//! - Group-committed Write-Ahead Log (WAL) for durability
//! - Crash recovery with torn-tail truncation
//! - Hash-partitioned engine, one lock per partition
//! - Pull-based primary/follower replication
//! - TCP line protocol (`SET`, `GET`, `DEL`)
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │                  (Multiple Clients)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                 Database / Storage                          │
//! │        (log first, then apply; followers read-only)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │   Engine    │
//!   │  (Batched)  │          │ (Partitions)│
//!   └──────┬──────┘          └─────────────┘
//!          │ on_commit
//!          ▼
//!   ┌─────────────┐
//!   │ Replication │ ◀──── followers pull
//!   │     Log     │
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod wal;
pub mod engine;
pub mod storage;
pub mod database;
pub mod network;
pub mod protocol;
pub mod replication;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, TideError};
pub use config::Config;
pub use database::Database;
pub use engine::Engine;
pub use storage::Storage;
pub use wal::Wal;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of TideKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
