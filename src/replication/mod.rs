//! Replication Module
//!
//! Pull-based primary/follower replication of committed batches.
//!
//! ## Flow
//! ```text
//! primary:  WAL worker ──on_commit──▶ ReplicationLog ◀── SyncHandler ◀─┐
//!                                                                      │ SyncRequest{after_seq}
//! follower: Storage replay ◀── feed ◀── Follower sync loop ────────────┘
//! ```
//!
//! A follower keeps no log of its own and starts every run from
//! sequence 0. Batches arrive in commit order and are applied in that
//! order by a single replay thread.

mod follower;
mod log;
mod message;
mod primary;

pub use follower::Follower;
pub use log::{ReplicationLog, DEFAULT_RETAINED_BATCHES};
pub use message::{
    encode_message, read_message, write_message, Message, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
pub use primary::{Primary, SyncHandler, MAX_FOLLOWERS};
