//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop, polled for shutdown
//! - One thread per connection, bounded by a counting semaphore
//! - Pluggable [`ConnectionHandler`]: the query protocol and the
//!   primary's replication endpoint share the same server

mod client;
mod connection;
mod semaphore;
mod server;

pub use client::Client;
pub use connection::{Connection, QueryHandler};
pub use semaphore::{Permit, Semaphore};
pub use server::{ConnectionHandler, Server, ShutdownHandle};
