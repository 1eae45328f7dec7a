//! Primary role
//!
//! Serves committed batches to followers. Each follower connection is a
//! sequence of sync requests answered from the [`ReplicationLog`]; the
//! commit path only appends to that log and never waits on a follower.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::config::ReplicationConfig;
use crate::error::{Result, TideError};
use crate::network::{ConnectionHandler, Server, ShutdownHandle};

use super::log::ReplicationLog;
use super::message::{read_message, write_message, Message, MAX_PAYLOAD_SIZE};

/// Followers served concurrently
pub const MAX_FOLLOWERS: usize = 5;

/// Answers follower sync requests on one connection
pub struct SyncHandler {
    log: Arc<ReplicationLog>,
    max_batches_per_sync: usize,
}

impl SyncHandler {
    pub fn new(log: Arc<ReplicationLog>, max_batches_per_sync: usize) -> Self {
        Self {
            log,
            max_batches_per_sync: max_batches_per_sync.max(1),
        }
    }

    fn respond(&self, request: Message) -> Message {
        match request {
            Message::SyncRequest { after_seq } => {
                match self.log.batches_after(after_seq, self.max_batches_per_sync) {
                    // Head read after the batches so it never trails them
                    Ok(batches) => Message::SyncResponse {
                        batches,
                        last_seq: self.log.last_seq(),
                    },
                    Err(e) => {
                        tracing::warn!(after_seq, error = %e, "Cannot serve sync request");
                        Message::SyncError {
                            message: e.to_string(),
                        }
                    }
                }
            }
            other => Message::SyncError {
                message: format!("unexpected message from follower: {other:?}"),
            },
        }
    }
}

impl ConnectionHandler for SyncHandler {
    fn handle(&self, stream: TcpStream) -> Result<()> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Follower {} connected", peer);

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let request = match read_message(&mut reader, MAX_PAYLOAD_SIZE) {
                Ok(request) => request,
                Err(TideError::Io(e)) => {
                    // Disconnects and idle timeouts end the session quietly
                    tracing::info!("Follower {} disconnected: {}", peer, e);
                    return Ok(());
                }
                Err(e) => {
                    let _ = write_message(
                        &mut writer,
                        &Message::SyncError {
                            message: e.to_string(),
                        },
                    );
                    return Err(e);
                }
            };

            let response = self.respond(request);
            if let Message::SyncResponse { batches, .. } = &response {
                if let Some(last) = batches.last() {
                    tracing::debug!(follower = %peer, batches = batches.len(), last_seq = last.seq, "Serving batches");
                }
            }

            if let Err(e) = write_message(&mut writer, &response) {
                tracing::info!("Follower {} dropped: {}", peer, e);
                return Ok(());
            }
        }
    }
}

/// A running primary replication endpoint
pub struct Primary {
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Primary {
    /// Listen for followers on `config.primary_address`
    pub fn start(config: &ReplicationConfig, log: Arc<ReplicationLog>) -> Result<Self> {
        // Followers that go quiet for three sync intervals are dropped
        let idle_timeout = config.sync_interval * 3;
        let server = Server::bind(&config.primary_address, MAX_FOLLOWERS, idle_timeout)?;
        let local_addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let handler = Arc::new(SyncHandler::new(log, config.max_batches_per_sync));

        let handle = thread::Builder::new()
            .name("tidekv-primary".to_string())
            .spawn(move || {
                if let Err(e) = server.run(handler) {
                    tracing::error!("Replication listener failed: {}", e);
                }
            })?;

        tracing::info!("Primary replication listening on {}", local_addr);
        Ok(Self {
            local_addr,
            shutdown,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting followers and close their links
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Replication listener panicked");
            }
        }
    }
}

impl Drop for Primary {
    fn drop(&mut self) {
        self.shutdown();
    }
}
