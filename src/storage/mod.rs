//! Storage Module
//!
//! The coordinator that composes the engine, the write-ahead log and, on a
//! follower, the replicated-log feed.
//!
//! ## Responsibilities
//! - Log first, then apply: no mutation reaches the engine before its
//!   record is durable
//! - Reject local mutations on a follower
//! - Replay recovered and replicated records into the engine, in order
//!
//! ## Write Path
//! ```text
//!   set/delete ──► Wal::append ──► LogFuture::wait ──► Engine
//!                                      │
//!                                      └─ failure: engine untouched
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;

use crate::config::ReplicaRole;
use crate::engine::Engine;
use crate::error::{Result, TideError};
use crate::protocol::Command;
use crate::wal::{Batch, LogRecord, Wal};

/// Inbound replicated batches, in primary order
pub type ReplicaFeed = Receiver<Batch>;

/// Role of this instance, decided once at construction
pub enum Role {
    /// Accepts local writes
    Primary,

    /// Read-only; applies batches arriving on `feed`
    Follower { feed: ReplicaFeed },
}

impl Role {
    pub fn kind(&self) -> ReplicaRole {
        match self {
            Role::Primary => ReplicaRole::Primary,
            Role::Follower { .. } => ReplicaRole::Follower,
        }
    }
}

/// Background thread applying the replicated feed
struct ReplayTask {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Storage coordinator
///
/// ## Concurrency:
/// - Reads go straight to the engine and never touch the log
/// - Writes block the calling thread until their batch is persisted
/// - On a follower, exactly one replay thread applies the feed, so two
///   replicated batches are never applied concurrently
pub struct Storage {
    engine: Arc<Engine>,
    wal: Option<Wal>,
    role: ReplicaRole,
    replay: Mutex<Option<ReplayTask>>,
}

impl Storage {
    /// Build the coordinator
    ///
    /// On startup:
    /// 1. Recover every persisted record from the log (if any)
    /// 2. Replay them into the engine in order
    /// 3. Start the log's background writer
    /// 4. On a follower, start applying the replicated feed
    ///
    /// Without a log the storage is engine-only and not durable.
    pub fn new(engine: Arc<Engine>, wal: Option<Wal>, role: Role) -> Result<Self> {
        if matches!(role, Role::Follower { .. }) && wal.is_some() {
            return Err(TideError::Config(
                "a follower applies the primary's log and keeps no local log".to_string(),
            ));
        }

        if let Some(wal) = &wal {
            let records = wal.recover()?;
            if !records.is_empty() {
                tracing::info!(records = records.len(), "Replaying recovered WAL records");
            }
            apply_records(&engine, &records);
            wal.start()?;
        }

        let role_kind = role.kind();
        let replay = match role {
            Role::Primary => None,
            Role::Follower { feed } => Some(spawn_replay(Arc::clone(&engine), feed)?),
        };

        Ok(Self {
            engine,
            wal,
            role: role_kind,
            replay: Mutex::new(replay),
        })
    }

    /// Engine-only storage, used by tests and throwaway instances
    pub fn in_memory(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            wal: None,
            role: ReplicaRole::Primary,
            replay: Mutex::new(None),
        }
    }

    /// Execute a command
    ///
    /// Routes commands to appropriate handlers
    pub fn execute(&self, tx_id: i64, command: &Command) -> Result<Option<String>> {
        match command {
            Command::Get { key } => Ok(self.get(key)),
            Command::Set { key, value } => {
                self.set(tx_id, key, value)?;
                Ok(None)
            }
            Command::Del { key } => {
                self.delete(tx_id, key)?;
                Ok(None)
            }
        }
    }

    /// Insert or overwrite a key
    ///
    /// Steps:
    /// 1. Reject on a follower
    /// 2. Append to the WAL and wait for durability
    /// 3. Apply to the engine
    pub fn set(&self, tx_id: i64, key: &str, value: &str) -> Result<()> {
        self.ensure_writable()?;

        if let Some(wal) = &self.wal {
            wal.set(tx_id, key, value).wait()?;
        }

        self.engine.set(key, value);
        Ok(())
    }

    /// Delete a key
    ///
    /// Same steps as `set`.
    pub fn delete(&self, tx_id: i64, key: &str) -> Result<()> {
        self.ensure_writable()?;

        if let Some(wal) = &self.wal {
            wal.delete(tx_id, key).wait()?;
        }

        self.engine.delete(key);
        Ok(())
    }

    /// Get a value by key; available in every role
    pub fn get(&self, key: &str) -> Option<String> {
        self.engine.get(key)
    }

    /// Flush and stop the log, and stop applying the replicated feed
    pub fn shutdown(&self) {
        if let Some(wal) = &self.wal {
            wal.shutdown();
        }

        if let Some(task) = self.replay.lock().take() {
            let _ = task.stop.try_send(());
            if task.handle.join().is_err() {
                tracing::error!("Replay thread panicked");
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn role(&self) -> ReplicaRole {
        self.role
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Whether mutations are logged before being applied
    pub fn is_durable(&self) -> bool {
        self.wal.is_some()
    }

    fn ensure_writable(&self) -> Result<()> {
        match self.role {
            ReplicaRole::Primary => Ok(()),
            ReplicaRole::Follower => Err(TideError::ReadOnlyReplica),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Replay logged records into the engine, in order
///
/// Records that do not decode into a mutation are skipped with a warning.
pub fn apply_records(engine: &Engine, records: &[LogRecord]) {
    for record in records {
        match record.command() {
            Ok(Command::Set { key, value }) => engine.set(&key, &value),
            Ok(Command::Del { key }) => engine.delete(&key),
            Ok(Command::Get { .. }) => {
                tracing::warn!(tx_id = record.tx_id, "Skipping logged read command");
            }
            Err(e) => {
                tracing::warn!(tx_id = record.tx_id, error = %e, "Skipping undecodable log record");
            }
        }
    }
}

fn spawn_replay(engine: Arc<Engine>, feed: ReplicaFeed) -> Result<ReplayTask> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);

    let handle = thread::Builder::new()
        .name("tidekv-replay".to_string())
        .spawn(move || {
            tracing::debug!("Replica replay started");
            loop {
                select! {
                    recv(feed) -> msg => match msg {
                        Ok(batch) => {
                            tracing::trace!(seq = batch.seq, records = batch.records.len(), "Applying replicated batch");
                            apply_records(&engine, &batch.records);
                        }
                        Err(_) => break,
                    },
                    recv(stop_rx) -> _ => break,
                }
            }
            tracing::debug!("Replica replay stopped");
        })?;

    Ok(ReplayTask {
        stop: stop_tx,
        handle,
    })
}
