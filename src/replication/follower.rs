//! Follower role
//!
//! Pulls committed batches from the primary on a fixed tick and pushes
//! them, in order, into the feed that the local storage replays. A broken
//! link is dropped and re-established on a later tick; reads keep being
//! served from the last applied state in the meantime.

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;

use crate::config::ReplicationConfig;
use crate::error::{Result, TideError};
use crate::storage::ReplicaFeed;
use crate::wal::Batch;

use super::message::{read_message, write_message, Message, MAX_PAYLOAD_SIZE};

/// Shared view of the sync loop's progress
#[derive(Default)]
struct Progress {
    last_seq: AtomicU64,
    connected: AtomicBool,
    /// The primary reported a head older than our cursor
    diverged: AtomicBool,
}

/// A running follower sync loop
pub struct Follower {
    stop: Sender<()>,
    progress: Arc<Progress>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Follower {
    /// Start syncing from `config.primary_address`
    ///
    /// Returns the follower and the feed to hand to
    /// [`crate::storage::Role::Follower`]. The first sync happens
    /// immediately, then once per `sync_interval`.
    pub fn start(config: &ReplicationConfig) -> Result<(Self, ReplicaFeed)> {
        let max_batches = config.max_batches_per_sync.max(1);
        let (feed_tx, feed_rx) = channel::bounded(max_batches);
        let (stop_tx, stop_rx) = channel::bounded(1);
        let progress = Arc::new(Progress::default());

        let sync = SyncLoop {
            address: config.primary_address.clone(),
            interval: config.sync_interval,
            max_batches,
            link: None,
            feed: feed_tx,
            progress: Arc::clone(&progress),
        };

        let handle = thread::Builder::new()
            .name("tidekv-follower".to_string())
            .spawn(move || sync.run(stop_rx))?;

        Ok((
            Self {
                stop: stop_tx,
                progress,
                handle: Mutex::new(Some(handle)),
            },
            feed_rx,
        ))
    }

    /// Sequence number of the newest batch handed to the feed
    pub fn last_seq(&self) -> u64 {
        self.progress.last_seq.load(Ordering::SeqCst)
    }

    /// Whether the last sync attempt reached the primary
    pub fn is_connected(&self) -> bool {
        self.progress.connected.load(Ordering::SeqCst)
    }

    /// Whether the primary's history ends before this follower's cursor
    ///
    /// Set when the primary lost batches this follower already applied,
    /// e.g. after it restarted on an empty log. Stays set: the primary's
    /// new writes up to the old cursor never reach this follower.
    pub fn is_diverged(&self) -> bool {
        self.progress.diverged.load(Ordering::SeqCst)
    }

    /// Stop syncing; closes the feed
    pub fn shutdown(&self) {
        let _ = self.stop.try_send(());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("Follower sync thread panicked");
            }
        }
    }
}

impl Drop for Follower {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Open connection to the primary
struct Link {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

/// Whether the loop should keep running after a sync round
enum Round {
    Continue,
    FeedClosed,
}

/// Outcome of one sync exchange
enum Pull {
    Received(usize),
    Rejected,
    /// Local storage stopped consuming
    FeedClosed,
}

struct SyncLoop {
    address: String,
    interval: Duration,
    max_batches: usize,
    link: Option<Link>,
    feed: Sender<Batch>,
    progress: Arc<Progress>,
}

impl SyncLoop {
    fn run(mut self, stop: Receiver<()>) {
        tracing::info!(primary = %self.address, interval = ?self.interval, "Follower sync started");
        let ticker = channel::tick(self.interval);

        if let Round::Continue = self.sync_round() {
            loop {
                select! {
                    recv(ticker) -> _ => {
                        if let Round::FeedClosed = self.sync_round() {
                            break;
                        }
                    }
                    recv(stop) -> _ => break,
                }
            }
        }

        // Dropping `self.feed` here closes the replay side
        tracing::info!(
            last_seq = self.progress.last_seq.load(Ordering::SeqCst),
            "Follower sync stopped"
        );
    }

    /// Pull until caught up or the link fails
    fn sync_round(&mut self) -> Round {
        loop {
            match self.pull() {
                Ok(Pull::Received(count)) if count >= self.max_batches => continue,
                Ok(Pull::Received(_)) | Ok(Pull::Rejected) => return Round::Continue,
                Ok(Pull::FeedClosed) => return Round::FeedClosed,
                Err(e) => {
                    if self.link.take().is_some() {
                        tracing::warn!(primary = %self.address, error = %e, "Replication link lost");
                    } else {
                        tracing::debug!(primary = %self.address, error = %e, "Primary unreachable");
                    }
                    self.progress.connected.store(false, Ordering::SeqCst);
                    return Round::Continue;
                }
            }
        }
    }

    /// One request/response exchange
    fn pull(&mut self) -> Result<Pull> {
        let after_seq = self.progress.last_seq.load(Ordering::SeqCst);
        let link = self.link()?;

        write_message(&mut link.writer, &Message::SyncRequest { after_seq })?;
        let response = read_message(&mut link.reader, MAX_PAYLOAD_SIZE)?;

        let (batches, primary_seq) = match response {
            Message::SyncResponse { batches, last_seq } => (batches, last_seq),
            Message::SyncError { message } => {
                tracing::warn!(primary = %self.address, "Primary rejected sync: {}", message);
                return Ok(Pull::Rejected);
            }
            other => {
                return Err(TideError::Protocol(format!(
                    "unexpected message from primary: {other:?}"
                )));
            }
        };

        self.check_divergence(after_seq, primary_seq);

        let received = batches.len();
        for batch in batches {
            let seq = batch.seq;
            if seq <= self.progress.last_seq.load(Ordering::SeqCst) {
                tracing::warn!(seq, after_seq, "Skipping batch the follower already applied");
                continue;
            }
            if self.feed.send(batch).is_err() {
                return Ok(Pull::FeedClosed);
            }
            self.progress.last_seq.store(seq, Ordering::SeqCst);
        }

        if received > 0 {
            tracing::debug!(
                batches = received,
                last_seq = self.progress.last_seq.load(Ordering::SeqCst),
                "Synchronized"
            );
        }
        Ok(Pull::Received(received))
    }

    fn check_divergence(&self, after_seq: u64, primary_seq: u64) {
        if primary_seq >= after_seq {
            return;
        }
        if !self.progress.diverged.swap(true, Ordering::SeqCst) {
            tracing::warn!(
                primary = %self.address,
                primary_seq,
                follower_seq = after_seq,
                "Primary is behind this follower; its writes up to the follower's seq will not be replicated"
            );
        }
    }

    fn link(&mut self) -> Result<&mut Link> {
        if self.link.is_none() {
            let link = self.connect()?;
            tracing::info!(primary = %self.address, "Connected to primary");
            self.progress.connected.store(true, Ordering::SeqCst);
            self.link = Some(link);
        }
        self.link
            .as_mut()
            .ok_or_else(|| TideError::Network("no replication link".to_string()))
    }

    fn connect(&self) -> Result<Link> {
        let addr: SocketAddr = self
            .address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| TideError::Network(format!("cannot resolve {}", self.address)))?;

        let timeout = self.interval.max(Duration::from_millis(100)) * 3;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| TideError::Network(format!("failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        Ok(Link {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }
}
