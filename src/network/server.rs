//! TCP Server
//!
//! Accepts connections and hands each one to a handler on its own thread.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, TideError};

use super::semaphore::{Permit, Semaphore};

/// How often the acceptor checks the shutdown flag while idle
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Serves one accepted connection until it closes
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, stream: TcpStream) -> Result<()>;
}

/// Cloneable handle that stops a running server
#[derive(Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// TCP server for TideKV
///
/// ## Threading
/// - One acceptor loop (the caller of `run`)
/// - One thread per connection, at most `max_connections` active; the
///   acceptor takes a permit before accepting, so extra connections wait
///   in the listen backlog instead of holding a thread
/// - Stopping the server closes every connection it still serves
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: Arc<Semaphore>,
    live: Arc<Mutex<HashMap<u64, TcpStream>>>,
    idle_timeout: Duration,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Bind the listener
    pub fn bind(addr: &str, max_connections: usize, idle_timeout: Duration) -> Result<Self> {
        if max_connections == 0 {
            return Err(TideError::Config(
                "invalid number of max connections".to_string(),
            ));
        }

        let listener = TcpListener::bind(addr)
            .map_err(|e| TideError::Network(format!("failed to listen on {addr}: {e}")))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            connections: Semaphore::new(max_connections),
            live: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            shutdown: ShutdownHandle::default(),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Connections currently being served
    pub fn active_connections(&self) -> usize {
        self.live.lock().len()
    }

    /// Accept connections until shutdown is requested (blocking)
    pub fn run<H: ConnectionHandler>(&self, handler: Arc<H>) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr);

        let mut permit: Option<Permit> = None;
        let mut next_id = 0u64;

        while !self.shutdown.is_shutdown() {
            if permit.is_none() {
                permit = self.connections.acquire_timeout(ACCEPT_POLL_INTERVAL);
                if permit.is_none() {
                    continue;
                }
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    next_id += 1;
                    if let Some(held) = permit.take() {
                        if let Err(e) = self.dispatch(next_id, stream, held, Arc::clone(&handler)) {
                            tracing::warn!("Failed to start connection from {}: {}", peer, e);
                        }
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::error!("Failed to accept: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        self.close_live();
        tracing::info!("Listener on {} closed", self.local_addr);
        Ok(())
    }

    fn dispatch<H: ConnectionHandler>(
        &self,
        id: u64,
        stream: TcpStream,
        permit: Permit,
        handler: Arc<H>,
    ) -> Result<()> {
        stream.set_nonblocking(false)?;
        if !self.idle_timeout.is_zero() {
            stream.set_read_timeout(Some(self.idle_timeout))?;
            stream.set_write_timeout(Some(self.idle_timeout))?;
        }

        self.live.lock().insert(id, stream.try_clone()?);
        let live = Arc::clone(&self.live);
        let spawned = thread::Builder::new()
            .name("tidekv-conn".to_string())
            .spawn(move || {
                let _permit = permit;
                if let Err(e) = handler.handle(stream) {
                    tracing::warn!("Connection ended with error: {}", e);
                }
                live.lock().remove(&id);
            });

        if let Err(e) = spawned {
            self.live.lock().remove(&id);
            return Err(e.into());
        }
        Ok(())
    }

    /// Unblock every handler still reading from a client
    fn close_live(&self) {
        let live: Vec<TcpStream> = self.live.lock().drain().map(|(_, stream)| stream).collect();
        if !live.is_empty() {
            tracing::debug!("Closing {} open connections", live.len());
        }
        for stream in live {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
