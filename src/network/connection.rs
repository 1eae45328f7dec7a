//! Connection Handler
//!
//! Handles individual client connections speaking the text protocol.

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use crate::database::Database;
use crate::error::{Result, TideError};
use crate::protocol::Response;

use super::server::ConnectionHandler;

/// Plugs the query protocol into [`super::Server`]
pub struct QueryHandler {
    database: Arc<Database>,
    max_message_size: usize,
}

impl QueryHandler {
    pub fn new(database: Arc<Database>, max_message_size: usize) -> Self {
        Self {
            database,
            max_message_size,
        }
    }
}

impl ConnectionHandler for QueryHandler {
    fn handle(&self, stream: TcpStream) -> Result<()> {
        Connection::new(stream, Arc::clone(&self.database), self.max_message_size)?.handle()
    }
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    database: Arc<Database>,

    /// Longest accepted request line, excluding the newline
    max_message_size: usize,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, database: Arc<Database>, max_message_size: usize) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            database,
            max_message_size,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads one query per line and answers each with one line. Returns
    /// when the client disconnects, goes idle, or sends an oversize line.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let line = match self.read_request() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(TideError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection with {} closed: {}", self.peer_addr, e);
                    return Ok(());
                }
                Err(TideError::Io(ref e))
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    tracing::debug!("Idle timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e @ TideError::Protocol(_)) => {
                    tracing::warn!("Closing {}: {}", self.peer_addr, e);
                    let _ = self.send_response(&Response::error(&e));
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            tracing::trace!("Received query from {}: {:?}", self.peer_addr, line);
            let response = self.database.handle_query(&line);

            if let Err(e) = self.send_response(&response) {
                if let TideError::Io(ref io_err) = e {
                    if is_disconnect(io_err.kind()) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    /// Read one request line; `None` on a clean end of stream
    fn read_request(&mut self) -> Result<Option<String>> {
        let limit = self.max_message_size as u64 + 1;
        let mut buf = Vec::new();
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut buf)?;

        if read == 0 {
            return Ok(None);
        }
        if !buf.ends_with(b"\n") && buf.len() > self.max_message_size {
            return Err(TideError::Protocol(format!(
                "message exceeds {} bytes",
                self.max_message_size
            )));
        }

        let line = String::from_utf8(buf)
            .map_err(|_| TideError::Protocol("query is not valid UTF-8".to_string()))?;
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn send_response(&mut self, response: &Response) -> Result<()> {
        writeln!(self.writer, "{response}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    matches!(
        kind,
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}
