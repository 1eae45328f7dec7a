//! TCP Client
//!
//! Blocking request/response client for the text protocol.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, TideError};

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    /// Connect, applying `timeout` to reads and writes
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| TideError::Network(format!("failed to connect: {e}")))?;
        stream.set_nodelay(true)?;
        if !timeout.is_zero() {
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
        }

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    /// Send one query and wait for its response line
    pub fn send(&mut self, query: &str) -> Result<String> {
        let query = query.trim_end_matches(['\r', '\n']);
        writeln!(self.writer, "{query}")?;
        self.writer.flush()?;

        let mut response = String::new();
        if self.reader.read_line(&mut response)? == 0 {
            return Err(TideError::Network("connection was closed".to_string()));
        }
        Ok(response.trim_end_matches(['\r', '\n']).to_string())
    }
}
