//! WAL Entry definitions
//!
//! Defines log records, batches and the on-disk frame that carries one
//! batch.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TideError};
use crate::protocol::{Command, CommandKind};

/// Frame header: seq (8) + crc (4) + len (4)
pub const HEADER_SIZE: usize = 16;

/// Largest payload a frame may declare (64 MB)
pub const MAX_FRAME_PAYLOAD: u32 = 64 * 1024 * 1024;

/// A single logged mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Caller correlation id; never used for ordering
    pub tx_id: i64,

    /// Stable numeric command kind
    pub kind: CommandKind,

    /// Command arguments in protocol order
    pub arguments: Vec<String>,
}

impl LogRecord {
    pub fn new(tx_id: i64, command: &Command) -> Self {
        Self {
            tx_id,
            kind: command.kind(),
            arguments: command.arguments(),
        }
    }

    /// Decode the record back into the command it logged
    pub fn command(&self) -> Result<Command> {
        Command::from_parts(self.kind, self.arguments.clone())
    }
}

/// An ordered group of records persisted by one write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Strictly increasing per log; also the replication cursor
    pub seq: u64,

    pub records: Vec<LogRecord>,
}

/// Outcome of decoding the front of a byte buffer
#[derive(Debug)]
pub enum FrameDecode {
    /// A whole frame and the number of bytes it occupied
    Complete(Batch, usize),

    /// The buffer ends before the frame does (torn write)
    Incomplete,
}

/// Encode a batch into a self-checking frame
///
/// Format: seq (u64 LE) + crc32(payload) (u32 LE) + len (u32 LE) + payload
pub fn encode_frame(batch: &Batch) -> Result<BytesMut> {
    let payload = bincode::serialize(&batch.records)?;
    if payload.len() > MAX_FRAME_PAYLOAD as usize {
        return Err(TideError::Durability(format!(
            "batch too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_PAYLOAD
        )));
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_u64_le(batch.seq);
    frame.put_u32_le(crc32fast::hash(&payload));
    frame.put_u32_le(payload.len() as u32);
    frame.put_slice(&payload);
    Ok(frame)
}

/// Decode the frame at the start of `bytes`
///
/// A checksum mismatch or undecodable payload is corruption; running out
/// of bytes is reported as [`FrameDecode::Incomplete`].
pub fn decode_frame(bytes: &[u8]) -> Result<FrameDecode> {
    if bytes.len() < HEADER_SIZE {
        return Ok(FrameDecode::Incomplete);
    }

    let mut header = &bytes[..HEADER_SIZE];
    let seq = header.get_u64_le();
    let crc = header.get_u32_le();
    let len = header.get_u32_le();

    if len > MAX_FRAME_PAYLOAD {
        return Err(TideError::WalCorruption(format!(
            "frame {seq} declares {len} bytes (max {MAX_FRAME_PAYLOAD})"
        )));
    }

    let total = HEADER_SIZE + len as usize;
    if bytes.len() < total {
        return Ok(FrameDecode::Incomplete);
    }

    let payload = &bytes[HEADER_SIZE..total];
    if crc32fast::hash(payload) != crc {
        return Err(TideError::WalCorruption(format!(
            "checksum mismatch in frame {seq}"
        )));
    }

    let records: Vec<LogRecord> = bincode::deserialize(payload).map_err(|e| {
        TideError::WalCorruption(format!("undecodable frame {seq}: {e}"))
    })?;

    Ok(FrameDecode::Complete(Batch { seq, records }, total))
}
