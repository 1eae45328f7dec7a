//! Replication wire codec
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Kind (1) │ Len (4)  │   bincode payload           │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Message Kinds
//! - 0x01: SYNC_REQUEST  - follower → primary, `after_seq`
//! - 0x02: SYNC_RESPONSE - primary → follower, ordered batches and the
//!   primary's newest seq
//! - 0x03: SYNC_ERROR    - primary → follower, reason

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TideError};
use crate::wal::Batch;

/// Header size: 1 byte kind + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Default frame payload cap for replication links (16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 << 20;

const SYNC_REQUEST: u8 = 0x01;
const SYNC_RESPONSE: u8 = 0x02;
const SYNC_ERROR: u8 = 0x03;

/// A replication message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Ask for committed batches with `seq > after_seq`
    SyncRequest { after_seq: u64 },

    /// Committed batches in primary order (empty when caught up)
    ///
    /// `last_seq` is the newest seq the primary has committed, which lets
    /// a follower notice that it is ahead of the primary.
    SyncResponse { batches: Vec<Batch>, last_seq: u64 },

    /// The primary could not serve the request
    SyncError { message: String },
}

#[derive(Serialize, Deserialize)]
struct SyncRequestBody {
    after_seq: u64,
}

#[derive(Serialize)]
struct SyncResponseRef<'a> {
    batches: &'a [Batch],
    last_seq: u64,
}

#[derive(Deserialize)]
struct SyncResponseBody {
    batches: Vec<Batch>,
    last_seq: u64,
}

impl Message {
    fn kind(&self) -> u8 {
        match self {
            Message::SyncRequest { .. } => SYNC_REQUEST,
            Message::SyncResponse { .. } => SYNC_RESPONSE,
            Message::SyncError { .. } => SYNC_ERROR,
        }
    }
}

/// Encode a message to bytes
///
/// Format: kind (1) + payload_len (4, BE) + payload
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    let payload = match message {
        Message::SyncRequest { after_seq } => bincode::serialize(&SyncRequestBody {
            after_seq: *after_seq,
        })?,
        Message::SyncResponse { batches, last_seq } => bincode::serialize(&SyncResponseRef {
            batches,
            last_seq: *last_seq,
        })?,
        Message::SyncError { message } => bincode::serialize(message)?,
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.push(message.kind());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a message from one kind byte and its payload
fn decode_payload(kind: u8, payload: &[u8]) -> Result<Message> {
    let message = match kind {
        SYNC_REQUEST => {
            let body: SyncRequestBody = bincode::deserialize(payload)?;
            Message::SyncRequest {
                after_seq: body.after_seq,
            }
        }
        SYNC_RESPONSE => {
            let body: SyncResponseBody = bincode::deserialize(payload)?;
            Message::SyncResponse {
                batches: body.batches,
                last_seq: body.last_seq,
            }
        }
        SYNC_ERROR => Message::SyncError {
            message: bincode::deserialize(payload)?,
        },
        _ => {
            return Err(TideError::Protocol(format!(
                "Unknown replication message: 0x{:02x}",
                kind
            )))
        }
    };
    Ok(message)
}

/// Read a complete message from a stream
///
/// Blocks until a complete message is received or an error occurs
pub fn read_message<R: Read>(reader: &mut R, max_payload: usize) -> Result<Message> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let kind = header[0];
    let payload_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    if payload_len > max_payload {
        return Err(TideError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, max_payload
        )));
    }

    let mut payload = vec![0u8; payload_len];
    if payload_len > 0 {
        reader.read_exact(&mut payload)?;
    }

    decode_payload(kind, &payload)
}

/// Write a message to a stream
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<()> {
    let bytes = encode_message(message)?;
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
