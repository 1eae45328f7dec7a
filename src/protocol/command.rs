//! Command definitions
//!
//! Represents commands from clients and their stable numeric kinds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TideError};

/// Command kinds
///
/// The numeric ids are part of the persisted log format and of the
/// replication stream; they must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum CommandKind {
    Set = 0x01,
    Get = 0x02,
    Del = 0x03,
}

impl CommandKind {
    /// Keyword used by the text protocol
    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Set => "SET",
            CommandKind::Get => "GET",
            CommandKind::Del => "DEL",
        }
    }

    /// Look up a kind by its protocol keyword
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SET" => Some(CommandKind::Set),
            "GET" => Some(CommandKind::Get),
            "DEL" => Some(CommandKind::Del),
            _ => None,
        }
    }

    /// Number of arguments the command takes
    pub fn arity(self) -> usize {
        match self {
            CommandKind::Set => 2,
            CommandKind::Get | CommandKind::Del => 1,
        }
    }
}

impl From<CommandKind> for u8 {
    fn from(kind: CommandKind) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for CommandKind {
    type Error = TideError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(CommandKind::Set),
            0x02 => Ok(CommandKind::Get),
            0x03 => Ok(CommandKind::Del),
            _ => Err(TideError::Protocol(format!(
                "Unknown command kind: 0x{:02x}",
                byte
            ))),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Insert or overwrite a key
    Set { key: String, value: String },

    /// Get a value by key
    Get { key: String },

    /// Delete a key
    Del { key: String },
}

impl Command {
    /// Get the command kind
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Set { .. } => CommandKind::Set,
            Command::Get { .. } => CommandKind::Get,
            Command::Del { .. } => CommandKind::Del,
        }
    }

    /// Whether the command changes state and must go through the log
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Command::Get { .. })
    }

    /// Arguments in protocol order
    pub fn arguments(&self) -> Vec<String> {
        match self {
            Command::Set { key, value } => vec![key.clone(), value.clone()],
            Command::Get { key } | Command::Del { key } => vec![key.clone()],
        }
    }

    /// Rebuild a command from its kind and ordered arguments
    pub fn from_parts(kind: CommandKind, mut arguments: Vec<String>) -> Result<Self> {
        if arguments.len() != kind.arity() {
            return Err(TideError::Protocol(format!(
                "{} command: expected {} arguments, got {}",
                kind.name(),
                kind.arity(),
                arguments.len()
            )));
        }

        let command = match kind {
            CommandKind::Set => {
                let value = arguments.pop().unwrap_or_default();
                let key = arguments.pop().unwrap_or_default();
                Command::Set { key, value }
            }
            CommandKind::Get => Command::Get {
                key: arguments.pop().unwrap_or_default(),
            },
            CommandKind::Del => Command::Del {
                key: arguments.pop().unwrap_or_default(),
            },
        };
        Ok(command)
    }
}
