//! Query parser
//!
//! Turns one request line into a [`Command`].

use crate::error::{Result, TideError};

use super::{Command, CommandKind};

/// Parse a single query line such as `SET key value`
///
/// Tokens are separated by any run of whitespace; a trailing newline is
/// ignored.
pub fn parse_query(line: &str) -> Result<Command> {
    let mut tokens = line.split_whitespace();

    let name = tokens
        .next()
        .ok_or_else(|| TideError::Protocol("empty query".to_string()))?;

    let kind = CommandKind::from_name(name)
        .ok_or_else(|| TideError::Protocol(format!("unknown command: {name:?}")))?;

    let arguments: Vec<String> = tokens.map(str::to_string).collect();
    Command::from_parts(kind, arguments)
}
