//! Response definitions
//!
//! Represents responses to clients and their text rendering.

use std::fmt;

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Successful mutation
    Ok,

    /// Successful read
    Value(String),

    /// Read of an absent key
    NotFound,

    /// Any failure, including read-only replica rejection
    Error(String),
}

impl Response {
    /// Create an ERROR response
    pub fn error(message: impl fmt::Display) -> Self {
        Response::Error(message.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str("[ok]"),
            Response::Value(value) => write!(f, "[ok] {value}"),
            Response::NotFound => f.write_str("[not found]"),
            Response::Error(message) => write!(f, "[error] {message}"),
        }
    }
}
