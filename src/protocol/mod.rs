//! Protocol Module
//!
//! Defines the line-oriented text protocol between clients and the server.
//!
//! ## Request Format
//! One query per line, tokens separated by whitespace:
//! ```text
//! SET <key> <value>
//! GET <key>
//! DEL <key>
//! ```
//!
//! ### Command Kinds
//! - 0x01: SET
//! - 0x02: GET
//! - 0x03: DEL
//!
//! The same numeric kinds are written into log records, so a follower can
//! decode a replicated record without knowing the text syntax.
//!
//! ## Response Format
//! ```text
//! [ok]
//! [ok] <value>
//! [not found]
//! [error] <message>
//! ```

mod command;
mod parser;
mod response;

pub use command::{Command, CommandKind};
pub use parser::parse_query;
pub use response::Response;
