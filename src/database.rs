//! Database front-end
//!
//! Turns text queries into storage calls and storage outcomes into
//! responses. Each query gets a fresh transaction id, which travels with
//! the log record as correlation data only.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::error::TideError;
use crate::protocol::{parse_query, Command, Response};
use crate::storage::Storage;

pub struct Database {
    storage: Arc<Storage>,
    next_tx: AtomicI64,
}

impl Database {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            next_tx: AtomicI64::new(1),
        }
    }

    /// Parse and execute one query line
    pub fn handle_query(&self, query: &str) -> Response {
        let command = match parse_query(query) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!("Rejected query {:?}: {}", query, e);
                return Response::error(e);
            }
        };

        let tx_id = self.next_tx.fetch_add(1, Ordering::Relaxed);
        self.execute(tx_id, &command)
    }

    /// Execute an already parsed command under `tx_id`
    pub fn execute(&self, tx_id: i64, command: &Command) -> Response {
        match self.storage.execute(tx_id, command) {
            Ok(Some(value)) => Response::Value(value),
            Ok(None) if command.is_mutation() => Response::Ok,
            Ok(None) => Response::NotFound,
            Err(TideError::ReadOnlyReplica) => Response::error(TideError::ReadOnlyReplica),
            Err(e) => {
                tracing::warn!(tx_id, kind = %command.kind(), error = %e, "Query failed");
                Response::error(e)
            }
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }
}
