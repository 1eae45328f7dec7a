//! Completion handles
//!
//! A single-assignment promise/future pair. The log worker owns the
//! [`Promise`] and resolves it exactly once; the caller holds the
//! [`LogFuture`] and blocks on it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, TideError};

/// Why a record did not become durable
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    Closed,
    Durability(String),
}

impl From<Failure> for TideError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Closed => TideError::WalClosed,
            Failure::Durability(reason) => TideError::Durability(reason),
        }
    }
}

type Outcome = std::result::Result<(), Failure>;

struct Shared {
    outcome: Mutex<Option<Outcome>>,
    resolved: Condvar,
}

/// Create a connected promise/future pair
pub(crate) fn pair() -> (Promise, LogFuture) {
    let shared = Arc::new(Shared {
        outcome: Mutex::new(None),
        resolved: Condvar::new(),
    });
    (
        Promise {
            shared: Arc::clone(&shared),
        },
        LogFuture { shared },
    )
}

/// Producer side; resolving consumes it
pub(crate) struct Promise {
    shared: Arc<Shared>,
}

impl Promise {
    pub(crate) fn succeed(self) {
        self.set(Ok(()));
    }

    pub(crate) fn fail(self, failure: Failure) {
        self.set(Err(failure));
    }

    fn set(&self, outcome: Outcome) {
        let mut slot = self.shared.outcome.lock();
        if slot.is_none() {
            *slot = Some(outcome);
            self.shared.resolved.notify_all();
        }
    }
}

impl Drop for Promise {
    // A promise dropped on any path (worker panic, channel teardown)
    // still resolves, so no caller waits forever.
    fn drop(&mut self) {
        self.set(Err(Failure::Durability("record abandoned before persistence".to_string())));
    }
}

/// Completion handle for one appended record
///
/// Resolves once the record's batch has been persisted, or has failed to
/// be.
#[derive(Clone)]
pub struct LogFuture {
    shared: Arc<Shared>,
}

impl LogFuture {
    /// Block until the record is resolved
    pub fn wait(&self) -> Result<()> {
        let mut slot = self.shared.outcome.lock();
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone().map_err(TideError::from);
            }
            self.shared.resolved.wait(&mut slot);
        }
    }

    /// Block until resolution or until `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let mut slot = self.shared.outcome.lock();
        if slot.is_none() {
            self.shared
                .resolved
                .wait_while_for(&mut slot, |outcome| outcome.is_none(), timeout);
        }
        match slot.as_ref() {
            Some(outcome) => outcome.clone().map_err(TideError::from),
            None => Err(TideError::Timeout),
        }
    }

    /// Non-blocking peek at the outcome
    pub fn try_result(&self) -> Option<Result<()>> {
        self.shared
            .outcome
            .lock()
            .as_ref()
            .map(|outcome| outcome.clone().map_err(TideError::from))
    }

    pub fn is_resolved(&self) -> bool {
        self.shared.outcome.lock().is_some()
    }
}
