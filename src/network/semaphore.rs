//! Counting semaphore bounding concurrent connections.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

pub struct Semaphore {
    available: Mutex<usize>,
    released: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Arc<Self> {
        Arc::new(Self {
            available: Mutex::new(permits),
            released: Condvar::new(),
        })
    }

    /// Block until a permit is free
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.available.lock();
        while *available == 0 {
            self.released.wait(&mut available);
        }
        *available -= 1;
        self.permit()
    }

    /// Block for at most `timeout` waiting for a permit
    pub fn acquire_timeout(self: &Arc<Self>, timeout: Duration) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            self.released
                .wait_while_for(&mut available, |free| *free == 0, timeout);
        }
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(self.permit())
    }

    /// Take a permit only if one is free right now
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(self.permit())
    }

    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    fn permit(self: &Arc<Self>) -> Permit {
        Permit {
            semaphore: Arc::clone(self),
        }
    }

    fn release(&self) {
        *self.available.lock() += 1;
        self.released.notify_one();
    }
}

/// Returns its permit on drop; can move to another thread
pub struct Permit {
    semaphore: Arc<Semaphore>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}
