//! Reader/writer lock whose acquire and release arrive as separate calls.

use tokio::sync::{Mutex, Semaphore};

use crate::error::{DfsError, DfsResult};

/// Permits taken by an exclusive holder; shared holders take one each.
const WRITE_PERMITS: u32 = u32::MAX >> 3;

/// Holders currently admitted, kept for release validation.
#[derive(Debug, Default)]
struct Held {
    readers: u32,
    writer: bool,
}

/// Reader/writer lock with explicit release.
///
/// Clients lock a path in one remote call and unlock it in a later one,
/// so guard types cannot model the protocol. A shared acquisition takes
/// one semaphore permit and an exclusive acquisition takes all of them;
/// release returns what was taken. The semaphore queue is FIFO, so a
/// waiting writer is served before readers that arrive after it.
#[derive(Debug)]
pub struct NodeLock {
    permits: Semaphore,
    held: Mutex<Held>,
}

impl NodeLock {
    pub fn new() -> Self {
        Self { permits: Semaphore::new(WRITE_PERMITS as usize), held: Mutex::new(Held::default()) }
    }

    /// Waits until the requested mode is granted.
    pub async fn acquire(&self, exclusive: bool) {
        let wanted = if exclusive { WRITE_PERMITS } else { 1 };
        // The semaphore is never closed, so acquisition cannot fail.
        self.permits.acquire_many(wanted).await.expect("node lock semaphore closed").forget();
        let mut held = self.held.lock().await;
        if exclusive {
            held.writer = true;
        } else {
            held.readers += 1;
        }
    }

    /// Releases one holder of the stated mode.
    ///
    /// Fails with [`DfsError::Argument`] when no such holder exists.
    pub async fn release(&self, exclusive: bool) -> DfsResult<()> {
        let mut held = self.held.lock().await;
        if exclusive {
            if !held.writer {
                return Err(DfsError::Argument);
            }
            held.writer = false;
            self.permits.add_permits(WRITE_PERMITS as usize);
        } else {
            if held.readers == 0 {
                return Err(DfsError::Argument);
            }
            held.readers -= 1;
            self.permits.add_permits(1);
        }
        Ok(())
    }
}

impl Default for NodeLock {
    fn default() -> Self {
        Self::new()
    }
}
