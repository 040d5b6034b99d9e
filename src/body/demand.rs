//! Credit-based demand shared by body publishers and WebSocket readers.
//!
//! Credit is a semaphore: `request(n)` adds permits, the producer spends one
//! permit per item. Cancelling closes the semaphore and wakes anything
//! waiting on `cancelled()`.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, Semaphore};

/// The upstream half of a subscription: how a consumer asks for more items
/// or stops the producer.
pub trait Subscription: Send + Sync {
    /// Grant `n` more items of demand.
    fn request(&self, n: u64);

    /// Stop delivery. Idempotent.
    fn cancel(&self);
}

#[derive(Debug)]
pub struct Demand {
    credit: Semaphore,
    cancelled: AtomicBool,
    cancel_notify: Notify,
}

impl Demand {
    pub fn new() -> Self {
        Self {
            credit: Semaphore::new(0),
            cancelled: AtomicBool::new(false),
            cancel_notify: Notify::new(),
        }
    }

    /// Wait for one unit of credit. Returns false once cancelled.
    pub async fn acquire(&self) -> bool {
        match self.credit.acquire().await {
            Ok(permit) => {
                permit.forget();
                !self.is_cancelled()
            }
            Err(_) => false,
        }
    }

    /// Spend one unit of credit if some is already granted.
    pub fn try_acquire(&self) -> bool {
        match self.credit.try_acquire() {
            Ok(permit) => {
                permit.forget();
                !self.is_cancelled()
            }
            Err(_) => false,
        }
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.cancel_notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Credit granted but not yet spent.
    pub fn available(&self) -> usize {
        self.credit.available_permits()
    }
}

impl Default for Demand {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription for Demand {
    fn request(&self, n: u64) {
        if n == 0 || self.is_cancelled() {
            return;
        }
        let n = usize::try_from(n).unwrap_or(Semaphore::MAX_PERMITS);
        let room = Semaphore::MAX_PERMITS.saturating_sub(self.credit.available_permits());
        self.credit.add_permits(n.min(room));
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.credit.close();
            self.cancel_notify.notify_waiters();
        }
    }
}
