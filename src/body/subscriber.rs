//! Pull-based body consumption.
//!
//! `AsyncBodySubscriber` sits on the producer side and receives items;
//! `AsyncBody` is the caller's handle. The subscriber only holds a weak
//! reference to the handle state, so dropping every `AsyncBody` (and every
//! pending `done()` future) cancels the upstream.
//!
//! # Protocol
//! ```text
//! on_subscribe(s)  → first caller wins (CAS), s.request(1)
//!                  → later callers: s.cancel()
//! on_next(item)    → consumer(item, &body); error → cancel + fail done()
//! on_error(e)      → fail done()
//! on_complete()    → done() = Ok
//! body.consume()   → s.request(1)
//! body.cancel()    → s.cancel(), done() = Cancelled
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use tokio::sync::watch;

use crate::body::demand::Subscription;
use crate::http::error::{BodyError, BoxError, TransportError};

type Outcome = Result<(), BodyError>;

type Consumer<T> = Box<dyn Fn(T, &AsyncBody) -> Result<(), BoxError> + Send + Sync>;

struct BodyState {
    subscription: OnceLock<Arc<dyn Subscription>>,
    done: watch::Sender<Option<Outcome>>,
}

impl BodyState {
    /// First outcome wins; later calls are ignored.
    fn complete(&self, outcome: Outcome) -> bool {
        self.done.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    fn is_done(&self) -> bool {
        self.done.borrow().is_some()
    }
}

impl Drop for BodyState {
    fn drop(&mut self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }
}

/// Caller-side handle to a streamed body.
#[derive(Clone)]
pub struct AsyncBody {
    state: Arc<BodyState>,
}

impl AsyncBody {
    /// Ask the producer for one more item.
    pub fn consume(&self) {
        match self.state.subscription.get() {
            Some(subscription) => subscription.request(1),
            None => tracing::debug!("consume() before the body was subscribed, ignoring"),
        }
    }

    /// Resolves once the stream completes, fails or is cancelled. Every call
    /// observes the same outcome.
    pub fn done(&self) -> impl Future<Output = Result<(), BodyError>> + Send + 'static {
        let handle = self.clone();
        let mut rx = self.state.done.subscribe();
        async move {
            let outcome = rx.wait_for(Option::is_some).await.map(|slot| slot.clone());
            drop(handle);
            match outcome {
                Ok(Some(outcome)) => outcome,
                _ => Err(BodyError::Cancelled),
            }
        }
    }

    /// Stop the stream. A no-op once `done()` has resolved.
    pub fn cancel(&self) {
        if self.state.is_done() {
            return;
        }
        if let Some(subscription) = self.state.subscription.get() {
            subscription.cancel();
        }
        self.state.complete(Err(BodyError::Cancelled));
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }
}

impl std::fmt::Debug for AsyncBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBody")
            .field("done", &self.state.is_done())
            .finish()
    }
}

/// Producer-side adapter feeding items of type `T` to a consumer callback.
pub struct AsyncBodySubscriber<T> {
    consumer: Consumer<T>,
    subscribed: AtomicBool,
    subscription: OnceLock<Arc<dyn Subscription>>,
    body: Weak<BodyState>,
}

impl<T: Send + 'static> AsyncBodySubscriber<T> {
    /// Create a subscriber and the handle callers use to drive it.
    pub fn new<F>(consumer: F) -> (Arc<Self>, AsyncBody)
    where
        F: Fn(T, &AsyncBody) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let (done, _) = watch::channel(None);
        let state = Arc::new(BodyState {
            subscription: OnceLock::new(),
            done,
        });
        let subscriber = Arc::new(Self {
            consumer: Box::new(consumer),
            subscribed: AtomicBool::new(false),
            subscription: OnceLock::new(),
            body: Arc::downgrade(&state),
        });
        (subscriber, AsyncBody { state })
    }

    pub fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if self
            .subscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("body already subscribed, cancelling duplicate subscription");
            subscription.cancel();
            return;
        }
        let _ = self.subscription.set(subscription.clone());

        let Some(state) = self.body.upgrade() else {
            subscription.cancel();
            return;
        };
        let _ = state.subscription.set(subscription.clone());
        if state.is_done() {
            // cancelled before the producer attached
            subscription.cancel();
            return;
        }
        subscription.request(1);
    }

    pub fn on_next(&self, item: T) {
        let Some(state) = self.body.upgrade() else {
            self.cancel_upstream();
            return;
        };
        if state.is_done() {
            return;
        }
        let handle = AsyncBody { state };
        if let Err(e) = (self.consumer)(item, &handle) {
            tracing::warn!(error = %e, "body consumer failed, cancelling stream");
            self.cancel_upstream();
            handle.state.complete(Err(BodyError::Consumer(Arc::from(e))));
        }
    }

    pub fn on_error(&self, error: TransportError) {
        if let Some(state) = self.body.upgrade() {
            state.complete(Err(BodyError::Upstream(Arc::new(error))));
        }
    }

    pub fn on_complete(&self) {
        if let Some(state) = self.body.upgrade() {
            state.complete(Ok(()));
        }
    }

    fn cancel_upstream(&self) {
        if let Some(subscription) = self.subscription.get() {
            subscription.cancel();
        }
    }
}
