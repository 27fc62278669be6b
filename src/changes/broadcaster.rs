//! Long-poll fan-out of change notifications.
//!
//! Every change bumps a generation counter. A client passes the last
//! generation it saw; if something newer exists it is answered at once,
//! otherwise it parks a oneshot in the waiter set until the next `notify()`.
//!
//! # Invariants
//! - Generation checks and waiter registration happen under one lock, so a
//!   change can never slip between them
//! - A waiter leaves the set exactly once: woken by `notify()`/`close()`,
//!   or removed by its own drop (client went away, timeout)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

/// Answer to a change-wait request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitOutcome {
    /// Whether a change happened after the client's last generation.
    pub changed: bool,
    /// Generation the client should send with its next request.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct WaiterSet {
    generation: u64,
    closed: bool,
    pending: HashMap<u64, oneshot::Sender<u64>>,
}

#[derive(Debug, Default)]
pub struct ChangeBroadcaster {
    state: Mutex<WaiterSet>,
    next_id: AtomicU64,
}

/// Result of registering interest in the next change.
#[derive(Debug)]
pub enum Subscription {
    /// Nothing to wait for.
    Ready(WaitOutcome),
    /// Parked until woken.
    Pending(Waiter),
}

impl ChangeBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WaiterSet> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn waiter_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Record a change and wake every waiting client. Returns how many were woken.
    pub fn notify(&self) -> usize {
        let mut state = self.lock();
        state.generation += 1;
        let generation = state.generation;
        let waiters = std::mem::take(&mut state.pending);
        let count = waiters.len();
        for (_, waiter) in waiters {
            // A receiver dropped mid-flight is a client that just left.
            let _ = waiter.send(generation);
        }
        tracing::debug!(generation, woken = count, "Change broadcast");
        count
    }

    /// Release every waiter without a change and answer later waits immediately.
    pub fn close(&self) -> usize {
        let mut state = self.lock();
        state.closed = true;
        let released = std::mem::take(&mut state.pending).len();
        tracing::debug!(released, "Change broadcaster closed");
        released
    }

    /// Register for the next change after generation `since`.
    ///
    /// `None` means the client has seen nothing yet and waits for the next change.
    pub fn subscribe(self: &Arc<Self>, since: Option<u64>) -> Subscription {
        let mut state = self.lock();
        let generation = state.generation;

        if state.closed {
            return Subscription::Ready(WaitOutcome {
                changed: false,
                generation,
            });
        }
        if since.is_some_and(|seen| generation > seen) {
            return Subscription::Ready(WaitOutcome {
                changed: true,
                generation,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        state.pending.insert(id, tx);

        Subscription::Pending(Waiter {
            id,
            seen: generation,
            rx,
            owner: Arc::clone(self),
        })
    }

    /// Wait for a change after `since`, giving up after `timeout`.
    pub async fn wait(self: &Arc<Self>, since: Option<u64>, timeout: Duration) -> WaitOutcome {
        match self.subscribe(since) {
            Subscription::Ready(outcome) => outcome,
            Subscription::Pending(waiter) => waiter.wait(timeout).await,
        }
    }

    fn remove(&self, id: u64) {
        self.lock().pending.remove(&id);
    }
}

/// A parked long-poll request. Dropping it unregisters it.
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    seen: u64,
    rx: oneshot::Receiver<u64>,
    owner: Arc<ChangeBroadcaster>,
}

impl Waiter {
    pub async fn wait(mut self, timeout: Duration) -> WaitOutcome {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(generation)) => WaitOutcome {
                changed: true,
                generation,
            },
            // Closed, or timed out. Report the generation seen at subscription
            // so a change racing the timeout is picked up by the next request.
            Ok(Err(_)) | Err(_) => match self.rx.try_recv() {
                Ok(generation) => WaitOutcome {
                    changed: true,
                    generation,
                },
                Err(_) => WaitOutcome {
                    changed: false,
                    generation: self.seen,
                },
            },
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.owner.remove(self.id);
    }
}
