//! Single-flight access-token refresh.
//!
//! DESIGN
//! ======
//! State is `Idle | Refreshing { queue }`. The first caller to see a 401
//! becomes the leader and holds a [`RefreshLease`]; everyone who fails while
//! the lease is out joins the queue as a follower with a `oneshot` receiver.
//! Settling the lease drains the queue FIFO with one shared outcome and
//! returns the state to `Idle`.
//!
//! The lease releases on `Drop` as well, so a leader whose future is
//! cancelled mid-refresh still unblocks its followers (with
//! [`ApiError::RefreshAbandoned`]) instead of stranding them.
//!
//! Each refresh attempt carries a generation number. A lease only settles the
//! attempt it opened; if a direct refresh call already aborted that attempt
//! and a new one started, the stale lease leaves the new queue alone.
//!
//! The mutex is never held across an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};

use crate::error::ApiError;

type Outcome = Result<(), ApiError>;

enum RefreshState {
    Idle,
    Refreshing { generation: u64, queue: Vec<oneshot::Sender<Outcome>> },
}

struct Inner {
    state: RefreshState,
    next_generation: u64,
}

/// What a caller that just saw a 401 should do next.
pub enum Ticket<'a> {
    /// Issue the refresh call, then settle the lease.
    Leader(RefreshLease<'a>),
    /// Wait for the in-flight refresh to settle.
    Follower(oneshot::Receiver<Outcome>),
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    terminations: watch::Sender<u64>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        let (terminations, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                next_generation: 0,
            }),
            terminations,
        }
    }

    /// Become the leader if idle, otherwise queue behind the current refresh.
    pub fn join(&self) -> Ticket<'_> {
        let mut inner = self.lock();
        if let RefreshState::Refreshing { queue, .. } = &mut inner.state {
            let (tx, rx) = oneshot::channel();
            queue.push(tx);
            return Ticket::Follower(rx);
        }

        let generation = inner.next_generation;
        inner.next_generation = inner.next_generation.wrapping_add(1);
        inner.state = RefreshState::Refreshing {
            generation,
            queue: Vec::new(),
        };
        Ticket::Leader(RefreshLease {
            coordinator: self,
            generation,
            settled: false,
        })
    }

    /// A refresh call failed outside of a lease (someone called the refresh
    /// endpoint directly). Rejects whatever is queued and returns to `Idle`.
    ///
    /// Returns the number of queued callers rejected.
    pub fn abort(&self, error: &ApiError) -> usize {
        let queue = {
            let mut inner = self.lock();
            match std::mem::replace(&mut inner.state, RefreshState::Idle) {
                RefreshState::Refreshing { queue, .. } => queue,
                RefreshState::Idle => Vec::new(),
            }
        };
        let rejected = drain(queue, &Err(error.clone()));
        self.mark_terminated();
        rejected
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        matches!(self.lock().state, RefreshState::Refreshing { .. })
    }

    /// Number of callers currently waiting on the in-flight refresh.
    #[must_use]
    pub fn queued(&self) -> usize {
        match &self.lock().state {
            RefreshState::Refreshing { queue, .. } => queue.len(),
            RefreshState::Idle => 0,
        }
    }

    /// Count of irrecoverable refresh failures; bumps once per failure.
    #[must_use]
    pub fn subscribe_terminations(&self) -> watch::Receiver<u64> {
        self.terminations.subscribe()
    }

    fn settle(&self, generation: u64, outcome: &Outcome) -> usize {
        let queue = {
            let mut inner = self.lock();
            let current = matches!(
                inner.state,
                RefreshState::Refreshing { generation: open, .. } if open == generation
            );
            if !current {
                return 0;
            }
            match std::mem::replace(&mut inner.state, RefreshState::Idle) {
                RefreshState::Refreshing { queue, .. } => queue,
                RefreshState::Idle => Vec::new(),
            }
        };
        drain(queue, outcome)
    }

    fn mark_terminated(&self) {
        self.terminations.send_modify(|count| *count = count.wrapping_add(1));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolve queued callers in arrival order. Receivers that were dropped
/// (caller gave up) are skipped.
fn drain(queue: Vec<oneshot::Sender<Outcome>>, outcome: &Outcome) -> usize {
    let count = queue.len();
    for waiter in queue {
        let _ = waiter.send(outcome.clone());
    }
    count
}

/// Exclusive right to run the one in-flight refresh.
pub struct RefreshLease<'a> {
    coordinator: &'a RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl RefreshLease<'_> {
    /// Refresh succeeded: release every follower to replay.
    pub fn succeed(mut self) -> usize {
        self.settled = true;
        self.coordinator.settle(self.generation, &Ok(()))
    }

    /// Refresh failed: reject every follower with `error` and signal that
    /// the session is gone.
    pub fn fail(mut self, error: &ApiError) -> usize {
        self.settled = true;
        let rejected = self.coordinator.settle(self.generation, &Err(error.clone()));
        self.coordinator.mark_terminated();
        rejected
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let rejected = self
                .coordinator
                .settle(self.generation, &Err(ApiError::RefreshAbandoned));
            tracing::warn!(rejected, "token refresh abandoned; queued requests rejected");
        }
    }
}

#[cfg(test)]
#[path = "refresh_test.rs"]
mod tests;
