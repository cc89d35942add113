//! Bounded LIFO reuse pool for browser pages.
//!
//! Acquisition never blocks: either an idle page is popped, a slot below the
//! cap is reserved and the caller's factory runs, or the pool reports
//! saturation immediately and the caller applies its own retry policy.
//! The pool is generic over the pooled value so the admission discipline is
//! testable without a live browser.

use std::future::Future;

use tokio::sync::Mutex;

use crate::error::RenderError;

struct PoolState<T> {
    idle: Vec<T>,
    total: usize,
}

/// Per-browser reservoir of reusable pages.
pub struct PagePool<T> {
    state: Mutex<PoolState<T>>,
    max: usize,
}

impl<T> PagePool<T> {
    pub fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                total: 0,
            }),
            max,
        }
    }

    /// Pop the most recently returned page, or create a new one through
    /// `make` while the total stays under the cap.
    ///
    /// The slot is reserved before the factory runs (so concurrent acquires
    /// cannot overshoot the cap) and rolled back if the factory fails. The
    /// factory runs outside the pool lock.
    pub async fn acquire<F, Fut>(&self, make: F) -> Result<T, RenderError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RenderError>>,
    {
        {
            let mut state = self.state.lock().await;
            if let Some(page) = state.idle.pop() {
                return Ok(page);
            }
            if state.total >= self.max {
                return Err(RenderError::PoolLimitReached);
            }
            state.total += 1;
        }

        match make().await {
            Ok(page) => Ok(page),
            Err(e) => {
                self.state.lock().await.total -= 1;
                Err(e)
            }
        }
    }

    /// Return a healthy page to the top of the stack.
    pub async fn release(&self, page: T) {
        self.state.lock().await.idle.push(page);
    }

    /// Account for a checked-out page the caller has disposed. This is the
    /// only path that shrinks `total` for a page that existed.
    pub async fn retire(&self) {
        let mut state = self.state.lock().await;
        debug_assert!(state.total > 0);
        state.total = state.total.saturating_sub(1);
    }

    /// Empty the idle stack for shutdown; the caller disposes each page.
    /// Pages still checked out remain accounted until retired.
    pub async fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock().await;
        let drained = std::mem::take(&mut state.idle);
        state.total -= drained.len();
        drained
    }

    pub async fn idle_count(&self) -> usize {
        self.state.lock().await.idle.len()
    }

    pub async fn total(&self) -> usize {
        self.state.lock().await.total
    }

    pub fn capacity(&self) -> usize {
        self.max
    }
}
