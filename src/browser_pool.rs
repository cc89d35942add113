//! Process-wide pool of live browsers with dual-gate admission.
//!
//! Below the cap, a start lock serializes browser creation (re-checked under
//! the lock so concurrent callers never overshoot). At the cap, admission
//! waits on a capacity semaphore and reuses browsers round-robin: the queue
//! front is rotated to the back, so one browser serves many concurrent
//! requests bounded only by its own page pool. There is no per-browser busy
//! flag.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::Browser;
use crate::config::Config;
use crate::error::RenderError;
use crate::metrics::ServiceMetrics;

const ADMISSION_TRIES: usize = 3;
const ADMISSION_WAIT: Duration = Duration::from_secs(5);

/// Snapshot of pool state for the stats surface.
#[derive(Debug, Clone)]
pub struct BrowserPoolStats {
    pub live_browsers: usize,
    pub max_browsers: usize,
    pub total_reports: usize,
}

/// Bounded FIFO of live browsers, created lazily up to `max_browsers`.
pub struct BrowserPool {
    config: Config,
    metrics: Arc<ServiceMetrics>,
    queue: Mutex<VecDeque<Arc<Browser>>>,
    start_lock: Mutex<()>,
    count: AtomicUsize,
    capacity: Semaphore,
    next_id: AtomicUsize,
    shutting_down: AtomicBool,
}

impl BrowserPool {
    pub fn new(config: Config, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            config,
            metrics,
            queue: Mutex::new(VecDeque::new()),
            start_lock: Mutex::new(()),
            count: AtomicUsize::new(0),
            capacity: Semaphore::new(0),
            next_id: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Borrow a browser for one request.
    ///
    /// Creates a new browser while below the cap; otherwise waits for pool
    /// capacity with bounded retries, pruning browsers whose process died.
    pub async fn acquire(&self, ctx: &CancellationToken) -> Result<Arc<Browser>, RenderError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(RenderError::Transport("browser pool is shutting down".into()));
        }

        if let Some(browser) = self.try_start_browser().await? {
            return Ok(browser);
        }

        for attempt in 1..=ADMISSION_TRIES {
            let permit = tokio::select! {
                _ = ctx.cancelled() => return Err(RenderError::Cancelled),
                permit = tokio::time::timeout(ADMISSION_WAIT, self.capacity.acquire()) => permit,
            };

            match permit {
                Ok(Ok(permit)) => {
                    let front = {
                        let mut queue = self.queue.lock().await;
                        queue.pop_front()
                    };
                    let Some(browser) = front else {
                        // Another waiter is mid-rotation; give the permit
                        // back and try again.
                        drop(permit);
                        continue;
                    };

                    if browser.is_alive().await {
                        self.queue.lock().await.push_back(browser.clone());
                        // The permit returns on drop; the browser stays
                        // available to other waiters.
                        drop(permit);
                        return Ok(browser);
                    }

                    // Crashed browser: remove it and its permit, then try to
                    // replace it.
                    permit.forget();
                    self.count.fetch_sub(1, Ordering::AcqRel);
                    warn!(browser = browser.id(), "removing dead browser from pool");
                    browser.shutdown().await;
                    if let Some(fresh) = self.try_start_browser().await? {
                        return Ok(fresh);
                    }
                }
                Ok(Err(_)) => {
                    return Err(RenderError::Transport("browser pool is shutting down".into()));
                }
                Err(_elapsed) => {
                    debug!(attempt, "no browser available, retrying admission");
                }
            }
        }

        Err(RenderError::PoolLimitReached)
    }

    /// Create and enqueue a browser if the pool is below its cap. The count
    /// is re-checked under the start lock so two callers racing past the
    /// first check cannot both create.
    async fn try_start_browser(&self) -> Result<Option<Arc<Browser>>, RenderError> {
        if self.count.load(Ordering::Acquire) >= self.config.max_browsers {
            return Ok(None);
        }
        let _guard = self.start_lock.lock().await;
        if self.count.load(Ordering::Acquire) >= self.config.max_browsers {
            return Ok(None);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let browser = Arc::new(Browser::launch(id, &self.config, self.metrics.clone()).await?);
        self.metrics.record_browser_launch();
        self.queue.lock().await.push_back(browser.clone());
        self.count.fetch_add(1, Ordering::Release);
        self.capacity.add_permits(1);
        info!(browser = id, live = self.count.load(Ordering::Acquire), "browser added to pool");
        Ok(Some(browser))
    }

    pub async fn stats(&self) -> BrowserPoolStats {
        let queue = self.queue.lock().await;
        BrowserPoolStats {
            live_browsers: queue.len(),
            max_browsers: self.config.max_browsers,
            total_reports: queue.iter().map(|b| b.report_count()).sum(),
        }
    }

    /// Shut down every pooled browser. Further acquisitions fail.
    pub async fn shutdown(&self) {
        info!("shutting down browser pool");
        self.shutting_down.store(true, Ordering::Release);
        self.capacity.close();

        let browsers: Vec<Arc<Browser>> = {
            let mut queue = self.queue.lock().await;
            queue.drain(..).collect()
        };
        for browser in browsers {
            browser.shutdown().await;
        }
        self.count.store(0, Ordering::Release);
        info!("browser pool shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool(config: Config) -> BrowserPool {
        BrowserPool::new(config, Arc::new(ServiceMetrics::new()))
    }

    #[tokio::test]
    async fn empty_pool_stats() {
        let pool = test_pool(Config::default());
        let stats = pool.stats().await;
        assert_eq!(stats.live_browsers, 0);
        assert_eq!(stats.max_browsers, 4);
        assert_eq!(stats.total_reports, 0);
    }

    #[tokio::test]
    async fn acquire_after_shutdown_fails() {
        let pool = test_pool(Config::default());
        pool.shutdown().await;

        let err = pool.acquire(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RenderError::Transport(_)));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_admission() {
        // Cap of zero forces the wait path immediately.
        let pool = test_pool(Config {
            max_browsers: 0,
            ..Default::default()
        });
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = pool.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, RenderError::Cancelled));
    }
}
