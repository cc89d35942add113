//! Browser process lifecycle and per-browser render orchestration.
//!
//! Each [`Browser`] owns one Chromium process, one temp user-data directory,
//! the top-level DevTools connection, and a bounded pool of reusable pages.
//! The DevTools endpoint is discovered through the two-line
//! `DevToolsActivePort` file Chromium writes into the user-data directory;
//! a per-instance filesystem watcher covers the race between process start
//! and file creation, with bounded re-reads against half-flushed writes.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use serde_json::json;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{browser_args, find_browser_executable, Config, JsSettings, PageSettings};
use crate::connection::Connection;
use crate::error::RenderError;
use crate::metrics::ServiceMetrics;
use crate::page::BrowserPage;
use crate::page_pool::PagePool;
use crate::protocol::CreateTargetReply;
use crate::sink::ByteSink;

const HANDSHAKE_FILE: &str = "DevToolsActivePort";
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const PAGE_ACQUIRE_TRIES: usize = 3;

/// One live Chromium instance with its connection and page pool.
pub struct Browser {
    id: usize,
    port: u16,
    connection: Connection,
    pages: PagePool<BrowserPage>,
    process: Mutex<Option<Child>>,
    user_data_dir: PathBuf,
    response_timeout: Duration,
    report_count: AtomicUsize,
    metrics: Arc<ServiceMetrics>,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("id", &self.id)
            .field("port", &self.port)
            .finish()
    }
}

impl Browser {
    /// Spawn a Chromium process, wait for its DevTools handshake, and attach
    /// the top-level connection.
    pub async fn launch(
        id: usize,
        config: &Config,
        metrics: Arc<ServiceMetrics>,
    ) -> Result<Self, RenderError> {
        let executable = find_browser_executable(config.browser_kind, config.browser_path.as_deref())
            .ok_or_else(|| {
                RenderError::BrowserStart(format!(
                    "no {:?} executable found; set browser_path or {}",
                    config.browser_kind,
                    crate::config::BROWSER_ENV_VAR
                ))
            })?;

        let user_data_dir = user_data_root().join(format!(
            "browser-{}-{}",
            std::process::id(),
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            RenderError::BrowserStart(format!("create {}: {e}", user_data_dir.display()))
        })?;

        info!(browser = id, executable = %executable.display(), "launching browser");
        let mut child = Command::new(&executable)
            .args(browser_args(config, &user_data_dir))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RenderError::BrowserStart(format!("spawn {}: {e}", executable.display()))
            })?;

        let (port, ws_path) = match wait_for_devtools_endpoint(&user_data_dir, &mut child).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                let _ = child.start_kill();
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(e);
            }
        };

        let ws_url = format!("ws://127.0.0.1:{port}{ws_path}");
        let connection = match Connection::connect(&ws_url, config.response_timeout).await {
            Ok(connection) => connection,
            Err(e) => {
                let _ = child.start_kill();
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(RenderError::BrowserStart(e.to_string()));
            }
        };

        info!(browser = id, port, "browser ready");
        Ok(Self {
            id,
            port,
            connection,
            pages: PagePool::new(config.max_pages_per_browser),
            process: Mutex::new(Some(child)),
            user_data_dir,
            response_timeout: config.response_timeout,
            report_count: AtomicUsize::new(0),
            metrics,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Reports this browser has rendered successfully.
    pub fn report_count(&self) -> usize {
        self.report_count.load(Ordering::Relaxed)
    }

    /// Whether the Chromium process is still running. A discovered exit is
    /// logged with its status.
    pub async fn is_alive(&self) -> bool {
        let mut guard = self.process.lock().await;
        match guard.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    error!(browser = self.id, %status, "browser process exited");
                    false
                }
                Err(e) => {
                    error!(browser = self.id, error = %e, "failed to query browser process");
                    false
                }
            },
            None => false,
        }
    }

    /// Render one report through a pooled page.
    ///
    /// Page acquisition is retried up to three times with a
    /// `response_timeout / 3` sleep on saturation; the sleep honors the
    /// request context. A healthy page goes back to the pool, a poisoned one
    /// is disposed and its target closed.
    pub async fn generate_report<S: ByteSink>(
        &self,
        sink: &mut S,
        html: &str,
        page_settings: &PageSettings,
        js: &JsSettings,
        ctx: &CancellationToken,
    ) -> Result<(), RenderError> {
        let mut acquired = None;
        for attempt in 1..=PAGE_ACQUIRE_TRIES {
            match self.pages.acquire(|| self.create_page(ctx)).await {
                Ok(page) => {
                    acquired = Some(page);
                    break;
                }
                Err(RenderError::PoolLimitReached) => {
                    debug!(browser = self.id, attempt, "page pool saturated, backing off");
                    let backoff = self.response_timeout / 3;
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(RenderError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(other) => return Err(other),
            }
        }
        let Some(page) = acquired else {
            return Err(RenderError::PoolLimitReached);
        };

        let outcome = page
            .render(sink, html, page_settings, js, &self.metrics, ctx)
            .await;
        match &outcome {
            Ok(()) => {
                self.report_count.fetch_add(1, Ordering::Relaxed);
                self.pages.release(page).await;
            }
            Err(e) if e.poisons_page() => self.dispose_page(page).await,
            Err(_) => self.pages.release(page).await,
        }
        outcome
    }

    /// Kill the process, dispose all connections, and delete the user-data
    /// directory.
    pub async fn shutdown(&self) {
        info!(browser = self.id, "shutting down browser");
        for page in self.pages.drain().await {
            page.dispose().await;
        }
        self.connection.dispose().await;
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
            warn!(
                browser = self.id,
                dir = %self.user_data_dir.display(),
                error = %e,
                "failed to remove user data dir"
            );
        }
    }

    async fn create_page(&self, ctx: &CancellationToken) -> Result<BrowserPage, RenderError> {
        let raw = self
            .connection
            .rpc("Target.createTarget", json!({ "url": "about:blank" }), ctx)
            .await?;
        let reply: CreateTargetReply = serde_json::from_value(raw)?;
        let page_url = format!(
            "ws://127.0.0.1:{}/devtools/page/{}",
            self.port, reply.target_id
        );
        BrowserPage::attach(&page_url, reply.target_id, self.response_timeout).await
    }

    async fn dispose_page(&self, page: BrowserPage) {
        warn!(browser = self.id, target = page.target_id(), "disposing failed page");
        page.dispose().await;
        self.connection
            .fire_and_forget("Target.closeTarget", json!({ "targetId": page.target_id() }));
        self.pages.retire().await;
    }
}

/// Well-known root for user-data directories, so a warm start can identify
/// orphans left by a crashed process.
fn user_data_root() -> PathBuf {
    std::env::temp_dir().join("report-tool")
}

/// Wait for Chromium to advertise its debug endpoint via the handshake file.
///
/// The watcher is installed first, then the file is probed once (it may
/// predate the watcher). Events and a coarse liveness tick both re-probe;
/// the overall wait is bounded and the browser exiting first is an error.
async fn wait_for_devtools_endpoint(
    user_data_dir: &Path,
    child: &mut Child,
) -> Result<(u16, String), RenderError> {
    let port_file = user_data_dir.join(HANDSHAKE_FILE);

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        if let Ok(event) = result {
            let is_port_file = event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(OsStr::new(HANDSHAKE_FILE)));
            if is_port_file {
                let _ = event_tx.send(());
            }
        }
    })
    .map_err(|e| RenderError::BrowserStart(format!("filesystem watcher: {e}")))?;
    watcher
        .watch(user_data_dir, RecursiveMode::NonRecursive)
        .map_err(|e| {
            RenderError::BrowserStart(format!("watch {}: {e}", user_data_dir.display()))
        })?;

    if let Some(endpoint) = probe_port_file(&port_file).await {
        return Ok(endpoint);
    }

    let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
    let mut liveness = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = event_rx.recv() => {
                if let Some(endpoint) = read_port_file_with_retry(&port_file).await {
                    return Ok(endpoint);
                }
            }
            _ = liveness.tick() => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(RenderError::BrowserStart(format!(
                        "browser exited during startup with {status}"
                    )));
                }
                if let Some(endpoint) = probe_port_file(&port_file).await {
                    return Ok(endpoint);
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return Err(RenderError::BrowserStart(format!(
                    "no {HANDSHAKE_FILE} within {HANDSHAKE_TIMEOUT:?}"
                )));
            }
        }
    }
}

async fn probe_port_file(path: &Path) -> Option<(u16, String)> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    parse_port_file(&contents)
}

/// Re-read the handshake file until both lines are present. Chromium writes
/// the file non-atomically, so the first read after the create event can see
/// only the port line.
async fn read_port_file_with_retry(path: &Path) -> Option<(u16, String)> {
    for attempt in 1..=5u32 {
        if let Some(endpoint) = probe_port_file(path).await {
            return Some(endpoint);
        }
        tokio::time::sleep(Duration::from_millis(100) * attempt).await;
    }
    None
}

/// Line 1: decimal port. Line 2: WebSocket path starting with `/`.
fn parse_port_file(contents: &str) -> Option<(u16, String)> {
    let mut lines = contents.lines();
    let port = lines.next()?.trim().parse().ok()?;
    let path = lines.next()?.trim();
    if !path.starts_with('/') {
        return None;
    }
    Some((port, path.to_string()))
}
