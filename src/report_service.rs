//! Report service facade coordinating the browser pool.
//!
//! The service is shared by all concurrent requests and holds no per-request
//! state: one call borrows a browser, the browser borrows a page, and the
//! internal failure taxonomy is folded into the closed public outcome set at
//! this boundary.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser_pool::{BrowserPool, BrowserPoolStats};
use crate::config::{Config, JsSettings, PageSettings};
use crate::error::ReportError;
use crate::metrics::ServiceMetrics;
use crate::sink::ByteSink;

/// PDF report generation service with pooled browsers.
///
/// # Examples
///
/// ```rust,no_run
/// use report_tool::{BufferSink, Config, JsSettings, PageSettings, ReportService};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let service = ReportService::new(Config::default());
///
///     let mut sink = BufferSink::new();
///     let outcome = service
///         .generate_report(
///             &mut sink,
///             "<h1>Quarterly report</h1>",
///             &PageSettings::default(),
///             &JsSettings::default(),
///             &CancellationToken::new(),
///         )
///         .await;
///
///     match outcome {
///         Ok(()) => println!("PDF: {} bytes", sink.len()),
///         Err(e) => eprintln!("render failed: {e} (HTTP {})", e.http_status()),
///     }
///     service.shutdown().await;
/// }
/// ```
#[derive(Clone)]
pub struct ReportService {
    browser_pool: Arc<BrowserPool>,
    metrics: Arc<ServiceMetrics>,
}

impl ReportService {
    /// Create the service. Browsers are launched lazily on first use.
    pub fn new(config: Config) -> Self {
        let metrics = Arc::new(ServiceMetrics::new());
        Self {
            browser_pool: Arc::new(BrowserPool::new(config, metrics.clone())),
            metrics,
        }
    }

    /// Render `html` to a PDF streamed into `sink`.
    ///
    /// The outcome is a closed set: success, `ServerBusy` when both pool
    /// caps are saturated past their retry budgets, `Cancelled` when `ctx`
    /// fires first, `JsTimeout` when the readiness flag never turned true,
    /// and `BrowserError` for everything non-recoverable.
    pub async fn generate_report<S: ByteSink>(
        &self,
        sink: &mut S,
        html: &str,
        page_settings: &PageSettings,
        js_settings: &JsSettings,
        ctx: &CancellationToken,
    ) -> Result<(), ReportError> {
        if html.is_empty() {
            warn!("rejecting render of empty HTML document");
            return Err(ReportError::BrowserError("empty HTML document".into()));
        }

        let started = Instant::now();
        let outcome = self.render(sink, html, page_settings, js_settings, ctx).await;
        self.metrics.record_report(started.elapsed(), &outcome);

        match &outcome {
            Ok(()) => debug!(elapsed = ?started.elapsed(), "report generated"),
            Err(e) => debug!(elapsed = ?started.elapsed(), error = %e, "report failed"),
        }
        outcome
    }

    async fn render<S: ByteSink>(
        &self,
        sink: &mut S,
        html: &str,
        page_settings: &PageSettings,
        js_settings: &JsSettings,
        ctx: &CancellationToken,
    ) -> Result<(), ReportError> {
        let browser = self.browser_pool.acquire(ctx).await?;
        browser
            .generate_report(sink, html, page_settings, js_settings, ctx)
            .await?;
        Ok(())
    }

    pub async fn stats(&self) -> BrowserPoolStats {
        self.browser_pool.stats().await
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Tear down every pooled browser.
    pub async fn shutdown(&self) {
        info!("shutting down report service");
        self.browser_pool.shutdown().await;
        info!("report service shutdown complete");
    }
}
