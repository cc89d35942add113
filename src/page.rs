//! A reusable browser tab and the CDP sequence for one render.
//!
//! Each page owns a dedicated multiplexed connection to
//! `…/devtools/page/{targetId}`. One render is: set the document content,
//! optionally wait for the in-page readiness flag, print to PDF as a stream,
//! and pump `IO.read` chunks through the base64 decoder into the caller's
//! sink.

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::base64::StreamDecoder;
use crate::config::{JsSettings, Orientation, PageSettings};
use crate::connection::Connection;
use crate::error::RenderError;
use crate::metrics::ServiceMetrics;
use crate::protocol::{EvaluateReply, FrameTreeReply, IoReadReply, PrintToPdfReply};
use crate::sink::ByteSink;

/// `IO.read` chunk size in bytes.
const STREAM_READ_SIZE: usize = 51200;

/// The exact string the readiness helper resolves with on success; anything
/// else is treated as a timeout.
const SIGNAL_RECEIVED: &str = "Signal received";

/// One DevTools target (tab), reused across renders until it fails.
pub struct BrowserPage {
    target_id: String,
    connection: Connection,
}

impl BrowserPage {
    /// Attach to an already-created target by opening its page WebSocket.
    pub async fn attach(
        page_ws_url: &str,
        target_id: String,
        response_timeout: std::time::Duration,
    ) -> Result<Self, RenderError> {
        let connection = Connection::connect(page_ws_url, response_timeout).await?;
        debug!(target_id, "page attached");
        Ok(Self {
            target_id,
            connection,
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Run the full render sequence for one request, streaming the PDF into
    /// `sink`.
    ///
    /// On success the sink has been completed. A `stream`-less print
    /// response finishes successfully with zero bytes written. Cancellation
    /// between stream reads is honored; the stream handle is closed on every
    /// exit path once it was opened.
    pub async fn render<S: ByteSink>(
        &self,
        sink: &mut S,
        html: &str,
        page: &PageSettings,
        js: &JsSettings,
        metrics: &ServiceMetrics,
        ctx: &CancellationToken,
    ) -> Result<(), RenderError> {
        self.connection
            .fire_and_forget("Network.setCacheDisabled", json!({ "cacheDisabled": false }));

        let raw = self.connection.rpc("Page.getFrameTree", json!({}), ctx).await?;
        let tree: FrameTreeReply = serde_json::from_value(raw)?;
        let frame_id = tree.frame_tree.frame.id;

        self.connection.fire_and_forget(
            "Page.setDocumentContent",
            json!({ "frameId": frame_id, "html": html }),
        );

        if js.wait_for_completion {
            self.await_readiness(js, ctx).await?;
        }

        let raw = self
            .connection
            .rpc("Page.printToPDF", print_params(page), ctx)
            .await?;
        let reply: PrintToPdfReply = serde_json::from_value(raw)?;

        let Some(stream) = reply.stream else {
            debug!(target_id = %self.target_id, "print returned no stream handle, empty document");
            sink.complete().await?;
            return Ok(());
        };

        let outcome = self.drain_stream(&stream, sink, metrics, ctx).await;
        // Exactly one close per opened handle, on every exit path.
        self.connection
            .fire_and_forget("IO.close", json!({ "handle": stream }));
        outcome?;

        sink.complete().await?;
        Ok(())
    }

    /// Close this page's connection. The owning browser unregisters the
    /// target and adjusts the pool accounting.
    pub async fn dispose(&self) {
        self.connection.dispose().await;
    }

    /// Wait inside the page for `window[flag] === true`, bounded by the
    /// request's completion timeout.
    ///
    /// The RPC deadline is stretched past the in-page timer so the page,
    /// not the transport layer, decides readiness-timeout.
    async fn await_readiness(
        &self,
        js: &JsSettings,
        ctx: &CancellationToken,
    ) -> Result<(), RenderError> {
        let script = readiness_script(&js.readiness_flag_name, js.completion_timeout);
        let rpc_deadline = js.completion_timeout + self.connection.response_timeout();

        let raw = self
            .connection
            .rpc_with_timeout(
                "Runtime.evaluate",
                json!({
                    "expression": script,
                    "awaitPromise": true,
                    "returnByValue": true,
                }),
                rpc_deadline,
                ctx,
            )
            .await?;
        let reply: EvaluateReply = serde_json::from_value(raw)?;

        if let Some(details) = reply.exception_details {
            return Err(RenderError::Protocol {
                method: "Runtime.evaluate".to_string(),
                message: details["text"]
                    .as_str()
                    .unwrap_or("readiness helper threw")
                    .to_string(),
            });
        }

        match reply.result.value.as_ref().and_then(Value::as_str) {
            Some(SIGNAL_RECEIVED) => Ok(()),
            _ => Err(RenderError::JsTimeout(js.completion_timeout)),
        }
    }

    async fn drain_stream<S: ByteSink>(
        &self,
        handle: &str,
        sink: &mut S,
        metrics: &ServiceMetrics,
        ctx: &CancellationToken,
    ) -> Result<(), RenderError> {
        let mut decoder = StreamDecoder::new();
        let mut buf = Vec::with_capacity(STREAM_READ_SIZE);

        loop {
            if ctx.is_cancelled() {
                return Err(RenderError::Cancelled);
            }

            let raw = self
                .connection
                .rpc(
                    "IO.read",
                    json!({ "handle": handle, "size": STREAM_READ_SIZE }),
                    ctx,
                )
                .await?;
            let chunk: IoReadReply = serde_json::from_value(raw)?;

            buf.clear();
            decoder.push(chunk.data.as_bytes(), &mut buf)?;
            if !buf.is_empty() {
                sink.write(&buf).await?;
                metrics.record_bytes_streamed(buf.len());
            }

            if sink.stopped() {
                debug!(target_id = %self.target_id, "sink requested stop, ending stream early");
                return Ok(());
            }
            if chunk.eof {
                return Ok(());
            }
        }
    }
}

/// Build the `Page.printToPDF` parameter map from the request's layout.
fn print_params(page: &PageSettings) -> Value {
    let mut params = json!({
        "landscape": page.orientation == Orientation::Landscape,
        "paperWidth": page.paper_width_inches,
        "paperHeight": page.paper_height_inches,
        "marginTop": page.margin_top_inches,
        "marginBottom": page.margin_bottom_inches,
        "marginLeft": page.margin_left_inches,
        "marginRight": page.margin_right_inches,
        "printBackground": page.print_background,
        "transferMode": "ReturnAsStream",
    });
    if let Some(header) = &page.header_template {
        params["displayHeaderFooter"] = json!(true);
        params["headerTemplate"] = json!(header);
    }
    params
}

/// In-page helper polling a window-level flag until it turns true or the
/// deadline passes. Resolves with a sentinel string either way; the core
/// trusts only that string.
fn readiness_script(flag_name: &str, timeout: std::time::Duration) -> String {
    let flag = serde_json::to_string(flag_name).unwrap_or_else(|_| "\"reportIsReady\"".to_string());
    let millis = timeout.as_millis();
    format!(
        r#"new Promise((resolve) => {{
    const deadline = Date.now() + {millis};
    const check = () => {{
        if (window[{flag}] === true) {{ resolve("{SIGNAL_RECEIVED}"); return; }}
        if (Date.now() >= deadline) {{ resolve("Signal timed out"); return; }}
        setTimeout(check, 100);
    }};
    check();
}})"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn print_params_portrait_defaults() {
        let params = print_params(&PageSettings::default());
        assert_eq!(params["landscape"], json!(false));
        assert_eq!(params["paperWidth"], json!(8.5));
        assert_eq!(params["paperHeight"], json!(11.0));
        assert_eq!(params["marginTop"], json!(0.4));
        assert_eq!(params["marginBottom"], json!(0.4));
        assert_eq!(params["marginLeft"], json!(0.4));
        assert_eq!(params["marginRight"], json!(0.4));
        assert_eq!(params["printBackground"], json!(true));
        assert_eq!(params["transferMode"], json!("ReturnAsStream"));
        assert!(params.get("displayHeaderFooter").is_none());
        assert!(params.get("headerTemplate").is_none());
    }

    #[test]
    fn print_params_landscape_and_margins() {
        let page = PageSettings {
            orientation: Orientation::Landscape,
            paper_width_inches: 11.0,
            paper_height_inches: 8.5,
            margin_top_inches: 0.0,
            print_background: false,
            ..Default::default()
        };
        let params = print_params(&page);
        assert_eq!(params["landscape"], json!(true));
        assert_eq!(params["paperWidth"], json!(11.0));
        assert_eq!(params["marginTop"], json!(0.0));
        assert_eq!(params["printBackground"], json!(false));
        // Numbers stay JSON numbers.
        assert!(params["paperWidth"].is_f64());
    }

    #[test]
    fn header_template_enables_header_footer() {
        let page = PageSettings {
            header_template: Some("<span class='title'></span>".to_string()),
            ..Default::default()
        };
        let params = print_params(&page);
        assert_eq!(params["displayHeaderFooter"], json!(true));
        assert_eq!(params["headerTemplate"], json!("<span class='title'></span>"));
    }

    #[test]
    fn readiness_script_embeds_flag_and_deadline() {
        let script = readiness_script("reportIsReady", Duration::from_secs(2));
        assert!(script.contains(r#"window["reportIsReady"]"#));
        assert!(script.contains("Date.now() + 2000"));
        assert!(script.contains("Signal received"));
    }

    #[test]
    fn readiness_script_quotes_awkward_flag_names() {
        let script = readiness_script(r#"my"flag"#, Duration::from_millis(500));
        // The flag is JSON-escaped, never spliced raw.
        assert!(script.contains(r#"window["my\"flag"]"#));
    }
}
