//! # Report Tool
//!
//! A headless-browser PDF rendering service. Given an HTML document and a
//! page-layout description, it streams back a PDF by driving locally
//! spawned Chromium processes over the Chrome DevTools Protocol, reusing
//! browser instances and tabs across concurrent requests.
//!
//! ## Architecture
//!
//! - **Connection multiplexer**: one WebSocket per DevTools endpoint shared
//!   by many concurrent callers, with response correlation by message id,
//!   per-call timeouts, and cancellation.
//! - **Two-level pooling**: a bounded pool of browser processes, and inside
//!   each browser a bounded LIFO pool of reusable tabs.
//! - **Streaming output**: `Page.printToPDF` with `ReturnAsStream`, pumped
//!   through an incremental base64 decoder into the caller's byte sink with
//!   backpressure.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use report_tool::{BufferSink, Config, JsSettings, PageSettings, ReportService};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ReportService::new(Config::default());
//!
//!     let mut sink = BufferSink::new();
//!     service
//!         .generate_report(
//!             &mut sink,
//!             "<h1>Hello</h1>",
//!             &PageSettings::default(),
//!             &JsSettings::default(),
//!             &CancellationToken::new(),
//!         )
//!         .await?;
//!
//!     std::fs::write("hello.pdf", sink.as_bytes())?;
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Single document
//! report-tool render --input report.html --output report.pdf
//!
//! # Whole directory, 8 renders in flight
//! report-tool batch --input docs/ --output pdfs/ --concurrency 8
//! ```

/// Configuration, page layout, and browser binary discovery
pub mod config;

/// Internal and public error types
pub mod error;

/// Incremental base64 decoding of CDP PDF streams
pub mod base64;

/// DevTools wire codec: command frames and typed response payloads
pub mod protocol;

/// Multiplexed RPC connection over one DevTools WebSocket
pub mod connection;

/// Browser process lifecycle and per-browser orchestration
pub mod browser;

/// A reusable tab and the CDP render sequence
pub mod page;

/// Bounded LIFO pool of reusable pages
pub mod page_pool;

/// Bounded round-robin pool of live browsers
pub mod browser_pool;

/// The public report-generation facade
pub mod report_service;

/// Output byte sink capability
pub mod sink;

/// Performance metrics collection
pub mod metrics;

/// Command-line interface implementation
pub mod cli;

/// Formatting helpers for CLI output
pub mod utils;


pub use browser::*;
pub use browser_pool::*;
pub use cli::*;
pub use config::*;
pub use connection::*;
pub use error::*;
pub use metrics::*;
pub use page::*;
pub use page_pool::*;
pub use report_service::*;
pub use sink::*;
pub use utils::*;
